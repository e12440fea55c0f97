use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info, instrument};

use super::{PersistenceError, PersistenceSink};
use crate::config::ConnectionUrl;
use crate::constants::DB_CONNECT_TIMEOUT;
use crate::models::ProbeResult;

const INSERT_RESULT: &str = r#"
    INSERT INTO containers (ip_address, last_ping, ping_time, status)
    VALUES ($1, $2, $3, $4)
"#;

/// PostgreSQL sink writing one row per result into `containers`
#[derive(Debug, Clone)]
pub struct PostgresSink {
    pool: PgPool,
}

impl PostgresSink {
    /// Connect eagerly so an unreachable store fails startup
    pub async fn connect(
        database_url: &ConnectionUrl,
        max_connections: u32,
    ) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(DB_CONNECT_TIMEOUT)
            .idle_timeout(Duration::from_secs(300))
            .test_before_acquire(true)
            .connect(database_url.expose())
            .await
            .map_err(|e| {
                PersistenceError::connection(format!("{} ({e})", database_url.redacted()))
            })?;

        info!(
            database = %database_url,
            max_connections,
            "Connected to persistence store"
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Close the pool, waiting for checked-out connections to return
    pub async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!("Persistence pool closed");
        }
    }
}

#[async_trait]
impl PersistenceSink for PostgresSink {
    #[instrument(skip(self, result), fields(address = %result.address))]
    async fn save(&self, result: &ProbeResult) -> Result<(), PersistenceError> {
        if self.pool.is_closed() {
            return Err(PersistenceError::Closed);
        }

        sqlx::query(INSERT_RESULT)
            .bind(&result.address)
            .bind(result.observed_at)
            .bind(result.latency_seconds)
            .bind(result.reachable)
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::write(&result.address, e.to_string()))?;

        debug!(reachable = result.reachable, "Saved probe result");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProbeTarget;

    fn sample() -> ProbeResult {
        ProbeResult::reachable(&ProbeTarget::new("a", "10.0.0.2"), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_save_after_close_fails() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://app:pw@127.0.0.1:1/containers")
            .unwrap();
        let sink = PostgresSink::from_pool(pool);

        sink.close().await;
        sink.close().await;

        assert!(matches!(
            sink.save(&sample()).await,
            Err(PersistenceError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_connect() {
        let url = ConnectionUrl::new("postgres://app:pw@127.0.0.1:1/containers");
        let err = PostgresSink::connect(&url, 1).await.unwrap_err();

        assert!(matches!(err, PersistenceError::Connection { .. }));
        assert!(!err.to_string().contains("pw@"));
    }

    // Requires a database with the `containers` table:
    //   DATABASE_URL=postgres://... cargo test postgres -- --ignored
    #[tokio::test]
    #[ignore = "requires PostgreSQL running"]
    async fn test_save_inserts_row() {
        let url = ConnectionUrl::new(
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
        );
        let sink = PostgresSink::connect(&url, 1).await.unwrap();

        let unreachable = ProbeResult::unreachable(&ProbeTarget::new("b", "10.0.0.3"), Duration::from_secs(1));
        sink.save(&sample()).await.unwrap();
        sink.save(&unreachable).await.unwrap();

        sink.close().await;
    }
}
