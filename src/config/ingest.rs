//! Consumer process configuration.

use ::config::Config;

use super::{ChannelSettings, ConfigResult, ConfigurationError, ConnectionUrl, EnvReader, SecretString};
use crate::constants::DEFAULT_DB_MAX_CONNECTIONS;
use crate::ingest::AckMode;

const CONTEXT: &str = "ingest configuration";

/// Variables that together replace `DATABASE_URL`
const DB_PARTS: [&str; 4] = ["DB_HOST", "DB_USER", "DB_PASSWORD", "DB_NAME"];

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub channel_url: ConnectionUrl,
    pub database_url: ConnectionUrl,
    pub db_max_connections: u32,
    /// Signing secret of the serving layer; validated here, used elsewhere
    pub jwt_secret: SecretString,
    pub ack_mode: AckMode,
    /// Unacknowledged deliveries allowed in flight; 0 means unlimited
    pub prefetch_count: u16,
    pub channel: ChannelSettings,
}

impl IngestConfig {
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_source(&super::load_environment()?)
    }

    pub fn from_source(source: &Config) -> ConfigResult<Self> {
        let reader = EnvReader::new(source, CONTEXT);

        let channel_url = ConnectionUrl::new(reader.required("RABBITMQ_URL")?);
        let database_url = ConnectionUrl::new(database_url(&reader)?);
        let jwt_secret = SecretString::new(reader.required("JWT_SECRET")?);

        let db_max_connections: u32 =
            reader.parsed_or("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?;
        if db_max_connections == 0 {
            return Err(reader.invalid("DB_MAX_CONNECTIONS", "0", "must be at least 1"));
        }

        Ok(Self {
            channel_url,
            database_url,
            db_max_connections,
            jwt_secret,
            ack_mode: reader.parsed_or("ACK_MODE", AckMode::default())?,
            prefetch_count: reader.parsed_or("PREFETCH_COUNT", 0)?,
            channel: ChannelSettings::from_reader(&reader)?,
        })
    }
}

/// `DATABASE_URL` wins; otherwise every `DB_*` part must be present.
fn database_url(reader: &EnvReader<'_>) -> ConfigResult<String> {
    if let Some(url) = reader.optional("DATABASE_URL")? {
        return Ok(url);
    }

    let parts = DB_PARTS
        .iter()
        .map(|key| {
            reader.optional(key)?.ok_or_else(|| {
                ConfigurationError::missing(format!("DATABASE_URL (or {key})"), CONTEXT)
            })
        })
        .collect::<ConfigResult<Vec<_>>>()?;

    let (host, user, password, name) = (&parts[0], &parts[1], &parts[2], &parts[3]);
    Ok(format!(
        "postgres://{user}:{password}@{host}/{name}?sslmode=disable"
    ))
}
