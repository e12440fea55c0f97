//! Bounded startup connection.

use tokio::time::sleep;
use tracing::{info, warn};

use super::traits::{ChannelConnection, ChannelConnector};
use super::types::RetryPolicy;
use super::{MessagingError, MessagingResult};
use crate::config::redact_url;

/// Dial `url` up to `policy.max_attempts` times with a constant pause in
/// between. At startup the returned error is fatal; lazy reconnects call this
/// with [`RetryPolicy::once`].
pub async fn connect_with_retry(
    connector: &dyn ChannelConnector,
    url: &str,
    policy: RetryPolicy,
) -> MessagingResult<Box<dyn ChannelConnection>> {
    let target = redact_url(url);
    let mut last_error = String::new();

    for attempt in 1..=policy.max_attempts {
        match connector.connect(url).await {
            Ok(connection) => {
                info!(
                    provider = connector.provider_name(),
                    broker = %target,
                    attempt,
                    "Connected to message broker"
                );
                return Ok(connection);
            }
            Err(e) => {
                warn!(
                    provider = connector.provider_name(),
                    broker = %target,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Broker connection attempt failed"
                );
                last_error = e.to_string();
            }
        }

        if attempt < policy.max_attempts {
            sleep(policy.backoff).await;
        }
    }

    Err(MessagingError::connect_retries_exhausted(
        policy.max_attempts,
        last_error,
    ))
}
