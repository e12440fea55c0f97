//! # Messaging Error Types
//!
//! Structured error handling for the channel clients using thiserror.
//! Errors are grouped so callers can tell a dropped connection (recoverable
//! by reconnecting) from a bad payload or a refused queue operation.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Broker unreachable after {attempts} connection attempts: {last_error}")]
    ConnectRetriesExhausted { attempts: u32, last_error: String },

    #[error("Not connected to broker (queue {queue_name})")]
    NotConnected { queue_name: String },

    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Delivery {delivery_tag} on {queue_name} is unknown or already settled")]
    UnknownDelivery { queue_name: String, delivery_tag: u64 },

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a retries-exhausted error
    pub fn connect_retries_exhausted(attempts: u32, last_error: impl Into<String>) -> Self {
        Self::ConnectRetriesExhausted {
            attempts,
            last_error: last_error.into(),
        }
    }

    /// Create a not-connected error
    pub fn not_connected(queue_name: impl Into<String>) -> Self {
        Self::NotConnected {
            queue_name: queue_name.into(),
        }
    }

    /// Create a queue operation error
    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a queue creation error
    pub fn queue_creation(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::queue_operation(queue_name, "declare", message)
    }

    /// Create a send error
    pub fn send(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::queue_operation(queue_name, "publish", message)
    }

    /// Create a consume error
    pub fn consume(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::queue_operation(queue_name, "consume", message)
    }

    /// Create an ack error
    pub fn ack(queue_name: impl Into<String>, delivery_tag: u64, message: impl Into<String>) -> Self {
        Self::queue_operation(queue_name, format!("ack(tag={delivery_tag})"), message)
    }

    /// Create a nack error
    pub fn nack(
        queue_name: impl Into<String>,
        delivery_tag: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::queue_operation(queue_name, format!("nack(tag={delivery_tag})"), message)
    }

    /// Create a queue not found error
    pub fn queue_not_found(queue_name: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue_name.into(),
        }
    }

    /// Create an unknown delivery error
    pub fn unknown_delivery(queue_name: impl Into<String>, delivery_tag: u64) -> Self {
        Self::UnknownDelivery {
            queue_name: queue_name.into(),
            delivery_tag,
        }
    }

    /// Create a message serialization error
    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    /// Create a message deserialization error
    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True when the error means the connection (or its channel) is gone
    /// and the next operation should reconnect first.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::NotConnected { .. } | Self::ConnectRetriesExhausted { .. }
        )
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            MessagingError::message_deserialization(err.to_string())
        } else {
            MessagingError::message_serialization(err.to_string())
        }
    }
}

/// Conversion from lapin::Error to MessagingError
///
/// Anything that indicates the connection or channel is no longer usable
/// maps to `Connection` so the publisher reconnects on its next call.
impl From<lapin::Error> for MessagingError {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::InvalidChannelState(_)
            | lapin::Error::InvalidConnectionState(_)
            | lapin::Error::IOError(_)
            | lapin::Error::ProtocolError(_) => MessagingError::connection(err.to_string()),
            _ => MessagingError::internal(err.to_string()),
        }
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messaging_error_creation() {
        let conn_err = MessagingError::connection("socket closed");
        assert!(matches!(conn_err, MessagingError::Connection { .. }));
        assert!(conn_err.is_connection_error());

        let queue_err = MessagingError::send("ping_results", "channel blocked");
        assert!(matches!(queue_err, MessagingError::QueueOperation { .. }));
        assert!(!queue_err.is_connection_error());

        let exhausted = MessagingError::connect_retries_exhausted(10, "refused");
        assert!(exhausted.is_connection_error());
    }

    #[test]
    fn test_error_conversions() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid json").unwrap_err();
        let messaging_err: MessagingError = json_err.into();
        assert!(matches!(
            messaging_err,
            MessagingError::MessageDeserialization { .. }
        ));
    }

    #[test]
    fn test_error_display() {
        let queue_err = MessagingError::ack("ping_results", 42, "channel closed");
        let display_str = format!("{queue_err}");
        assert!(display_str.contains("Queue operation failed"));
        assert!(display_str.contains("ping_results"));
        assert!(display_str.contains("ack(tag=42)"));
        assert!(display_str.contains("channel closed"));

        let exhausted = MessagingError::connect_retries_exhausted(10, "connection refused");
        let display_str = format!("{exhausted}");
        assert!(display_str.contains("10 connection attempts"));
    }
}
