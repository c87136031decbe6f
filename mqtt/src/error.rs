//! Error types for the MQTT connection.

use thiserror::Error;

/// Error type for MQTT operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Broker address could not be parsed.
    #[error("mqtt: invalid broker address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// Unsupported URL scheme.
    #[error("mqtt: unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// Initial connection was not acknowledged in time.
    #[error("mqtt: connection not established within {0:?}")]
    ConnectTimeout(std::time::Duration),

    /// Connection is closed.
    #[error("mqtt: connection closed")]
    Closed,

    /// Publish error.
    #[error("mqtt: publish error: {0}")]
    Publish(String),

    /// Subscribe error.
    #[error("mqtt: subscribe error: {0}")]
    Subscribe(String),

    /// Client error from rumqttc.
    #[error("mqtt client error: {0}")]
    ClientError(#[from] rumqttc::ClientError),

    /// Connection error from rumqttc.
    #[error("mqtt connection error: {0}")]
    ConnectionError(#[from] rumqttc::ConnectionError),
}

/// Result type for MQTT operations.
pub type Result<T> = std::result::Result<T, Error>;
