//! Error types for device state aggregation.

use crate::types::DeviceKey;
use thiserror::Error;

/// Error type for device state operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Device key is not present in the registry.
    #[error("devicestate: unknown device: {0}")]
    UnknownDevice(DeviceKey),

    /// Category name is not one of status, login, gps.
    #[error("devicestate: unknown category: {0}")]
    UnknownCategory(String),

    /// Fragment payload is not a JSON object.
    #[error("devicestate: fragment payload is not an object")]
    NotAnObject,

    /// Payload is not valid JSON.
    #[error("devicestate: invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for device state operations.
pub type Result<T> = std::result::Result<T, Error>;
