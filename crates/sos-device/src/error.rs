//! Error types for sos-device

use sos_core::CoreError;
use thiserror::Error;

/// Device runtime errors
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Relay socket closed or could not be opened
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// A device capability was refused
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Profile file could not be read or written
    #[error("Profile error: {0}")]
    Profile(String),

    /// Escalation core error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;
