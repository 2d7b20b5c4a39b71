//! Error types for the escalation core

use thiserror::Error;

/// Failures of the audio capture resource.
///
/// Neither kind is retried; the escalation controller decides the fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The device refused the recording resource
    #[error("Permission denied: microphone access is needed for proof mode")]
    PermissionDenied,

    /// The resource was granted but failed mid-capture
    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Reverse-geocoding failures, always recovered locally
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("Address lookup failed: {0}")]
    LookupFailed(String),
}

/// Core-level errors surfaced to callers
#[derive(Debug, Error)]
pub enum CoreError {
    /// Evidence capture failed
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Address lookup failed
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// Envelope could not be constructed
    #[error("Envelope error: {0}")]
    Envelope(#[from] sos_types::EnvelopeError),

    /// Profile store could not be read or written
    #[error("Profile store error: {0}")]
    Profile(String),

    /// The controller task is no longer running
    #[error("Escalation controller closed")]
    ControllerClosed,
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
