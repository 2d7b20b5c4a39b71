//! Envelope construction errors

use thiserror::Error;

/// Reasons an envelope cannot be built
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvelopeError {
    /// Device identifier was empty
    #[error("Envelope id must not be empty")]
    EmptyId,

    /// Coordinate was not finite or out of range
    #[error("Invalid coordinate: lat={lat}, lng={lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },

    /// Audio evidence attached to a non-PROOF envelope
    #[error("Audio evidence is only carried by PROOF envelopes (mode was {0})")]
    AudioOutsideProof(crate::Stage),
}

/// Result type alias for envelope construction
pub type EnvelopeResult<T> = Result<T, EnvelopeError>;
