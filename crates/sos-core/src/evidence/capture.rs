//! Audio capture capability and its scoped guard

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::error::CaptureError;

/// Longest wait for a device to hand over its trailing data
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Provider of the audio capture resource.
///
/// The core never checks for microphone support itself; it is handed a
/// source that either grants a capture or fails with a declared error.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Acquire the recording device and start producing chunks
    async fn acquire(&self) -> Result<Box<dyn AudioCapture>, CaptureError>;

    /// MIME type of the produced chunks
    fn mime_type(&self) -> &str {
        "audio/webm"
    }
}

/// An acquired, running capture.
#[async_trait]
pub trait AudioCapture: Send {
    /// Wait for the next chunk.
    ///
    /// `Ok(None)` means the device will produce no more chunks. Must be
    /// cancel safe: the escalation loop races it against timers.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, CaptureError>;

    /// Stop recording and return every chunk recorded but not yet handed
    /// out by `next_chunk`, in order. Recorders that only deliver data when
    /// stopped return the whole recording here.
    async fn stop(&mut self) -> Result<Vec<Vec<u8>>, CaptureError>;

    /// Tear down the hardware. Idempotent; also called after `stop`.
    fn release(&mut self);
}

/// Owns a capture and releases it on every exit path
pub struct CaptureGuard {
    capture: Option<Box<dyn AudioCapture>>,
}

impl CaptureGuard {
    pub fn new(capture: Box<dyn AudioCapture>) -> Self {
        Self {
            capture: Some(capture),
        }
    }

    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        match self.capture.as_mut() {
            Some(capture) => capture.next_chunk().await,
            None => Ok(None),
        }
    }

    /// Stop the capture, collect its trailing chunks and release it
    pub async fn stop(&mut self) -> Result<Vec<Vec<u8>>, CaptureError> {
        let Some(mut capture) = self.capture.take() else {
            return Ok(Vec::new());
        };
        let trailing = match timeout(STOP_TIMEOUT, capture.stop()).await {
            Ok(result) => result,
            Err(_) => Err(CaptureError::DeviceUnavailable(
                "capture did not stop in time".to_string(),
            )),
        };
        capture.release();
        tracing::debug!("Audio capture released");
        trailing
    }

    /// Release now; later calls and the drop are no-ops
    pub fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.release();
            tracing::debug!("Audio capture released");
        }
    }

    pub fn is_held(&self) -> bool {
        self.capture.is_some()
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CaptureGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureGuard")
            .field("held", &self.is_held())
            .finish()
    }
}
