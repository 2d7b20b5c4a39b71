//! Evidence capture for the PROOF stage.
//!
//! One episode records a bounded audio sample: the buffer starts empty,
//! chunks are appended in arrival order, and when the recording countdown
//! reaches zero (or the user marks safe) the buffer becomes a single payload.
//! The payload is never streamed incrementally.

mod capture;
mod scripted;

pub use capture::{AudioCapture, AudioSource, CaptureGuard};
pub use scripted::{ScriptedAudioSource, ScriptedBehavior};

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::countdown::Countdown;
use crate::error::CaptureError;

/// Ordered chunks of one episode
#[derive(Debug, Default, Clone)]
pub struct EvidenceBuffer {
    chunks: Vec<Vec<u8>>,
}

impl EvidenceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Concatenate in arrival order
    pub fn concat(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_bytes());
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }
}

/// Finished recording, ready to attach to one PROOF envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidencePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl EvidencePayload {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `data:<mime>;base64,<bytes>` as carried in the envelope's `audio` field
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

/// What happened when the episode polled its capture
#[derive(Debug)]
pub enum ChunkEvent {
    /// A chunk was appended to the buffer
    Appended { bytes: usize },
    /// The device stopped producing chunks; the countdown still runs
    Exhausted,
    /// The device failed mid-capture
    Failed(CaptureError),
}

/// A running recording episode
#[derive(Debug)]
pub struct EvidenceEpisode {
    capture: CaptureGuard,
    buffer: EvidenceBuffer,
    countdown: Countdown,
    mime_type: String,
    exhausted: bool,
}

impl EvidenceEpisode {
    /// Wait for the next chunk and append it.
    ///
    /// Never resolves once the capture is exhausted or released, so it can sit
    /// in a `select!` for the whole episode.
    pub async fn next_chunk(&mut self) -> ChunkEvent {
        if self.exhausted || !self.capture.is_held() {
            return std::future::pending().await;
        }
        match self.capture.next_chunk().await {
            Ok(Some(chunk)) => {
                let bytes = chunk.len();
                self.buffer.push(chunk);
                ChunkEvent::Appended { bytes }
            }
            Ok(None) => {
                self.exhausted = true;
                ChunkEvent::Exhausted
            }
            Err(e) => {
                self.capture.release();
                ChunkEvent::Failed(e)
            }
        }
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn countdown_mut(&mut self) -> &mut Countdown {
        &mut self.countdown
    }

    pub fn buffer(&self) -> &EvidenceBuffer {
        &self.buffer
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_held()
    }
}

/// Starts and finishes evidence episodes over an injected audio source
#[derive(Clone)]
pub struct EvidencePipeline {
    source: Arc<dyn AudioSource>,
    recording_secs: u32,
}

impl EvidencePipeline {
    pub fn new(source: Arc<dyn AudioSource>, recording_secs: u32) -> Self {
        Self {
            source,
            recording_secs,
        }
    }

    /// Acquire the capture resource and start the recording countdown.
    ///
    /// On failure nothing is held.
    pub async fn begin_episode(&self) -> Result<EvidenceEpisode, CaptureError> {
        let capture = match self.source.acquire().await {
            Ok(capture) => CaptureGuard::new(capture),
            Err(e) => {
                warn!(error = %e, "Audio capture acquisition failed");
                return Err(e);
            }
        };

        let mut countdown = Countdown::new(self.recording_secs);
        countdown.start(Instant::now());

        info!(
            recording_secs = self.recording_secs,
            "Evidence episode started"
        );

        Ok(EvidenceEpisode {
            capture,
            buffer: EvidenceBuffer::new(),
            countdown,
            mime_type: self.source.mime_type().to_string(),
            exhausted: false,
        })
    }

    /// Stop capture and package everything recorded so far, including the
    /// chunks the device still held when it was stopped
    pub async fn end_episode(&self, mut episode: EvidenceEpisode) -> EvidencePayload {
        episode.countdown.stop();
        match episode.capture.stop().await {
            Ok(trailing) => {
                for chunk in trailing {
                    episode.buffer.push(chunk);
                }
            }
            Err(e) => warn!(error = %e, "Capture failed while stopping, keeping chunks so far"),
        }

        let payload = EvidencePayload {
            bytes: episode.buffer.concat(),
            mime_type: episode.mime_type.clone(),
        };
        info!(
            chunks = episode.buffer.chunk_count(),
            bytes = payload.bytes.len(),
            "Evidence episode ended"
        );
        payload
    }
}

impl std::fmt::Debug for EvidencePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvidencePipeline")
            .field("recording_secs", &self.recording_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_buffer_preserves_order() {
        let mut buffer = EvidenceBuffer::new();
        buffer.push(vec![1, 2]);
        buffer.push(vec![]);
        buffer.push(vec![3]);
        buffer.push(vec![4, 5, 6]);

        assert_eq!(buffer.chunk_count(), 3);
        assert_eq!(buffer.total_bytes(), 6);
        assert_eq!(buffer.concat(), vec![1, 2, 3, 4, 5, 6]);

        buffer.clear();
        assert_eq!(buffer.total_bytes(), 0);
    }

    #[test]
    fn test_data_url() {
        let payload = EvidencePayload {
            bytes: b"hi".to_vec(),
            mime_type: "audio/webm".to_string(),
        };
        assert_eq!(payload.to_data_url(), "data:audio/webm;base64,aGk=");
    }

    #[tokio::test(start_paused = true)]
    async fn test_episode_collects_chunks_in_order() {
        let source = ScriptedAudioSource::new(
            vec![b"ab".to_vec(), b"cd".to_vec(), b"ef".to_vec()],
            Duration::from_millis(100),
        );
        let pipeline = EvidencePipeline::new(Arc::new(source.clone()), 10);

        let mut episode = pipeline.begin_episode().await.unwrap();
        assert_eq!(source.held(), 1);
        assert!(episode.countdown().is_active());

        for _ in 0..3 {
            assert!(matches!(episode.next_chunk().await, ChunkEvent::Appended { bytes: 2 }));
        }
        assert!(matches!(episode.next_chunk().await, ChunkEvent::Exhausted));

        let payload = pipeline.end_episode(episode).await;
        assert_eq!(payload.bytes, b"abcdef".to_vec());
        assert_eq!(source.held(), 0);
        assert_eq!(source.releases(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_holds_nothing() {
        let source = ScriptedAudioSource::denied();
        let pipeline = EvidencePipeline::new(Arc::new(source.clone()), 10);

        let err = pipeline.begin_episode().await.unwrap_err();
        assert_eq!(err, CaptureError::PermissionDenied);
        assert_eq!(source.held(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_capture_failure_releases() {
        let source = ScriptedAudioSource::new(vec![b"a".to_vec()], Duration::from_millis(10))
            .with_behavior(ScriptedBehavior::FailAfter(1));
        let pipeline = EvidencePipeline::new(Arc::new(source.clone()), 10);

        let mut episode = pipeline.begin_episode().await.unwrap();
        assert!(matches!(episode.next_chunk().await, ChunkEvent::Appended { .. }));
        assert!(matches!(
            episode.next_chunk().await,
            ChunkEvent::Failed(CaptureError::DeviceUnavailable(_))
        ));
        assert!(!episode.is_capturing());
        assert_eq!(source.held(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_episode_collects_chunks_due_at_stop() {
        let source = ScriptedAudioSource::new(
            vec![b"ab".to_vec(), b"cd".to_vec()],
            Duration::from_secs(1),
        )
        .with_behavior(ScriptedBehavior::Loop);
        let pipeline = EvidencePipeline::new(Arc::new(source.clone()), 10);

        let mut episode = pipeline.begin_episode().await.unwrap();
        assert!(matches!(episode.next_chunk().await, ChunkEvent::Appended { .. }));

        // Two more chunks fall due without being polled.
        tokio::time::sleep(Duration::from_secs(2)).await;
        let payload = pipeline.end_episode(episode).await;
        assert_eq!(payload.bytes, b"abcdab".to_vec());
        assert_eq!(source.held(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_on_stop_recorder_delivers_whole_recording() {
        let source = ScriptedAudioSource::new(
            vec![b"x".to_vec(), b"y".to_vec()],
            Duration::from_millis(500),
        )
        .with_behavior(ScriptedBehavior::FlushOnStop);
        let pipeline = EvidencePipeline::new(Arc::new(source.clone()), 10);

        let mut episode = pipeline.begin_episode().await.unwrap();
        let polled = tokio::time::timeout(Duration::from_secs(2), episode.next_chunk()).await;
        assert!(polled.is_err(), "nothing is handed out before stop");
        assert_eq!(episode.buffer().total_bytes(), 0);

        let payload = pipeline.end_episode(episode).await;
        assert_eq!(payload.bytes, b"xyxy".to_vec());
        assert_eq!(source.releases(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_episode_releases_capture() {
        let source = ScriptedAudioSource::new(vec![b"a".to_vec()], Duration::from_millis(10));
        let pipeline = EvidencePipeline::new(Arc::new(source.clone()), 10);

        let episode = pipeline.begin_episode().await.unwrap();
        assert_eq!(source.held(), 1);
        drop(episode);
        assert_eq!(source.held(), 0);
    }
}
