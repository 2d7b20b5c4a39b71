//! Scripted audio source for simulations and tests.
//!
//! Replays a fixed list of chunks on a steady cadence and counts how many
//! captures are currently held, so callers can assert nothing dangles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep_until, Instant};

use super::capture::{AudioCapture, AudioSource};
use crate::error::CaptureError;

/// How the scripted device behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedBehavior {
    /// Play the chunks once, then report exhaustion
    Once,
    /// Repeat the chunks for as long as the capture is held
    Loop,
    /// Refuse acquisition
    Deny,
    /// Fail with `DeviceUnavailable` after this many chunks
    FailAfter(usize),
    /// Record on the usual cadence (looping) but hand everything over only
    /// when stopped
    FlushOnStop,
}

/// Audio source replaying scripted chunks
#[derive(Debug, Clone)]
pub struct ScriptedAudioSource {
    chunks: Arc<Vec<Vec<u8>>>,
    interval: Duration,
    behavior: ScriptedBehavior,
    held: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl ScriptedAudioSource {
    pub fn new(chunks: Vec<Vec<u8>>, interval: Duration) -> Self {
        Self {
            chunks: Arc::new(chunks),
            interval,
            behavior: ScriptedBehavior::Once,
            held: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A source whose permission is always refused
    pub fn denied() -> Self {
        Self::new(Vec::new(), Duration::from_secs(1)).with_behavior(ScriptedBehavior::Deny)
    }

    pub fn with_behavior(mut self, behavior: ScriptedBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Captures currently acquired and not yet released
    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    /// Total releases so far
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSource for ScriptedAudioSource {
    async fn acquire(&self) -> Result<Box<dyn AudioCapture>, CaptureError> {
        if self.behavior == ScriptedBehavior::Deny {
            return Err(CaptureError::PermissionDenied);
        }
        self.held.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedCapture {
            chunks: self.chunks.clone(),
            interval: self.interval,
            behavior: self.behavior,
            position: 0,
            next_at: Instant::now() + self.interval,
            held: self.held.clone(),
            releases: self.releases.clone(),
            released: false,
        }))
    }
}

struct ScriptedCapture {
    chunks: Arc<Vec<Vec<u8>>>,
    interval: Duration,
    behavior: ScriptedBehavior,
    position: usize,
    next_at: Instant,
    held: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
    released: bool,
}

impl ScriptedCapture {
    /// Index of the chunk that would be produced next, if any
    fn upcoming(&self) -> Option<usize> {
        match self.behavior {
            ScriptedBehavior::Loop | ScriptedBehavior::FlushOnStop if !self.chunks.is_empty() => {
                Some(self.position % self.chunks.len())
            }
            ScriptedBehavior::FailAfter(n) if self.position >= n => None,
            _ if self.position < self.chunks.len() => Some(self.position),
            _ => None,
        }
    }

    fn advance(&mut self, index: usize) -> Vec<u8> {
        self.next_at += self.interval;
        self.position += 1;
        self.chunks[index].clone()
    }
}

#[async_trait]
impl AudioCapture for ScriptedCapture {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        if self.released {
            return Ok(None);
        }
        if self.behavior == ScriptedBehavior::FlushOnStop {
            return std::future::pending().await;
        }
        if let ScriptedBehavior::FailAfter(n) = self.behavior {
            if self.position >= n {
                return Err(CaptureError::DeviceUnavailable(
                    "scripted device failure".to_string(),
                ));
            }
        }

        let Some(index) = self.upcoming() else {
            return Ok(None);
        };

        // Deadline-based so a cancelled wait loses nothing.
        sleep_until(self.next_at).await;
        Ok(Some(self.advance(index)))
    }

    async fn stop(&mut self) -> Result<Vec<Vec<u8>>, CaptureError> {
        let mut trailing = Vec::new();
        if self.released {
            return Ok(trailing);
        }

        // Everything recorded up to now that was not handed out yet.
        let now = Instant::now();
        while self.next_at <= now {
            let Some(index) = self.upcoming() else {
                break;
            };
            trailing.push(self.advance(index));
        }
        Ok(trailing)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.held.fetch_sub(1, Ordering::SeqCst);
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ScriptedCapture {
    fn drop(&mut self) {
        self.release();
    }
}
