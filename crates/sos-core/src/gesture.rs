//! Gesture disambiguation for the activation button.
//!
//! Raw presses arrive as pulses. The first pulse in a quiet period opens a
//! detection window; a third pulse inside it is a TRIPLE and resolves at
//! once, otherwise the window's expiry resolves it as a SINGLE. The window
//! counter and deadline never leave this type.
//!
//! Time is passed in by the caller so the owner decides when the window
//! deadline is observed (normally a `sleep_until(deadline())` in its loop).

use std::time::Duration;
use tokio::time::Instant;

/// Pulses needed for a triple activation
const TRIPLE_THRESHOLD: u8 = 3;

/// Classified activation intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Nothing to act on yet
    None,
    /// One activation (escalate to RISK)
    Single,
    /// Three activations inside one window (escalate to PROOF)
    Triple,
}

#[derive(Debug, Clone, Copy)]
struct GestureWindow {
    count: u8,
    deadline: Instant,
}

/// Converts pulses into [`Intent`]s within a bounded window
#[derive(Debug, Clone)]
pub struct GestureDisambiguator {
    window: Duration,
    pending: Option<GestureWindow>,
}

impl GestureDisambiguator {
    /// Create a disambiguator with the given window length
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// Register one pulse at `now`.
    ///
    /// Returns `Triple` when this pulse completes a triple. If the previous
    /// window had already expired without being polled, it is resolved first
    /// and its `Single` is returned; this pulse then opens a fresh window.
    pub fn register_pulse(&mut self, now: Instant, suppress_single: bool) -> Intent {
        let stale = self.poll_expired(now, suppress_single);

        match self.pending.as_mut() {
            None => {
                self.pending = Some(GestureWindow {
                    count: 1,
                    deadline: now + self.window,
                });
                stale
            }
            Some(window) => {
                window.count += 1;
                if window.count >= TRIPLE_THRESHOLD {
                    // Cancels the pending single; the next pulse opens a new window.
                    self.pending = None;
                    Intent::Triple
                } else {
                    Intent::None
                }
            }
        }
    }

    /// Resolve the window if its deadline has passed.
    ///
    /// A window that ends below the triple threshold is a `Single`, unless
    /// the caller asks to suppress it (the device is already in PROOF).
    pub fn poll_expired(&mut self, now: Instant, suppress_single: bool) -> Intent {
        match self.pending {
            Some(window) if now >= window.deadline => {
                self.pending = None;
                if suppress_single {
                    tracing::debug!(count = window.count, "Single activation suppressed");
                    Intent::None
                } else {
                    Intent::Single
                }
            }
            _ => Intent::None,
        }
    }

    /// Deadline of the open window, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|w| w.deadline)
    }

    /// Pulses counted in the open window
    pub fn pending_pulses(&self) -> u8 {
        self.pending.map(|w| w.count).unwrap_or(0)
    }

    /// Drop any open window without resolving it
    pub fn reset(&mut self) {
        self.pending = None;
    }
}

impl Default for GestureDisambiguator {
    fn default() -> Self {
        Self::new(Duration::from_millis(400))
    }
}
