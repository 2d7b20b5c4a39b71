//! One-second countdown timers.
//!
//! Used for the evidence recording window and the dead-man-switch. The owner
//! sleeps until [`Countdown::next_deadline`] and then calls
//! [`Countdown::advance`], which applies one decrement per elapsed second.

use std::time::Duration;
use tokio::time::Instant;

const TICK: Duration = Duration::from_secs(1);

/// Result of advancing a countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStatus {
    /// Not running
    Idle,
    /// Running; no tick was due
    Pending,
    /// One or more ticks applied, time remains
    Ticked { remaining_secs: u32 },
    /// Reached zero on this advance; the countdown is now stopped
    Expired,
}

/// Countdown state: seconds remaining and whether it is running
#[derive(Debug, Clone)]
pub struct Countdown {
    initial_secs: u32,
    remaining_secs: u32,
    next_tick: Option<Instant>,
}

impl Countdown {
    /// Create a stopped countdown
    pub fn new(initial_secs: u32) -> Self {
        Self {
            initial_secs,
            remaining_secs: initial_secs,
            next_tick: None,
        }
    }

    /// Start (or restart) from the initial duration
    pub fn start(&mut self, now: Instant) {
        self.remaining_secs = self.initial_secs;
        self.next_tick = Some(now + TICK);
    }

    /// Stop without touching the remaining time
    pub fn stop(&mut self) {
        self.next_tick = None;
    }

    /// Stop and restore the initial duration
    pub fn reset(&mut self) {
        self.stop();
        self.remaining_secs = self.initial_secs;
    }

    pub fn is_active(&self) -> bool {
        self.next_tick.is_some()
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn initial_secs(&self) -> u32 {
        self.initial_secs
    }

    /// When the next tick is due
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Apply every tick due at `now`
    pub fn advance(&mut self, now: Instant) -> CountdownStatus {
        let Some(mut next) = self.next_tick else {
            return CountdownStatus::Idle;
        };
        if now < next {
            return CountdownStatus::Pending;
        }

        while next <= now && self.remaining_secs > 0 {
            self.remaining_secs -= 1;
            next += TICK;
        }

        if self.remaining_secs == 0 {
            self.next_tick = None;
            CountdownStatus::Expired
        } else {
            self.next_tick = Some(next);
            CountdownStatus::Ticked {
                remaining_secs: self.remaining_secs,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_down_to_expiry() {
        let start = Instant::now();
        let mut countdown = Countdown::new(3);
        assert_eq!(countdown.advance(start), CountdownStatus::Idle);

        countdown.start(start);
        assert!(countdown.is_active());
        assert_eq!(
            countdown.advance(start + Duration::from_millis(500)),
            CountdownStatus::Pending
        );
        assert_eq!(
            countdown.advance(start + TICK),
            CountdownStatus::Ticked { remaining_secs: 2 }
        );
        assert_eq!(
            countdown.advance(start + TICK * 2),
            CountdownStatus::Ticked { remaining_secs: 1 }
        );
        assert_eq!(countdown.advance(start + TICK * 3), CountdownStatus::Expired);
        assert!(!countdown.is_active());
        assert_eq!(countdown.advance(start + TICK * 4), CountdownStatus::Idle);
    }

    #[test]
    fn test_late_advance_catches_up() {
        let start = Instant::now();
        let mut countdown = Countdown::new(10);
        countdown.start(start);

        assert_eq!(
            countdown.advance(start + Duration::from_millis(4500)),
            CountdownStatus::Ticked { remaining_secs: 6 }
        );
        assert_eq!(countdown.next_deadline(), Some(start + TICK * 5));
    }

    #[test]
    fn test_reset_restores_initial() {
        let start = Instant::now();
        let mut countdown = Countdown::new(300);
        countdown.start(start);
        countdown.advance(start + TICK * 10);
        assert_eq!(countdown.remaining_secs(), 290);

        countdown.reset();
        assert!(!countdown.is_active());
        assert_eq!(countdown.remaining_secs(), 300);
    }
}
