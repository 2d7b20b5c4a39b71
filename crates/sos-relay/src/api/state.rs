//! Application state for relay handlers

use crate::hub::RelayHub;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Connection set and fan-out
    pub hub: Arc<RelayHub>,

    /// Front-end build directory, if the relay also serves the dashboard
    pub static_dir: Option<PathBuf>,

    /// Relay version
    pub version: String,
}

impl AppState {
    /// Create new application state
    pub fn new(hub: Arc<RelayHub>, static_dir: Option<PathBuf>) -> Self {
        Self {
            hub,
            static_dir,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Path of the single-page entry point
    pub fn index_path(&self) -> Option<PathBuf> {
        self.static_dir.as_ref().map(|dir| dir.join("index.html"))
    }

    /// Human-readable uptime
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.hub.started_at())
            .num_seconds()
            .max(0);
        let (days, rest) = (secs / 86_400, secs % 86_400);
        let (hours, rest) = (rest / 3_600, rest % 3_600);
        let (minutes, seconds) = (rest / 60, rest % 60);

        if days > 0 {
            format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
        } else if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}
