//! Configuration for the escalation core

use serde::{Deserialize, Serialize};
use sos_types::Station;
use std::time::Duration;

/// Timing and identity for one device's escalation controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Stable identifier stamped on every envelope
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Multi-tap detection window in milliseconds
    #[serde(default = "default_gesture_window_ms")]
    pub gesture_window_ms: u64,

    /// Length of one evidence recording episode
    #[serde(default = "default_recording_secs")]
    pub recording_secs: u32,

    /// How long SAFE is displayed before decaying to ALERT
    #[serde(default = "default_safe_decay_ms")]
    pub safe_decay_ms: u64,

    /// Initial dead-man-switch duration
    #[serde(default = "default_dead_man_secs")]
    pub dead_man_secs: u32,

    /// Number dialled by the emergency call action
    #[serde(default = "default_emergency_number")]
    pub emergency_number: String,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            gesture_window_ms: default_gesture_window_ms(),
            recording_secs: default_recording_secs(),
            safe_decay_ms: default_safe_decay_ms(),
            dead_man_secs: default_dead_man_secs(),
            emergency_number: default_emergency_number(),
        }
    }
}

impl EscalationConfig {
    pub fn gesture_window(&self) -> Duration {
        Duration::from_millis(self.gesture_window_ms)
    }

    pub fn safe_decay(&self) -> Duration {
        Duration::from_millis(self.safe_decay_ms)
    }
}

/// Station set and address throttling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// Minimum spacing between reverse-geocoding requests
    #[serde(default = "default_lookup_throttle_secs")]
    pub lookup_throttle_secs: u64,

    /// Responder stations, in tie-break order
    #[serde(default = "default_stations")]
    pub stations: Vec<Station>,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            lookup_throttle_secs: default_lookup_throttle_secs(),
            stations: default_stations(),
        }
    }
}

impl GeoConfig {
    pub fn lookup_throttle(&self) -> Duration {
        Duration::from_secs(self.lookup_throttle_secs)
    }
}

// Default value helpers
fn default_device_id() -> String {
    "USER_123".to_string()
}

fn default_gesture_window_ms() -> u64 {
    400
}

fn default_recording_secs() -> u32 {
    10
}

fn default_safe_decay_ms() -> u64 {
    2000
}

fn default_dead_man_secs() -> u32 {
    300
}

fn default_emergency_number() -> String {
    "112".to_string()
}

fn default_lookup_throttle_secs() -> u64 {
    10
}

pub fn default_stations() -> Vec<Station> {
    vec![
        Station::new("Dombivali Police Station", 19.2183, 73.0868),
        Station::new("Thane Police Station", 19.2183, 72.9781),
        Station::new("Mumbai Central Control", 18.9750, 72.8258),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_defaults() {
        let config = EscalationConfig::default();
        assert_eq!(config.gesture_window(), Duration::from_millis(400));
        assert_eq!(config.recording_secs, 10);
        assert_eq!(config.safe_decay(), Duration::from_secs(2));
        assert_eq!(config.dead_man_secs, 300);
        assert_eq!(config.emergency_number, "112");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: EscalationConfig =
            serde_json::from_str(r#"{"device_id":"phone-7"}"#).unwrap();
        assert_eq!(config.device_id, "phone-7");
        assert_eq!(config.gesture_window_ms, 400);
    }

    #[test]
    fn test_geo_defaults() {
        let config = GeoConfig::default();
        assert_eq!(config.lookup_throttle(), Duration::from_secs(10));
        assert_eq!(config.stations.len(), 3);
        assert_eq!(config.stations[0].name, "Dombivali Police Station");
    }
}
