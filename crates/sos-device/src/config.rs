//! Configuration for the device runtime

use serde::{Deserialize, Serialize};
use sos_core::{EscalationConfig, GeoConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Main device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Relay socket address
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    /// Reverse-geocoding endpoint
    #[serde(default = "default_nominatim_url")]
    pub nominatim_url: String,

    /// User agent sent to the geocoder
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Geocoder request timeout in seconds
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,

    /// JSON file backing the profile store
    #[serde(default = "default_profile_path")]
    pub profile_path: PathBuf,

    /// First reconnect delay in milliseconds
    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_ms: u64,

    /// Upper bound for the reconnect delay in milliseconds
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_ms: u64,

    /// Escalation timing and identity
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Stations and lookup throttling
    #[serde(default)]
    pub geo: GeoConfig,

    /// Simulated positioning and microphone
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            nominatim_url: default_nominatim_url(),
            user_agent: default_user_agent(),
            lookup_timeout_secs: default_lookup_timeout(),
            profile_path: default_profile_path(),
            reconnect_initial_ms: default_reconnect_initial(),
            reconnect_max_ms: default_reconnect_max(),
            escalation: EscalationConfig::default(),
            geo: GeoConfig::default(),
            simulation: SimulationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl DeviceConfig {
    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    /// Load configuration: defaults, then the optional file, then
    /// `SOS_DEVICE__SECTION__KEY` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DeviceConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SOS_DEVICE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

/// Simulated capabilities for running without device hardware
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Whether the positioning capability is granted
    #[serde(default = "default_true")]
    pub positioning: bool,

    /// Whether the microphone capability is granted
    #[serde(default = "default_true")]
    pub microphone: bool,

    /// Centre of the simulated walk
    #[serde(default = "default_start_lat")]
    pub start_lat: f64,

    #[serde(default = "default_start_lng")]
    pub start_lng: f64,

    /// Maximum jitter per sample, in degrees
    #[serde(default = "default_jitter")]
    pub jitter_deg: f64,

    /// Spacing between positioning samples in milliseconds
    #[serde(default = "default_fix_interval")]
    pub fix_interval_ms: u64,

    /// Stop the feed (and the session) after this many samples
    #[serde(default)]
    pub max_fixes: Option<u64>,

    /// Spacing between simulated audio chunks in milliseconds
    #[serde(default = "default_audio_chunk")]
    pub audio_chunk_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            positioning: true,
            microphone: true,
            start_lat: default_start_lat(),
            start_lng: default_start_lng(),
            jitter_deg: default_jitter(),
            fix_interval_ms: default_fix_interval(),
            max_fixes: None,
            audio_chunk_ms: default_audio_chunk(),
        }
    }
}

impl SimulationConfig {
    pub fn fix_interval(&self) -> Duration {
        Duration::from_millis(self.fix_interval_ms)
    }

    pub fn audio_chunk(&self) -> Duration {
        Duration::from_millis(self.audio_chunk_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_relay_url() -> String {
    "ws://127.0.0.1:8080/".to_string()
}

fn default_nominatim_url() -> String {
    "https://nominatim.openstreetmap.org/reverse".to_string()
}

fn default_user_agent() -> String {
    format!("sos-device/{}", env!("CARGO_PKG_VERSION"))
}

fn default_lookup_timeout() -> u64 {
    10
}

fn default_profile_path() -> PathBuf {
    PathBuf::from("sos_profile.json")
}

fn default_reconnect_initial() -> u64 {
    500
}

fn default_reconnect_max() -> u64 {
    30_000
}

fn default_start_lat() -> f64 {
    19.2183
}

fn default_start_lng() -> f64 {
    73.0868
}

fn default_jitter() -> f64 {
    0.0005
}

fn default_fix_interval() -> u64 {
    3_000
}

fn default_audio_chunk() -> u64 {
    250
}

fn default_log_level() -> String {
    "info".to_string()
}
