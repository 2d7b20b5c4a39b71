//! Configuration for sos-relayd

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Main relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Text of the handshake sent to every new connection
    #[serde(default = "default_handshake_message")]
    pub handshake_message: String,

    /// Directory holding the built front-end, served with SPA fallback
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            handshake_message: default_handshake_message(),
            static_dir: None,
            enable_cors: true,
        }
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

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_handshake_message() -> String {
    "Dispatch Hub Ready".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RelayConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `SOS_RELAY__SECTION__KEY` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&RelayConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Keys contain underscores, so sections are split on a double one.
        builder = builder.add_source(
            config::Environment::with_prefix("SOS_RELAY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert!(config.server.listen_addr.ip().is_unspecified());
        assert_eq!(config.server.handshake_message, "Dispatch Hub Ready");
        assert!(config.server.static_dir.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: RelayConfig = serde_json::from_str(
            r#"{ "server": { "static_dir": "/srv/dashboard" } }"#,
        )
        .unwrap();
        assert_eq!(
            config.server.static_dir.as_deref(),
            Some(std::path::Path::new("/srv/dashboard"))
        );
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert!(config.server.enable_cors);
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_without_file() {
        let config = RelayConfig::load(None).unwrap();
        assert_eq!(config.server.handshake_message, "Dispatch Hub Ready");
    }
}
