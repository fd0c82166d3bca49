//! Configuration loading for hush-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`).
//! Every section and every field is optional.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for hush-relay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Blind object store configuration.
    pub store: StoreConfig,
    /// Rate limiting configuration.
    pub limits: LimitsConfig,
    /// Audit log configuration.
    pub audit: AuditConfig,
    /// HTTP endpoints configuration.
    pub http: HttpConfig,
    /// Sweep task configuration.
    pub cleanup: CleanupConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP/WebSocket listener (default: 0.0.0.0:5000).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Blind object store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Seconds an uploaded object stays retrievable (default: 1 hour).
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Maximum size of one object in bytes (default: 16MB).
    #[serde(default = "default_max_object_size")]
    pub max_object_size: usize,
    /// Maximum number of resident objects (default: 10000).
    #[serde(default = "default_max_objects")]
    pub max_objects: usize,
    /// Maximum total resident payload bytes (default: 512MB).
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: usize,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum inbound events per connection per minute (default: 600).
    #[serde(default = "default_messages_per_minute")]
    pub messages_per_minute: u32,
    /// Maximum requests per second across all clients (default: 2000).
    #[serde(default = "default_global_requests_per_second")]
    pub global_requests_per_second: u32,
    /// Maximum simultaneous WebSocket connections (default: 10000).
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,
    /// Outbound frames buffered per connection before pushes are dropped (default: 256).
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
    /// Records queued for the audit writer before new ones are dropped (default: 1024).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Enable metrics endpoint (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

/// Sweep task configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Sweep interval in seconds (default: 60).
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,
    /// Enable sweep task (default: true).
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_retention_secs() -> u64 {
    60 * 60 // 1 hour
}

fn default_max_object_size() -> usize {
    16 * 1024 * 1024 // 16MB
}

fn default_max_objects() -> usize {
    10_000
}

fn default_max_total_bytes() -> usize {
    512 * 1024 * 1024 // 512MB
}

fn default_messages_per_minute() -> u32 {
    600
}

fn default_global_requests_per_second() -> u32 {
    2000
}

fn default_max_concurrent_sessions() -> usize {
    10_000
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_database_path() -> PathBuf {
    PathBuf::from("hush.db")
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_cleanup_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            max_object_size: default_max_object_size(),
            max_objects: default_max_objects(),
            max_total_bytes: default_max_total_bytes(),
        }
    }
}

impl StoreConfig {
    /// Retention window as a Duration.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            messages_per_minute: default_messages_per_minute(),
            global_requests_per_second: default_global_requests_per_second(),
            max_concurrent_sessions: default_max_concurrent_sessions(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval(),
            enabled: default_cleanup_enabled(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero_checks = [
            ("limits.messages_per_minute", self.limits.messages_per_minute as usize),
            (
                "limits.global_requests_per_second",
                self.limits.global_requests_per_second as usize,
            ),
            ("limits.outbound_buffer", self.limits.outbound_buffer),
            ("audit.queue_capacity", self.audit.queue_capacity),
            ("cleanup.interval_secs", self.cleanup.interval_secs as usize),
        ];
        for (field, value) in zero_checks {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        if self.store.max_object_size > self.store.max_total_bytes {
            return Err(ConfigError::Invalid {
                field: "store.max_object_size",
                reason: "must not exceed store.max_total_bytes".into(),
            });
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid config value {field}: {reason}")]
    Invalid {
        /// Dotted name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:5000");
        assert_eq!(config.store.retention_secs, 3600);
        assert_eq!(config.limits.outbound_buffer, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
bind_address = "127.0.0.1:6000"

[store]
retention_secs = 600
max_object_size = 1048576

[limits]
messages_per_minute = 30

[audit]
database = "/data/hush.db"

[cleanup]
interval_secs = 15
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:6000");
        assert_eq!(config.store.retention(), Duration::from_secs(600));
        assert_eq!(config.store.max_object_size, 1048576);
        assert_eq!(config.limits.messages_per_minute, 30);
        assert_eq!(config.audit.database, PathBuf::from("/data/hush.db"));
        assert_eq!(config.cleanup.interval_secs, 15);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.store.max_objects, 10_000);
        assert_eq!(config.audit.queue_capacity, 1024);
        assert!(config.http.metrics_enabled);
        assert!(config.cleanup.enabled);
    }

    #[test]
    fn zero_rate_is_rejected() {
        let mut config = Config::default();
        config.limits.messages_per_minute = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("limits.messages_per_minute"));
    }

    #[test]
    fn object_larger_than_budget_is_rejected() {
        let mut config = Config::default();
        config.store.max_total_bytes = 10;
        config.store.max_object_size = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[store]\nretention_secs = 42").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.store.retention_secs, 42);
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[store\nretention_secs = ").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = Config::from_file(std::path::Path::new("/nonexistent/relay.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
