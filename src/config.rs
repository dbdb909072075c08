//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `METRICSVC_*` environment overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub opentsdb: OpenTsdbConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote store connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct OpenTsdbConfig {
    #[serde(default = "default_opentsdb_url")]
    pub url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_total_connections")]
    pub max_total_pool_connections: usize,

    #[serde(default = "default_max_connections_per_route")]
    pub max_pool_connections_per_route: usize,
}

fn default_opentsdb_url() -> String {
    "http://localhost:4242".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_total_connections() -> usize {
    64
}

fn default_max_connections_per_route() -> usize {
    16
}

impl Default for OpenTsdbConfig {
    fn default() -> Self {
        Self {
            url: default_opentsdb_url(),
            request_timeout_secs: default_request_timeout(),
            max_total_pool_connections: default_max_total_connections(),
            max_pool_connections_per_route: default_max_connections_per_route(),
        }
    }
}

/// Worker pool used to run sub-queries
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_thread_pool_size")]
    pub thread_pool_size: usize,

    /// Deadline for a whole batch; 0 waits indefinitely
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: u64,
}

fn default_thread_pool_size() -> usize {
    8
}

fn default_batch_timeout() -> u64 {
    60
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            thread_pool_size: default_thread_pool_size(),
            batch_timeout_secs: default_batch_timeout(),
        }
    }
}

/// Defaults for requests that leave settings out
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_bucket_size")]
    pub bucket_size_secs: i64,

    #[serde(default = "default_downsample_multiplier")]
    pub downsample_multiplier: f64,
}

fn default_bucket_size() -> i64 {
    300 // 5 minutes
}

fn default_downsample_multiplier() -> f64 {
    1.0
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            bucket_size_secs: default_bucket_size(),
            downsample_multiplier: default_downsample_multiplier(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8888
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber; `RUST_LOG` wins over the configured level
    pub fn init_tracing(&self) {
        use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("metricsvc={},tower_http=info", self.level))
        });
        let json = self.format.eq_ignore_ascii_case("json");

        tracing_subscriber::registry()
            .with(filter)
            .with(json.then(|| fmt::layer().json()))
            .with((!json).then(|| fmt::layer()))
            .init();
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("metricsvc").join("config.toml")),
            Some(PathBuf::from("/etc/metricsvc/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // OpenTSDB overrides
        if let Some(url) = var("METRICSVC_OPENTSDB_URL") {
            self.opentsdb.url = url;
        }

        // Executor overrides
        if let Some(size) = var("METRICSVC_POOL_SIZE").and_then(|v| v.parse().ok()) {
            self.executor.thread_pool_size = size;
        }
        if let Some(secs) = var("METRICSVC_BATCH_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.executor.batch_timeout_secs = secs;
        }

        // Query overrides
        if let Some(secs) = var("METRICSVC_BUCKET_SIZE_SECS").and_then(|v| v.parse().ok()) {
            self.query.bucket_size_secs = secs;
        }

        // API overrides
        if let Some(host) = var("METRICSVC_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = var("METRICSVC_API_PORT").and_then(|v| v.parse().ok()) {
            self.api.port = port;
        }

        // Logging overrides
        if let Some(level) = var("METRICSVC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("METRICSVC_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Metric Service Configuration
#
# Environment variables override these settings:
# - METRICSVC_OPENTSDB_URL
# - METRICSVC_POOL_SIZE
# - METRICSVC_BATCH_TIMEOUT_SECS
# - METRICSVC_BUCKET_SIZE_SECS
# - METRICSVC_API_HOST
# - METRICSVC_API_PORT
# - METRICSVC_LOG_LEVEL
# - METRICSVC_LOG_FORMAT

[opentsdb]
# OpenTSDB base URL
url = "http://localhost:4242"

# Per sub-query request timeout in seconds
request_timeout_secs = 30

# Connection pool limits
max_total_pool_connections = 64
max_pool_connections_per_route = 16

[executor]
# Number of sub-queries fetched in parallel
thread_pool_size = 8

# Give up on a batch after this many seconds (0 = wait indefinitely)
batch_timeout_secs = 60

[query]
# Bucket width in seconds when a request does not set one
bucket_size_secs = 300

# Downsample multiplier when a request does not set one
downsample_multiplier = 1.0

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8888

# Allowed CORS origins (empty = any)
cors_origins = []

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.opentsdb.url, "http://localhost:4242");
        assert_eq!(config.executor.thread_pool_size, 8);
        assert_eq!(config.query.bucket_size_secs, 300);
        assert_eq!(config.api.port, 8888);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_generated_config_parses_to_defaults() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        let defaults = Config::default();
        assert_eq!(config.opentsdb.url, defaults.opentsdb.url);
        assert_eq!(config.executor.batch_timeout_secs, defaults.executor.batch_timeout_secs);
        assert_eq!(config.query.downsample_multiplier, defaults.query.downsample_multiplier);
        assert_eq!(config.api.host, defaults.api.host);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[executor]\nthread_pool_size = 2\n\n[query]\nbucket_size_secs = 60").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.executor.thread_pool_size, 2);
        assert_eq!(config.executor.batch_timeout_secs, 60);
        assert_eq!(config.query.bucket_size_secs, 60);
        assert_eq!(config.opentsdb.request_timeout_secs, 30);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(ConfigError::Io { .. })));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[executor\nthread_pool_size = ").unwrap();
        assert!(matches!(Config::load(&bad), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("METRICSVC_OPENTSDB_URL", "http://tsdb:4242"),
            ("METRICSVC_POOL_SIZE", "3"),
            ("METRICSVC_API_PORT", "not-a-port"),
            ("METRICSVC_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.opentsdb.url, "http://tsdb:4242");
        assert_eq!(config.executor.thread_pool_size, 3);
        assert_eq!(config.api.port, 8888);
        assert_eq!(config.logging.format, "json");
    }
}
