//! Configuration loading and typed config structures for threadpulse.
//!
//! The configuration lives in a YAML file (`threadpulse.yaml` by default).
//! Every field has a default, so an empty or missing file yields a working
//! setup. Values are validated after parsing and a small set of environment
//! variables can override the file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use threadpulse_types::HistogramSchema;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PulseConfig {
    /// Broadcast stream settings.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Histogram bucketing settings.
    #[serde(default)]
    pub histogram: HistogramConfig,

    /// Observer HTTP/WebSocket server settings.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PulseConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override file values:
    /// - `THREADPULSE_FLUSH_INTERVAL_MS` overrides `stream.flush_interval_ms`
    /// - `OBSERVER_PORT` overrides `observer.port`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    /// Environment overrides apply in both cases.
    ///
    /// # Errors
    ///
    /// Same as [`from_file`](Self::from_file).
    pub fn from_file_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string. No environment
    /// overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to a mapping.
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if an override is not a number.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if an override is not a number.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("THREADPULSE_FLUSH_INTERVAL_MS") {
            self.stream.flush_interval_ms = val.trim().parse().map_err(|e| ConfigError::Invalid {
                reason: format!("THREADPULSE_FLUSH_INTERVAL_MS={val}: {e}"),
            })?;
        }
        if let Some(val) = lookup("OBSERVER_PORT") {
            self.observer.port = val.trim().parse().map_err(|e| ConfigError::Invalid {
                reason: format!("OBSERVER_PORT={val}: {e}"),
            })?;
        }
        Ok(())
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "stream.flush_interval_ms must be greater than zero".to_owned(),
            });
        }
        if self.stream.channel_buffer == 0 {
            return Err(ConfigError::Invalid {
                reason: "stream.channel_buffer must be greater than zero".to_owned(),
            });
        }
        if HistogramSchema::by_name(&self.histogram.schema).is_none() {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "unknown histogram.schema '{}' (expected 'normal' or 'fast')",
                    self.histogram.schema
                ),
            });
        }
        Ok(())
    }
}

/// Broadcast stream configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamConfig {
    /// Milliseconds between broadcast ticks while any observer is attached.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Depth of each observer's outbound payload queue.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

impl StreamConfig {
    /// The broadcast interval as a [`Duration`].
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            channel_buffer: default_channel_buffer(),
        }
    }
}

/// Histogram configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistogramConfig {
    /// Built-in schema name: `normal` or `fast`.
    #[serde(default = "default_schema")]
    pub schema: String,
}

impl HistogramConfig {
    /// Resolve the configured schema, falling back to
    /// [`HistogramSchema::NORMAL`] for unknown names.
    pub fn resolve(&self) -> HistogramSchema {
        HistogramSchema::by_name(&self.schema).unwrap_or_default()
    }
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            schema: default_schema(),
        }
    }
}

/// Observer server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObserverConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

const fn default_flush_interval_ms() -> u64 {
    1_000
}

const fn default_channel_buffer() -> usize {
    64
}

fn default_schema() -> String {
    "normal".to_owned()
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    8080
}

fn default_level() -> String {
    "info".to_owned()
}
