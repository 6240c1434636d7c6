//! Node configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML/TOML/JSON
//! file, then `RELAY_*` environment variables. Command line flags are applied
//! on top by the binary.

use relay_realtime::{HubConfig, MalformedPolicy, DEFAULT_NAMES};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "RELAY";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Configuration for the relay node.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct Config {
    /// HTTP/WebSocket listen address.
    pub api_addr: SocketAddr,
    /// Log level.
    pub log_level: String,
    /// Log format: `pretty` or `json`.
    #[validate(custom(function = "validate_log_format"))]
    pub log_format: String,
    /// Upper bound for a single send to a client, in milliseconds.
    #[validate(range(min = 1, max = 60000))]
    pub send_timeout_ms: u64,
    /// Capacity of each client's outbound queue.
    #[validate(range(min = 1, max = 65536))]
    pub outbound_buffer: usize,
    /// Maximum number of connected clients.
    #[validate(range(min = 1))]
    pub max_connections: usize,
    /// Handling of unparsable messages.
    pub malformed_policy: MalformedPolicy,
    /// Duration of the simulated `long_task` job, in milliseconds.
    pub long_task_delay_ms: u64,
    /// Display name pool override.
    pub names: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            send_timeout_ms: 5000,
            outbound_buffer: relay_realtime::OUTBOUND_BUFFER,
            max_connections: relay_realtime::MAX_CONNECTIONS,
            malformed_policy: MalformedPolicy::Skip,
            long_task_delay_ms: 5000,
            names: None,
        }
    }
}

impl Config {
    /// Load and validate configuration from defaults, an optional file and
    /// the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Per-send timeout.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Delay of the `long_task` job.
    pub fn long_task_delay(&self) -> Duration {
        Duration::from_millis(self.long_task_delay_ms)
    }

    /// Hub settings derived from this configuration.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            send_timeout: self.send_timeout(),
            outbound_buffer: self.outbound_buffer,
            max_connections: self.max_connections,
            malformed_policy: self.malformed_policy,
            name_pool: self
                .names
                .clone()
                .unwrap_or_else(|| DEFAULT_NAMES.iter().map(|n| n.to_string()).collect()),
        }
    }
}

fn validate_log_format(format: &str) -> Result<(), ValidationError> {
    match format.to_lowercase().as_str() {
        "pretty" | "json" => Ok(()),
        _ => Err(ValidationError::new("log_format")),
    }
}
