//! Broker configuration.
//!
//! Supports configuration from:
//! - TOML file (default: `midge.toml`)
//! - Environment variables with `MIDGE__` prefix (double underscore for
//!   nesting), e.g. `MIDGE__SERVER__BIND=0.0.0.0:1884`
//! - In-file variable substitution: `${VAR}` or `${VAR:-default}`

mod limits;
mod log;
mod server;
mod store;

use std::path::Path;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

pub use self::limits::{LimitsConfig, DEFAULT_MAX_PAYLOAD_SIZE};
pub use self::log::LogConfig;
pub use self::server::ServerConfig;
pub use self::store::{KeyRepr, StoreConfig};

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration.
    pub log: LogConfig,
    /// Listener configuration.
    pub server: ServerConfig,
    /// Datastore key representation.
    pub store: StoreConfig,
    /// Resource limits.
    pub limits: LimitsConfig,
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading the config file.
    Io(std::io::Error),
    /// Config parsing/loading error.
    Config(config::ConfigError),
    /// Invalid configuration value.
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable
    /// overrides. A missing file is not an error; defaults apply.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("server.bind", "0.0.0.0:1883")?
            .set_default("store.keys", "string")?
            .set_default("limits.max_payload_size", DEFAULT_MAX_PAYLOAD_SIZE as i64)?;

        let path = path.as_ref();
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    let substituted = substitute_env_vars(&content);
                    builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
                }
                Err(e) => return Err(ConfigError::Io(e)),
            }
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix("MIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (for testing).
    #[allow(dead_code)]
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let substituted = substitute_env_vars(content);
        let config: Config = toml::from_str(&substituted)
            .map_err(|e| ConfigError::Validation(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_toml() {
        let toml = r#"
[log]
level = "debug"

[server]
bind = "127.0.0.1:1884"

[store]
keys = "packed"

[limits]
max_payload_size = 4096
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.server.bind.port(), 1884);
        assert_eq!(config.store.keys, KeyRepr::Packed);
        assert_eq!(config.limits.max_payload_size, 4096);
    }

    #[test]
    fn parse_partial_toml_keeps_defaults() {
        let toml = r#"
[limits]
max_payload_size = 512000
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.limits.max_payload_size, 512000);
        assert_eq!(config.server.bind.port(), 1883);
        assert_eq!(config.store.keys, KeyRepr::String);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn env_var_substitution() {
        std::env::set_var("MIDGE_TEST_PORT", "1885");
        let content = r#"
[server]
bind = "0.0.0.0:${MIDGE_TEST_PORT}"
"#;
        let substituted = substitute_env_vars(content);
        assert!(substituted.contains("0.0.0.0:1885"));
        std::env::remove_var("MIDGE_TEST_PORT");
    }

    #[test]
    fn env_var_substitution_with_default() {
        std::env::remove_var("MIDGE_NONEXISTENT_VAR");
        let content = r#"bind = "${MIDGE_NONEXISTENT_VAR:-0.0.0.0:1883}""#;
        let substituted = substitute_env_vars(content);
        assert!(substituted.contains("0.0.0.0:1883"));
    }

    #[test]
    fn unknown_key_repr_is_rejected() {
        let toml = r#"
[store]
keys = "trie"
"#;
        assert!(Config::parse(toml).is_err());
    }

    #[test]
    fn zero_payload_limit_is_rejected() {
        let toml = r#"
[limits]
max_payload_size = 0
"#;
        assert!(Config::parse(toml).is_err());
    }
}
