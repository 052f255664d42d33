//! `config.toml` loading, environment overrides and validation.

mod loader;
mod types;
mod validate;

pub use loader::{load_config, load_config_from_str, ENV_PREFIX};
pub use types::*;
pub use validate::validate_config;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),

    #[error("invalid config: {0}")]
    ParseError(String),

    #[error("config rejected: {0}")]
    ValidationError(String),
}
