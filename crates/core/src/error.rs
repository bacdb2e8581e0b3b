use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating the application config.
///
/// Every variant is fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid API key: expected 32 characters, got {0}")]
    ApiKey(usize),

    #[error("config error: {0}")]
    Validation(String),
}
