use std::path::PathBuf;
use thiserror::Error;

/// Process-level errors: configuration and startup.
///
/// Failures inside a resolution are [`DepsError`](crate::deps::DepsError)s
/// and end up in the rendered tree instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Invalid registry URL '{url}': {reason}")]
    InvalidRegistry { url: String, reason: String },
}

impl Error {
    #[must_use]
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
