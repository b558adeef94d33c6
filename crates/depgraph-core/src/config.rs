use crate::deps::registry::{DEFAULT_REGISTRY, REGISTRY_ENV};
use crate::deps::{ResolverOptions, DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_CONCURRENCY};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Runtime configuration for depgraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the npm registry.
    pub registry: String,

    /// Host the HTTP server binds to.
    pub host: String,

    /// Port the HTTP server listens on.
    pub port: u16,

    /// Maximum registry calls in flight per resolution.
    pub max_concurrency: usize,

    /// Timeout for a single registry call, in milliseconds.
    pub request_timeout_ms: u64,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: DEFAULT_REGISTRY.to_string(),
            host: "localhost".to_string(),
            port: 3000,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            request_timeout_ms: u64::try_from(DEFAULT_CALL_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Defaults, with the registry taken from the environment if set.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(registry) = std::env::var(REGISTRY_ENV) {
            config.registry = registry;
        }
        config
    }

    /// Load a JSON config file; missing fields take their defaults.
    ///
    /// The registry environment variable still wins over the file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: Self =
            serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;

        if let Ok(registry) = std::env::var(REGISTRY_ENV) {
            config.registry = registry;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        let registry = Url::parse(&self.registry).map_err(|e| Error::InvalidRegistry {
            url: self.registry.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(registry.scheme(), "http" | "https") {
            return Err(Error::InvalidRegistry {
                url: self.registry.clone(),
                reason: format!("unsupported scheme '{}'", registry.scheme()),
            });
        }
        if self.max_concurrency == 0 {
            return Err(Error::invalid_config("max_concurrency", "must be at least 1"));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::invalid_config("request_timeout_ms", "must be at least 1"));
        }
        Ok(())
    }

    /// Engine options derived from this config.
    #[must_use]
    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            max_concurrency: self.max_concurrency,
            call_timeout: self.request_timeout(),
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Set the registry URL.
    #[must_use]
    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = registry.into();
        self
    }

    /// Set the listen address.
    #[must_use]
    pub fn with_listen(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the registry concurrency bound.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Set the per-call registry timeout.
    #[must_use]
    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }
}
