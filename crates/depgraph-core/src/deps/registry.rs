//! npm registry gateway.

use super::error::{codes, DepsError};
use crate::version::user_agent;
use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Environment variable to override registry URL.
pub const REGISTRY_ENV: &str = "DEPGRAPH_NPM_REGISTRY";

/// Direct dependencies of one package version, in manifest order.
pub type Manifest = IndexMap<String, String>;

/// Published versions of a package plus its `latest` dist-tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageVersions {
    pub versions: Vec<String>,
    /// `dist-tags.latest`, when the registry reports one.
    pub latest: Option<String>,
}

/// Source of package metadata.
///
/// Implementations must be safe to call from many resolution tasks at once;
/// no ordering is guaranteed between calls.
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    /// Fetch every published version string of a package.
    async fn fetch_versions(&self, name: &str) -> Result<Vec<String>, DepsError>;

    /// Fetch versions together with the `latest` dist-tag.
    ///
    /// The default has no dist-tags; `latest` then falls back to the highest
    /// stable version.
    async fn fetch_package(&self, name: &str) -> Result<PackageVersions, DepsError> {
        Ok(PackageVersions {
            versions: self.fetch_versions(name).await?,
            latest: None,
        })
    }

    /// Fetch the direct dependency constraints of one concrete version.
    async fn fetch_manifest(&self, name: &str, version: &str) -> Result<Manifest, DepsError>;
}

/// Registry client for fetching package metadata over HTTP.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: Client,
}

impl RegistryClient {
    /// Create a new registry client with the given base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn new(base_url: &str) -> Result<Self, DepsError> {
        Self::with_timeout(base_url, Duration::from_secs(15))
    }

    /// Create a new registry client with an overall per-request timeout.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, DepsError> {
        let mut base_url = Url::parse(base_url).map_err(|e| {
            DepsError::registry_unavailable(format!("Invalid registry URL '{base_url}': {e}"))
        })?;

        // Url::join drops the last path segment unless the base ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .user_agent(user_agent())
            .build()
            .map_err(|e| {
                DepsError::registry_unavailable(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self { base_url, http })
    }

    /// Create a client using the registry URL from environment or default.
    ///
    /// # Errors
    /// Returns an error if the client cannot be created.
    pub fn from_env() -> Result<Self, DepsError> {
        let url = std::env::var(REGISTRY_ENV).unwrap_or_else(|_| DEFAULT_REGISTRY.to_string());
        Self::new(&url)
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the URL for a package, optionally at a specific version.
    fn package_url(&self, name: &str, version: Option<&str>) -> Result<Url, DepsError> {
        // URL-encode the name for scoped packages
        let encoded_name = if name.starts_with('@') {
            name.replace('/', "%2F")
        } else {
            name.to_string()
        };

        let path = match version {
            Some(version) => format!("{encoded_name}/{version}"),
            None => encoded_name,
        };

        self.base_url.join(&path).map_err(|e| {
            DepsError::registry_unavailable(format!("Failed to build URL for '{name}': {e}"))
        })
    }

    /// GET a JSON document, mapping 404 to not-found.
    async fn get_json(&self, name: &str, url: Url) -> Result<serde_json::Value, DepsError> {
        let response = self.http.get(url.as_str()).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(DepsError::not_found(name));
        }

        if !response.status().is_success() {
            return Err(DepsError::registry_unavailable(format!(
                "Registry returned status {} for '{name}'",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Registry for RegistryClient {
    async fn fetch_versions(&self, name: &str) -> Result<Vec<String>, DepsError> {
        Ok(self.fetch_package(name).await?.versions)
    }

    async fn fetch_package(&self, name: &str) -> Result<PackageVersions, DepsError> {
        let url = self.package_url(name, None)?;
        let packument = self.get_json(name, url).await?;
        Ok(PackageVersions {
            versions: get_versions(&packument),
            latest: get_latest_version(&packument).map(String::from),
        })
    }

    async fn fetch_manifest(&self, name: &str, version: &str) -> Result<Manifest, DepsError> {
        let url = self.package_url(name, Some(version))?;
        match self.get_json(name, url).await {
            Ok(manifest) => Ok(get_dependencies(&manifest)),
            Err(e) if e.code() == codes::DEPS_REGISTRY_UNAVAILABLE => {
                Err(DepsError::manifest_unavailable(name, version, e.message()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Get all available version strings from a packument.
#[must_use]
pub fn get_versions(packument: &serde_json::Value) -> Vec<String> {
    packument
        .get("versions")
        .and_then(|v| v.as_object())
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default()
}

/// Get `dist-tags.latest` from a packument.
#[must_use]
pub fn get_latest_version(packument: &serde_json::Value) -> Option<&str> {
    packument.get("dist-tags")?.get("latest")?.as_str()
}

/// Get the `dependencies` map of a version manifest.
///
/// Entries whose range is not a string are skipped.
#[must_use]
pub fn get_dependencies(manifest: &serde_json::Value) -> Manifest {
    manifest
        .get("dependencies")
        .and_then(|d| d.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
