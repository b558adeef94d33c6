//! Request-level facade: validation, caching, resolution and serialization.

use super::cache::{RequestKey, ResponseCache};
use super::engine::{Resolver, ResolverOptions};
use super::error::DepsError;
use super::materialize::{materialize, TreeNode};
use super::registry::Registry;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Dependency tree service shared by every request of a process.
#[derive(Debug)]
pub struct DepsService<R> {
    resolver: Resolver<R>,
    cache: ResponseCache,
}

impl<R: Registry> DepsService<R> {
    #[must_use]
    pub fn new(registry: R, options: ResolverOptions) -> Self {
        Self {
            resolver: Resolver::new(registry, options),
            cache: ResponseCache::new(),
        }
    }

    #[must_use]
    pub fn from_shared(registry: Arc<R>, options: ResolverOptions) -> Self {
        Self {
            resolver: Resolver::from_shared(registry, options),
            cache: ResponseCache::new(),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<R> {
        self.resolver.registry()
    }

    /// Resolve and materialize a tree, bypassing the response cache.
    ///
    /// # Errors
    /// Returns `DEPS_REQUEST_INVALID` if the name or constraint is empty.
    pub async fn tree(&self, name: &str, constraint: &str) -> Result<TreeNode, DepsError> {
        validate(name, constraint)?;

        let start = Instant::now();
        let resolution = self.resolver.resolve(name, constraint).await;
        let tree = materialize(&resolution);

        info!(
            name,
            constraint,
            version = %tree.version,
            packages = tree.size(),
            elapsed_ms = start.elapsed().as_millis(),
            "Resolved dependency tree"
        );

        Ok(tree)
    }

    /// The serialized tree for a request, served from cache when possible.
    ///
    /// Trees holding a registry outage or timeout are returned but not
    /// cached, so the next identical request resolves again.
    ///
    /// # Errors
    /// Returns `DEPS_REQUEST_INVALID` for empty parameters and
    /// `DEPS_SERIALIZE_FAILED` if the tree cannot be encoded.
    pub async fn tree_json(&self, name: &str, constraint: &str) -> Result<Bytes, DepsError> {
        let key = RequestKey::new(name, constraint);
        if let Some(cached) = self.cache.get(&key) {
            debug!(%key, "Serving cached response");
            return Ok(cached);
        }

        let tree = self.tree(name, constraint).await?;
        let body = Bytes::from(
            serde_json::to_vec(&tree).map_err(|e| DepsError::serialize_failed(e.to_string()))?,
        );

        // A registry hiccup must not be replayed for the life of the process
        if tree.has_transient_error() {
            debug!(%key, "Not caching tree with transient failures");
        } else {
            self.cache.put(key, body.clone());
        }
        Ok(body)
    }
}

fn validate(name: &str, constraint: &str) -> Result<(), DepsError> {
    if name.trim().is_empty() {
        return Err(DepsError::request_invalid("Package name is required"));
    }
    if constraint.trim().is_empty() {
        return Err(DepsError::request_invalid("Package version is required"));
    }
    validate_name(name)
}

/// Names end up in a registry URL path, so only `name` or `@scope/name`
/// made of URL-safe characters is accepted.
fn validate_name(name: &str) -> Result<(), DepsError> {
    let invalid = |reason: &str| {
        DepsError::request_invalid(format!("Invalid package name '{name}': {reason}"))
    };

    if let Some(c) = name.chars().find(|&c| {
        matches!(c, '?' | '#' | '%' | '\\') || c.is_whitespace() || c.is_control()
    }) {
        return Err(invalid(&format!("character {c:?} is not allowed")));
    }

    let segments: Vec<&str> = name.split('/').collect();
    let well_formed = match segments.as_slice() {
        [bare] => !bare.starts_with('@'),
        [scope, _] => scope.starts_with('@') && scope.len() > 1,
        _ => false,
    };
    if !well_formed {
        return Err(invalid("expected 'name' or '@scope/name'"));
    }

    if segments.iter().any(|s| s.is_empty() || s.starts_with('.')) {
        return Err(invalid("path segments must not be empty or start with '.'"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::error::codes;
    use crate::deps::registry::Manifest;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fixed registry: name -> [(version, deps)].
    struct FixtureRegistry {
        packages: HashMap<&'static str, Vec<(&'static str, Vec<(&'static str, &'static str)>)>>,
        calls: AtomicUsize,
    }

    impl FixtureRegistry {
        fn scenario() -> Self {
            let mut packages = HashMap::new();
            packages.insert("leaf-pkg", vec![("1.0.0", vec![])]);
            packages.insert(
                "root",
                vec![("1.0.0", vec![]), ("1.2.0", vec![("leaf", "^1.0.0")])],
            );
            packages.insert("leaf", vec![("1.0.0", vec![])]);
            Self {
                packages,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Registry for FixtureRegistry {
        async fn fetch_versions(&self, name: &str) -> Result<Vec<String>, DepsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.packages
                .get(name)
                .map(|v| v.iter().map(|(version, _)| (*version).to_string()).collect())
                .ok_or_else(|| DepsError::not_found(name))
        }

        async fn fetch_manifest(&self, name: &str, version: &str) -> Result<Manifest, DepsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.packages
                .get(name)
                .and_then(|v| v.iter().find(|(ver, _)| *ver == version))
                .map(|(_, deps)| {
                    deps.iter()
                        .map(|(n, c)| ((*n).to_string(), (*c).to_string()))
                        .collect()
                })
                .ok_or_else(|| DepsError::not_found(name))
        }
    }

    fn service() -> DepsService<FixtureRegistry> {
        DepsService::new(FixtureRegistry::scenario(), ResolverOptions::default())
    }

    #[tokio::test]
    async fn test_leaf_package_body() {
        let service = service();
        let body = service.tree_json("leaf-pkg", "1.0.0").await.unwrap();
        assert_eq!(
            &body[..],
            br#"{"name":"leaf-pkg","version":"1.0.0","dependencies":{}}"#
        );
    }

    #[tokio::test]
    async fn test_root_with_leaf() {
        let service = service();
        let tree = service.tree("root", "^1.0.0").await.unwrap();

        assert_eq!(tree.name, "root");
        assert_eq!(tree.version, "1.2.0");
        assert_eq!(tree.dependencies.len(), 1);
        let leaf = tree.dependencies.values().next().unwrap();
        assert_eq!((leaf.name.as_str(), leaf.version.as_str()), ("leaf", "1.0.0"));
        assert!(leaf.dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_repeat_request_is_cached() {
        let service = service();

        let first = service.tree_json("root", "^1.0.0").await.unwrap();
        let calls = service.registry().calls.load(Ordering::SeqCst);
        assert!(calls > 0);

        let second = service.tree_json("root", "^1.0.0").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.registry().calls.load(Ordering::SeqCst), calls);
        assert_eq!(service.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_different_spelling_is_a_different_request() {
        let service = service();
        service.tree_json("root", "^1.0.0").await.unwrap();
        service.tree_json("root", "^1.0").await.unwrap();
        assert_eq!(service.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_parameters_rejected() {
        let service = service();

        let err = service.tree_json("", "1.0.0").await.unwrap_err();
        assert_eq!(err.code(), codes::DEPS_REQUEST_INVALID);

        let err = service.tree_json("leaf-pkg", "  ").await.unwrap_err();
        assert_eq!(err.code(), codes::DEPS_REQUEST_INVALID);

        assert_eq!(service.registry().calls.load(Ordering::SeqCst), 0);
        assert!(service.cache().is_empty());
    }

    /// Fails the first versions lookup, then behaves.
    #[derive(Default)]
    struct FlakyRegistry {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Registry for FlakyRegistry {
        async fn fetch_versions(&self, _name: &str) -> Result<Vec<String>, DepsError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(DepsError::registry_unavailable("connection reset"));
            }
            Ok(vec!["1.0.0".to_string()])
        }

        async fn fetch_manifest(&self, _name: &str, _version: &str) -> Result<Manifest, DepsError> {
            Ok(Manifest::new())
        }
    }

    #[tokio::test]
    async fn test_transient_failure_is_not_cached() {
        let service = DepsService::new(FlakyRegistry::default(), ResolverOptions::default());

        let first = service.tree_json("x", "1.0.0").await.unwrap();
        let first: TreeNode = serde_json::from_slice(&first).unwrap();
        assert_eq!(
            first.error.map(|e| e.code),
            Some(codes::DEPS_REGISTRY_UNAVAILABLE.to_string())
        );
        assert!(service.cache().is_empty());

        let second = service.tree_json("x", "1.0.0").await.unwrap();
        assert_eq!(
            &second[..],
            br#"{"name":"x","version":"1.0.0","dependencies":{}}"#
        );
        assert_eq!(service.cache().len(), 1);

        let third = service.tree_json("x", "1.0.0").await.unwrap();
        assert_eq!(second, third);
        assert_eq!(service.registry().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_cached() {
        let service = service();

        service.tree_json("nope", "^1.0.0").await.unwrap();
        let calls = service.registry().calls.load(Ordering::SeqCst);
        service.tree_json("nope", "^1.0.0").await.unwrap();

        assert_eq!(service.registry().calls.load(Ordering::SeqCst), calls);
        assert_eq!(service.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_names_that_would_escape_the_registry_path() {
        let service = service();

        for name in [
            "../admin",
            "a/../../b",
            "left-pad?write=true",
            "left-pad#frag",
            "left%2Fpad",
            "a\\b",
            "foo bar",
            "a/b",
            "@/pkg",
            "@scope/pkg/extra",
            "@scope",
            ".hidden",
            "@scope/.",
        ] {
            let err = service.tree_json(name, "1.0.0").await.unwrap_err();
            assert_eq!(err.code(), codes::DEPS_REQUEST_INVALID, "name {name:?}");
        }

        assert_eq!(service.registry().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_valid_names() {
        for name in ["leaf-pkg", "@types/node", "lodash.merge", "a_b", "@babel/core"] {
            assert!(validate_name(name).is_ok(), "name {name:?}");
        }
    }

    #[tokio::test]
    async fn test_unknown_root_still_answers() {
        let service = service();
        let tree = service.tree("nope", "^1.0.0").await.unwrap();

        assert_eq!(tree.name, "nope");
        assert_eq!(tree.version, "^1.0.0");
        assert!(tree.dependencies.is_empty());
        assert_eq!(
            tree.error.map(|e| e.code),
            Some(codes::DEPS_PACKAGE_NOT_FOUND.to_string())
        );
    }
}
