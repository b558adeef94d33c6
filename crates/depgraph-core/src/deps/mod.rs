//! Dependency tree resolution.
//!
//! Provides utilities for:
//! - Resolving npm version ranges against published versions
//! - Fetching version lists and manifests from an npm registry
//! - Discovering a package's transitive dependency graph concurrently
//! - Rendering the graph as a finite JSON tree
//! - Caching rendered responses per request

pub mod cache;
pub mod engine;
pub mod error;
pub mod materialize;
pub mod registry;
pub mod service;
pub mod store;
pub mod version;

pub use cache::{CacheStats, RequestKey, ResponseCache};
pub use engine::{
    Resolution, Resolver, ResolverOptions, DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_CONCURRENCY,
};
pub use error::{codes as deps_codes, DepsError};
pub use materialize::{materialize, NodeError, TreeNode};
pub use registry::{
    Manifest, PackageVersions, Registry, RegistryClient, DEFAULT_REGISTRY, REGISTRY_ENV,
};
pub use service::DepsService;
pub use store::{Edge, EdgeTarget, NodeKey, NodeStatus, NodeStore};
pub use version::{resolve_package_version, resolve_version, version_satisfies, RangeSet};
