//! Concurrent dependency graph discovery.
//!
//! Every dependency edge is resolved by its own task. Tasks share one
//! [`NodeStore`] and one [`TaskTracker`] per pass; the tracker is the join
//! barrier the root waits on, since the number of tasks is only known once
//! the graph has been walked.

use super::error::DepsError;
use super::registry::{PackageVersions, Registry};
use super::store::{Edge, EdgeTarget, NodeKey, NodeStore};
use super::version::resolve_package_version;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Default maximum number of registry calls in flight.
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;

/// Default timeout for a single registry call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Options for the resolution engine.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Maximum registry calls in flight across a pass.
    pub max_concurrency: usize,
    /// Timeout applied to each registry call.
    pub call_timeout: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// The outcome of one resolution pass: the root edge and the graph it reaches.
#[derive(Debug)]
pub struct Resolution {
    pub root: Arc<Edge>,
    pub store: Arc<NodeStore>,
}

/// Dependency graph resolver over some [`Registry`].
#[derive(Debug)]
pub struct Resolver<R> {
    registry: Arc<R>,
    options: ResolverOptions,
}

impl<R: Registry> Resolver<R> {
    #[must_use]
    pub fn new(registry: R, options: ResolverOptions) -> Self {
        Self::from_shared(Arc::new(registry), options)
    }

    #[must_use]
    pub fn from_shared(registry: Arc<R>, options: ResolverOptions) -> Self {
        Self { registry, options }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    /// Discover the full graph reachable from `name@constraint`.
    ///
    /// Returns once every task spawned for the pass has finished. Failures
    /// are recorded on the affected edge or node and never abort the pass.
    pub async fn resolve(&self, name: &str, constraint: &str) -> Resolution {
        let pass = Arc::new(Pass {
            registry: Arc::clone(&self.registry),
            store: Arc::new(NodeStore::new()),
            tracker: TaskTracker::new(),
            permits: Semaphore::new(self.options.max_concurrency.max(1)),
            call_timeout: self.options.call_timeout,
        });

        let root = Arc::new(Edge::new(name, constraint));
        pass.spawn(Arc::clone(&root), None);

        pass.tracker.close();
        pass.tracker.wait().await;

        debug!(
            name,
            constraint,
            nodes = pass.store.len(),
            failed = pass.store.failed_count(),
            "Resolution pass finished"
        );

        Resolution {
            root,
            store: Arc::clone(&pass.store),
        }
    }
}

/// Chain of nodes owned by the tasks above the current one.
#[derive(Debug)]
struct Lineage {
    key: NodeKey,
    parent: Option<Arc<Lineage>>,
}

impl Lineage {
    fn contains(mut this: Option<&Arc<Self>>, key: &NodeKey) -> bool {
        while let Some(link) = this {
            if &link.key == key {
                return true;
            }
            this = link.parent.as_ref();
        }
        false
    }
}

/// Shared state of one resolution pass.
struct Pass<R> {
    registry: Arc<R>,
    store: Arc<NodeStore>,
    tracker: TaskTracker,
    permits: Semaphore,
    call_timeout: Duration,
}

impl<R: Registry> Pass<R> {
    fn spawn(self: &Arc<Self>, edge: Arc<Edge>, lineage: Option<Arc<Lineage>>) {
        self.tracker.spawn(Arc::clone(self).expand(edge, lineage));
    }

    /// Resolve one edge and, if this task ends up owning the node, expand it.
    fn expand(
        self: Arc<Self>,
        edge: Arc<Edge>,
        lineage: Option<Arc<Lineage>>,
    ) -> BoxFuture<'static, ()> {
        async move {
            let package = match self.package(&edge.name).await {
                Ok(package) => package,
                Err(e) => {
                    warn!(
                        name = %edge.name,
                        constraint = %edge.constraint,
                        error = %e,
                        "Could not fetch versions, abandoning subtree"
                    );
                    edge.settle(EdgeTarget::Failed(e));
                    return;
                }
            };

            let version = match resolve_package_version(&edge.name, &edge.constraint, &package) {
                Ok(version) => version,
                Err(e) => {
                    warn!(
                        name = %edge.name,
                        constraint = %edge.constraint,
                        error = %e,
                        "Could not resolve version, abandoning subtree"
                    );
                    edge.settle(EdgeTarget::Failed(e));
                    return;
                }
            };

            let key = NodeKey::new(edge.name.clone(), version);

            if Lineage::contains(lineage.as_ref(), &key) {
                debug!(%key, "Dependency cycle, cutting edge");
                edge.settle(EdgeTarget::Cut(key));
                return;
            }

            edge.settle(EdgeTarget::Node(key.clone()));

            let (_, created) = self.store.get_or_create(&key);
            if !created {
                debug!(%key, "Already claimed, reusing");
                return;
            }

            let manifest = self
                .call(&key, self.registry.fetch_manifest(&key.name, &key.version))
                .await;
            let manifest = match manifest {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!(%key, error = %e, "Could not fetch manifest, abandoning subtree");
                    self.store.mark_failed(&key, e);
                    return;
                }
            };

            let edges: Vec<Arc<Edge>> = manifest
                .into_iter()
                .map(|(name, constraint)| Arc::new(Edge::new(name, constraint)))
                .collect();

            let lineage = Arc::new(Lineage {
                key: key.clone(),
                parent: lineage,
            });
            for child in &edges {
                self.spawn(Arc::clone(child), Some(Arc::clone(&lineage)));
            }

            debug!(%key, children = edges.len(), "Expanded");
            self.store.mark_resolved(&key, edges);
        }
        .boxed()
    }

    /// Available versions of a package, fetched at most once per pass.
    async fn package(&self, name: &str) -> Result<Arc<PackageVersions>, DepsError> {
        let cell = self.store.versions_cell(name);
        cell.get_or_init(|| async {
            self.call(name, self.registry.fetch_package(name))
                .await
                .map(Arc::new)
        })
        .await
        .clone()
    }

    /// Run one registry call under the concurrency bound and timeout.
    async fn call<T>(
        &self,
        what: impl std::fmt::Display,
        fut: impl Future<Output = Result<T, DepsError>>,
    ) -> Result<T, DepsError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| DepsError::registry_unavailable("Registry permits closed"))?;

        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DepsError::timeout(format!(
                "Registry call for {what} timed out after {}ms",
                self.call_timeout.as_millis()
            ))),
        }
    }
}
