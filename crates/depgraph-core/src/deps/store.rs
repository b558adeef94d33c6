//! Resolution node store.
//!
//! The store is the only mutable state shared between the tasks of one
//! resolution pass. It hands out ownership of each `name@version` exactly
//! once, so a package reached through many paths is fetched and expanded a
//! single time and merely referenced from every other path.

use super::error::DepsError;
use super::registry::PackageVersions;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::sync::OnceCell;

/// Identity of a resolved package: name plus concrete version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub name: String,
    pub version: String,
}

impl NodeKey {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Where a dependency edge ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeTarget {
    /// The constraint resolved to this node.
    Node(NodeKey),
    /// The constraint resolved to an ancestor of the edge; not expanded.
    Cut(NodeKey),
    /// The constraint could not be resolved.
    Failed(DepsError),
}

/// One `dependencyName -> constraint` edge of the working graph.
///
/// The target is written once, by the task that resolves this edge.
#[derive(Debug)]
pub struct Edge {
    pub name: String,
    pub constraint: String,
    target: OnceLock<EdgeTarget>,
}

impl Edge {
    #[must_use]
    pub fn new(name: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: constraint.into(),
            target: OnceLock::new(),
        }
    }

    /// Record where this edge resolved to.
    ///
    /// Returns `false` if the edge was already settled.
    pub fn settle(&self, target: EdgeTarget) -> bool {
        self.target.set(target).is_ok()
    }

    /// The settled target, if any.
    #[must_use]
    pub fn target(&self) -> Option<&EdgeTarget> {
        self.target.get()
    }
}

/// State of a node in the store.
#[derive(Debug, Clone)]
pub enum NodeStatus {
    /// Claimed by a task that has not finished fetching its manifest.
    Pending,
    /// Manifest fetched; child edges are being (or have been) resolved.
    Resolved(Vec<Arc<Edge>>),
    /// Manifest could not be fetched.
    Failed(DepsError),
}

type VersionsCell = Arc<OnceCell<Result<Arc<PackageVersions>, DepsError>>>;

/// Concurrency-safe memo of nodes for one resolution pass.
#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: Mutex<HashMap<NodeKey, NodeStatus>>,
    versions: Mutex<HashMap<String, VersionsCell>>,
}

impl NodeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn nodes(&self) -> MutexGuard<'_, HashMap<NodeKey, NodeStatus>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a key, creating a `Pending` entry if it is absent.
    ///
    /// Returns the current status and whether this call created the entry.
    /// The caller that gets `created == true` owns the node and must finish
    /// with [`mark_resolved`](Self::mark_resolved) or
    /// [`mark_failed`](Self::mark_failed).
    pub fn get_or_create(&self, key: &NodeKey) -> (NodeStatus, bool) {
        let mut nodes = self.nodes();
        if let Some(status) = nodes.get(key) {
            return (status.clone(), false);
        }
        nodes.insert(key.clone(), NodeStatus::Pending);
        (NodeStatus::Pending, true)
    }

    /// Record the expanded child edges of an owned node.
    pub fn mark_resolved(&self, key: &NodeKey, edges: Vec<Arc<Edge>>) {
        self.nodes().insert(key.clone(), NodeStatus::Resolved(edges));
    }

    /// Record that an owned node could not be expanded.
    pub fn mark_failed(&self, key: &NodeKey, reason: DepsError) {
        self.nodes().insert(key.clone(), NodeStatus::Failed(reason));
    }

    /// Current status of a key.
    #[must_use]
    pub fn status(&self, key: &NodeKey) -> Option<NodeStatus> {
        self.nodes().get(key).cloned()
    }

    /// Number of distinct nodes claimed so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes().is_empty()
    }

    /// Number of nodes whose manifest fetch failed.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.nodes()
            .values()
            .filter(|s| matches!(s, NodeStatus::Failed(_)))
            .count()
    }

    /// The shared slot holding a package's available versions.
    ///
    /// Every task asking for the same name gets the same cell, so the
    /// version list is fetched once per pass however many edges point at it.
    pub(crate) fn versions_cell(&self, name: &str) -> VersionsCell {
        let mut versions = self.versions.lock().unwrap_or_else(PoisonError::into_inner);
        versions.entry(name.to_string()).or_default().clone()
    }
}
