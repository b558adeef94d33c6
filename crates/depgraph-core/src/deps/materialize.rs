//! Rendering a resolved graph as a finite tree.
//!
//! The working graph shares nodes between parents and may contain cycles.
//! The materializer walks it depth-first once the resolution pass has
//! joined, expanding each `name@version` at its first occurrence only and
//! emitting every later occurrence as a leaf.

use super::engine::Resolution;
use super::error::{codes, DepsError};
use super::store::{Edge, EdgeTarget, NodeKey, NodeStatus, NodeStore};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// One package in the rendered tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    /// Concrete version, or the requested constraint if resolution failed.
    pub version: String,
    /// Children keyed by a per-edge unique id.
    pub dependencies: IndexMap<String, TreeNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
}

/// Why a node has no dependencies listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeError {
    pub code: String,
    pub message: String,
}

impl From<&DepsError> for NodeError {
    fn from(e: &DepsError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.message().to_string(),
        }
    }
}

impl TreeNode {
    fn leaf(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            dependencies: IndexMap::new(),
            error: None,
        }
    }

    fn failed(name: &str, version: &str, error: &DepsError) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::leaf(name, version)
        }
    }

    /// Total number of nodes in this subtree, including itself.
    #[must_use]
    pub fn size(&self) -> usize {
        1 + self.dependencies.values().map(Self::size).sum::<usize>()
    }

    /// Whether any node in this subtree failed for a reason a retry could fix.
    #[must_use]
    pub fn has_transient_error(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| codes::is_transient(&e.code))
            || self.dependencies.values().any(Self::has_transient_error)
    }

    /// Depth of this subtree; a leaf has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.dependencies.values().map(Self::depth).max().unwrap_or(0)
    }
}

/// Materialize a finished resolution into a tree.
#[must_use]
pub fn materialize(resolution: &Resolution) -> TreeNode {
    let mut walker = Materializer {
        store: &resolution.store,
        emitted: HashSet::new(),
    };
    walker.edge(&resolution.root)
}

struct Materializer<'a> {
    store: &'a NodeStore,
    emitted: HashSet<NodeKey>,
}

impl Materializer<'_> {
    fn edge(&mut self, edge: &Edge) -> TreeNode {
        match edge.target() {
            Some(EdgeTarget::Node(key)) => self.node(key),
            Some(EdgeTarget::Cut(key)) => TreeNode::leaf(&key.name, &key.version),
            Some(EdgeTarget::Failed(e)) => TreeNode::failed(&edge.name, &edge.constraint, e),
            // Only reachable if the pass was abandoned before joining
            None => TreeNode::failed(
                &edge.name,
                &edge.constraint,
                &DepsError::registry_unavailable("Resolution did not complete"),
            ),
        }
    }

    fn node(&mut self, key: &NodeKey) -> TreeNode {
        if !self.emitted.insert(key.clone()) {
            return TreeNode::leaf(&key.name, &key.version);
        }

        match self.store.status(key) {
            Some(NodeStatus::Resolved(edges)) => {
                let dependencies = edges
                    .iter()
                    .map(|child| (Uuid::new_v4().to_string(), self.edge(child)))
                    .collect();
                TreeNode {
                    dependencies,
                    ..TreeNode::leaf(&key.name, &key.version)
                }
            }
            Some(NodeStatus::Failed(e)) => TreeNode::failed(&key.name, &key.version, &e),
            Some(NodeStatus::Pending) | None => {
                let incomplete = DepsError::manifest_unavailable(
                    &key.name,
                    &key.version,
                    "expansion did not complete",
                );
                TreeNode::failed(&key.name, &key.version, &incomplete)
            }
        }
    }
}
