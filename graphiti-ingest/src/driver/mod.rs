//! Graph storage abstraction.
//!
//! Defines the [`GraphDriver`] trait the ingestion pipeline persists through,
//! plus the in-memory implementation in [`memory`]. Every operation is scoped
//! to a single partition (`group_id`); the pipeline never queries across
//! partitions.

pub mod memory;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::edges::EntityEdge;
use crate::errors::Result;
use crate::nodes::EntityNode;

pub use memory::InMemoryDriver;

/// Mutable slots of a persisted node. Replaces the stored values wholesale;
/// attribute merging happens before the driver sees the update.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUpdate {
    pub labels: Vec<String>,
    pub attributes: Map<String, Value>,
    pub summary: String,
    pub name_embedding: Option<Vec<f32>>,
}

impl From<&EntityNode> for NodeUpdate {
    fn from(node: &EntityNode) -> Self {
        Self {
            labels: node.labels.clone(),
            attributes: node.attributes.clone(),
            summary: node.summary.clone(),
            name_embedding: node.name_embedding.clone(),
        }
    }
}

/// Mutable slots of a persisted edge.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeUpdate {
    pub fact: String,
    pub attributes: Map<String, Value>,
}

impl From<&EntityEdge> for EdgeUpdate {
    fn from(edge: &EntityEdge) -> Self {
        Self {
            fact: edge.fact.clone(),
            attributes: edge.attributes.clone(),
        }
    }
}

/// Filter for [`GraphDriver::query_by_partition`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionFilter {
    /// Return only nodes carrying at least one of these labels; empty means all.
    pub labels: Vec<String>,
    /// Also return the partition's edges.
    pub include_edges: bool,
}

impl PartitionFilter {
    /// Every node and edge of the partition.
    pub fn all() -> Self {
        Self {
            labels: Vec::new(),
            include_edges: true,
        }
    }

    pub fn with_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            include_edges: false,
        }
    }

    pub fn matches(&self, node: &EntityNode) -> bool {
        self.labels.is_empty() || node.labels.iter().any(|l| self.labels.contains(l))
    }
}

/// Result of a partition query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionSnapshot {
    pub nodes: Vec<EntityNode>,
    pub edges: Vec<EntityEdge>,
}

/// Trait representing a graph storage backend.
///
/// Implementations report failures as [`crate::IngestError::Persistence`] for
/// item-level write problems (missing uuid, constraint violation) and
/// [`crate::IngestError::Driver`] for backend-level ones.
#[allow(async_fn_in_trait)]
pub trait GraphDriver: Send + Sync {
    async fn create_node(&self, node: &EntityNode) -> Result<()>;

    async fn create_edge(&self, edge: &EntityEdge) -> Result<()>;

    async fn update_node(&self, uuid: Uuid, update: &NodeUpdate) -> Result<()>;

    async fn update_edge(&self, uuid: Uuid, update: &EdgeUpdate) -> Result<()>;

    /// Nodes (and optionally edges) of one partition.
    async fn query_by_partition(
        &self,
        group_id: &str,
        filter: &PartitionFilter,
    ) -> Result<PartitionSnapshot>;
}
