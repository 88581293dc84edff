//! EntityEdge: typed relationship between two EntityNodes of one partition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A typed relationship between two entity nodes.
///
/// Identity for deduplication is `(source_node_uuid, target_node_uuid, name)`
/// within `group_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEdge {
    /// Unique identifier for this edge.
    pub uuid: Uuid,
    /// UUID of the source EntityNode.
    pub source_node_uuid: Uuid,
    /// UUID of the target EntityNode.
    pub target_node_uuid: Uuid,
    /// Edge type name (e.g. "DEPARTS_FROM", "BOOKED_WITH").
    pub name: String,
    /// Human-readable fact string, empty when the extractor gave none.
    pub fact: String,
    /// Attributes conforming to the edge type's fields.
    pub attributes: Map<String, Value>,
    /// Partition this edge belongs to.
    pub group_id: String,
    /// When this edge was created in the graph.
    pub created_at: DateTime<Utc>,
}

impl EntityEdge {
    pub fn new(
        source_node_uuid: Uuid,
        target_node_uuid: Uuid,
        name: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            source_node_uuid,
            target_node_uuid,
            name: name.into(),
            fact: String::new(),
            attributes: Map::new(),
            group_id: group_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Deduplication key of this edge.
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source: self.source_node_uuid,
            target: self.target_node_uuid,
            name: self.name.clone(),
        }
    }
}

/// `(source, target, type)` identity of an edge inside one partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub source: Uuid,
    pub target: Uuid,
    pub name: String,
}
