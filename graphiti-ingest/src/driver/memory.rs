//! In-memory graph driver.
//!
//! Partitions are independent maps behind one `RwLock`. Useful for tests and
//! for embedding the pipeline without a database.

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::edges::EntityEdge;
use crate::errors::{IngestError, Result};
use crate::nodes::EntityNode;

use super::{EdgeUpdate, GraphDriver, NodeUpdate, PartitionFilter, PartitionSnapshot};

#[derive(Debug, Default)]
struct Partition {
    nodes: HashMap<Uuid, EntityNode>,
    edges: HashMap<Uuid, EntityEdge>,
}

/// Graph driver that keeps every partition in process memory.
#[derive(Debug, Default)]
pub struct InMemoryDriver {
    partitions: RwLock<HashMap<String, Partition>>,
    // uuid -> group_id, so updates by uuid find their partition
    owners: RwLock<HashMap<Uuid, String>>,
}

impl InMemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes stored for `group_id`.
    pub fn node_count(&self, group_id: &str) -> usize {
        self.partitions
            .read()
            .map(|p| p.get(group_id).map_or(0, |part| part.nodes.len()))
            .unwrap_or(0)
    }

    /// Number of edges stored for `group_id`.
    pub fn edge_count(&self, group_id: &str) -> usize {
        self.partitions
            .read()
            .map(|p| p.get(group_id).map_or(0, |part| part.edges.len()))
            .unwrap_or(0)
    }

    pub fn node(&self, uuid: Uuid) -> Option<EntityNode> {
        let group = self.owners.read().ok()?.get(&uuid).cloned()?;
        self.partitions
            .read()
            .ok()?
            .get(&group)?
            .nodes
            .get(&uuid)
            .cloned()
    }

    pub fn edge(&self, uuid: Uuid) -> Option<EntityEdge> {
        let group = self.owners.read().ok()?.get(&uuid).cloned()?;
        self.partitions
            .read()
            .ok()?
            .get(&group)?
            .edges
            .get(&uuid)
            .cloned()
    }

    fn claim(&self, uuid: Uuid, group_id: &str) -> Result<()> {
        let mut owners = self.owners.write().map_err(lock_err)?;
        if owners.contains_key(&uuid) {
            return Err(IngestError::Persistence(format!("uuid {uuid} already exists")));
        }
        owners.insert(uuid, group_id.to_string());
        Ok(())
    }

    fn owner(&self, uuid: Uuid) -> Result<String> {
        self.owners
            .read()
            .map_err(lock_err)?
            .get(&uuid)
            .cloned()
            .ok_or_else(|| IngestError::Persistence(format!("uuid {uuid} not found")))
    }
}

fn lock_err<E: std::fmt::Display>(e: E) -> IngestError {
    IngestError::Driver(format!("in-memory store lock poisoned: {e}"))
}

impl GraphDriver for InMemoryDriver {
    async fn create_node(&self, node: &EntityNode) -> Result<()> {
        self.claim(node.uuid, &node.group_id)?;
        let mut partitions = self.partitions.write().map_err(lock_err)?;
        partitions
            .entry(node.group_id.clone())
            .or_default()
            .nodes
            .insert(node.uuid, node.clone());
        Ok(())
    }

    async fn create_edge(&self, edge: &EntityEdge) -> Result<()> {
        let mut partitions = self.partitions.write().map_err(lock_err)?;
        let partition = partitions.entry(edge.group_id.clone()).or_default();
        for endpoint in [edge.source_node_uuid, edge.target_node_uuid] {
            if !partition.nodes.contains_key(&endpoint) {
                return Err(IngestError::Persistence(format!(
                    "edge endpoint {endpoint} is not a node of partition '{}'",
                    edge.group_id
                )));
            }
        }
        self.claim(edge.uuid, &edge.group_id)?;
        partition.edges.insert(edge.uuid, edge.clone());
        Ok(())
    }

    async fn update_node(&self, uuid: Uuid, update: &NodeUpdate) -> Result<()> {
        let group = self.owner(uuid)?;
        let mut partitions = self.partitions.write().map_err(lock_err)?;
        let node = partitions
            .get_mut(&group)
            .and_then(|p| p.nodes.get_mut(&uuid))
            .ok_or_else(|| IngestError::Persistence(format!("node {uuid} not found")))?;

        node.labels = update.labels.clone();
        node.attributes = update.attributes.clone();
        node.summary = update.summary.clone();
        node.name_embedding = update.name_embedding.clone();
        Ok(())
    }

    async fn update_edge(&self, uuid: Uuid, update: &EdgeUpdate) -> Result<()> {
        let group = self.owner(uuid)?;
        let mut partitions = self.partitions.write().map_err(lock_err)?;
        let edge = partitions
            .get_mut(&group)
            .and_then(|p| p.edges.get_mut(&uuid))
            .ok_or_else(|| IngestError::Persistence(format!("edge {uuid} not found")))?;

        edge.fact = update.fact.clone();
        edge.attributes = update.attributes.clone();
        Ok(())
    }

    async fn query_by_partition(
        &self,
        group_id: &str,
        filter: &PartitionFilter,
    ) -> Result<PartitionSnapshot> {
        let partitions = self.partitions.read().map_err(lock_err)?;
        let Some(partition) = partitions.get(group_id) else {
            return Ok(PartitionSnapshot::default());
        };

        let mut nodes: Vec<EntityNode> = partition
            .nodes
            .values()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.uuid.cmp(&b.uuid)));

        let mut edges: Vec<EntityEdge> = if filter.include_edges {
            partition.edges.values().cloned().collect()
        } else {
            Vec::new()
        };
        edges.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.uuid.cmp(&b.uuid)));

        Ok(PartitionSnapshot { nodes, edges })
    }
}
