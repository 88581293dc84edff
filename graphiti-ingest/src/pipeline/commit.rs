//! Merge & persistence coordinator.
//!
//! Applies the resolutions of one ingestion call: nodes first, then edges,
//! each written individually. A failed write is recorded on that item and the
//! rest of the call continues. The partition shard is only updated after the
//! driver accepted a write, so the index never runs ahead of storage.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dedupe::{MatchState, Resolution, ResolvedEdge, ResolvedEntity};
use crate::driver::{EdgeUpdate, GraphDriver, NodeUpdate};
use crate::edges::{EdgeKey, EntityEdge};
use crate::errors::{IngestError, Result};
use crate::index::PartitionShard;
use crate::nodes::EntityNode;
use crate::normalize::{DropReason, DroppedEdge, DroppedEntity};

/// What happened to one candidate.
#[derive(Debug)]
pub enum ItemOutcome {
    Created,
    Merged,
    Dropped(DropReason),
    Failed(IngestError),
}

impl ItemOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, ItemOutcome::Created)
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, ItemOutcome::Merged)
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, ItemOutcome::Dropped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ItemOutcome::Failed(_))
    }
}

/// Per-entity line of a [`CommitResult`].
#[derive(Debug)]
pub struct EntityReport {
    /// Position in the extraction result.
    pub raw_index: usize,
    pub name: String,
    pub type_name: String,
    /// `None` for dropped entities.
    pub state: Option<MatchState>,
    /// Node written to, when the item reached storage.
    pub node_uuid: Option<Uuid>,
    pub outcome: ItemOutcome,
}

/// Per-edge line of a [`CommitResult`].
#[derive(Debug)]
pub struct EdgeReport {
    /// Position in the extraction result.
    pub raw_index: usize,
    pub edge_type: String,
    pub edge_uuid: Option<Uuid>,
    pub outcome: ItemOutcome,
}

/// Structured per-item result of one ingestion call.
#[derive(Debug, Default)]
pub struct CommitResult {
    pub group_id: String,
    /// Ordered by `raw_index`.
    pub entities: Vec<EntityReport>,
    /// Ordered by `raw_index`.
    pub edges: Vec<EdgeReport>,
}

impl CommitResult {
    fn outcomes(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.entities
            .iter()
            .map(|e| &e.outcome)
            .chain(self.edges.iter().map(|e| &e.outcome))
    }

    pub fn created(&self) -> usize {
        self.outcomes().filter(|o| o.is_created()).count()
    }

    pub fn merged(&self) -> usize {
        self.outcomes().filter(|o| o.is_merged()).count()
    }

    pub fn dropped(&self) -> usize {
        self.outcomes().filter(|o| o.is_dropped()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes().filter(|o| o.is_failed()).count()
    }

    pub fn nodes_created(&self) -> usize {
        self.entities.iter().filter(|e| e.outcome.is_created()).count()
    }

    pub fn edges_created(&self) -> usize {
        self.edges.iter().filter(|e| e.outcome.is_created()).count()
    }

    /// Distinct node uuids written by this call, in report order.
    pub fn node_uuids(&self) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        self.entities
            .iter()
            .filter(|e| !e.outcome.is_failed())
            .filter_map(|e| e.node_uuid)
            .filter(|uuid| seen.insert(*uuid))
            .collect()
    }

    /// Distinct edge uuids written by this call, in report order.
    pub fn edge_uuids(&self) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .filter(|e| !e.outcome.is_failed())
            .filter_map(|e| e.edge_uuid)
            .filter(|uuid| seen.insert(*uuid))
            .collect()
    }

    /// Report for the entity at `raw_index` of the extraction result.
    pub fn entity(&self, raw_index: usize) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.raw_index == raw_index)
    }

    pub fn edge(&self, raw_index: usize) -> Option<&EdgeReport> {
        self.edges.iter().find(|e| e.raw_index == raw_index)
    }
}

/// Write one call's resolutions through `driver`, keeping `shard` in step.
pub async fn commit<D: GraphDriver>(
    driver: &D,
    shard: &mut PartitionShard,
    entities: Vec<ResolvedEntity>,
    edges: Vec<ResolvedEdge>,
    dropped_entities: Vec<DroppedEntity>,
    dropped_edges: Vec<DroppedEdge>,
) -> CommitResult {
    let mut result = CommitResult {
        group_id: shard.group_id().to_string(),
        ..CommitResult::default()
    };
    // node uuids that could not be created in this call
    let mut failed_nodes: HashSet<Uuid> = HashSet::new();

    for entity in entities {
        let node_uuid = entity.resolution.uuid();
        let outcome = match commit_entity(driver, shard, &entity, &failed_nodes).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    group_id = %entity.candidate.group_id,
                    candidate = %entity.candidate.name,
                    error = %e,
                    "entity write failed"
                );
                if entity.resolution.is_create() {
                    failed_nodes.insert(node_uuid);
                }
                ItemOutcome::Failed(e)
            }
        };
        result.entities.push(EntityReport {
            raw_index: entity.candidate.raw_index,
            name: entity.candidate.name,
            type_name: entity.candidate.type_name,
            state: Some(entity.state),
            node_uuid: Some(node_uuid),
            outcome,
        });
    }

    // edge uuids that could not be created in this call
    let mut failed_edges: HashSet<Uuid> = HashSet::new();
    for edge in edges {
        let edge_uuid = edge.resolution.uuid();
        let outcome = match commit_edge(driver, shard, &edge, &failed_nodes, &failed_edges).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    group_id = %edge.candidate.group_id,
                    edge_type = %edge.candidate.type_name,
                    error = %e,
                    "edge write failed"
                );
                if edge.resolution.is_create() {
                    failed_edges.insert(edge_uuid);
                }
                ItemOutcome::Failed(e)
            }
        };
        result.edges.push(EdgeReport {
            raw_index: edge.candidate.raw_index,
            edge_type: edge.candidate.type_name,
            edge_uuid: Some(edge_uuid),
            outcome,
        });
    }

    result.entities.extend(dropped_entities.into_iter().map(|d| EntityReport {
        raw_index: d.raw_index,
        name: d.name,
        type_name: String::new(),
        state: None,
        node_uuid: None,
        outcome: ItemOutcome::Dropped(d.reason),
    }));
    result.edges.extend(dropped_edges.into_iter().map(|d| EdgeReport {
        raw_index: d.raw_index,
        edge_type: d.edge_type,
        edge_uuid: None,
        outcome: ItemOutcome::Dropped(d.reason),
    }));

    result.entities.sort_by_key(|e| e.raw_index);
    result.edges.sort_by_key(|e| e.raw_index);
    result
}

async fn commit_entity<D: GraphDriver>(
    driver: &D,
    shard: &mut PartitionShard,
    entity: &ResolvedEntity,
    failed_nodes: &HashSet<Uuid>,
) -> Result<ItemOutcome> {
    let candidate = &entity.candidate;
    match entity.resolution {
        Resolution::Create { uuid } => {
            let mut node = EntityNode::new(&candidate.name, &candidate.type_name, &candidate.group_id);
            node.uuid = uuid;
            node.attributes = candidate.attributes.clone();
            node.summary = candidate.summary.clone().unwrap_or_default();
            node.name_embedding = entity.embedding.clone();

            driver.create_node(&node).await?;
            debug!(group_id = %node.group_id, uuid = %uuid, name = %node.name, "node created");
            shard.insert(node)?;
            Ok(ItemOutcome::Created)
        }
        Resolution::Merge { uuid } | Resolution::MergePending { uuid, .. } => {
            if failed_nodes.contains(&uuid) {
                return Err(IngestError::Persistence(format!(
                    "target node {uuid} was not created"
                )));
            }
            let mut node = shard.get(&uuid).cloned().ok_or_else(|| {
                IngestError::Persistence(format!("target node {uuid} is not in the partition"))
            })?;
            merge_node(&mut node, entity);

            driver.update_node(uuid, &NodeUpdate::from(&node)).await?;
            debug!(group_id = %node.group_id, uuid = %uuid, name = %node.name, "node merged");
            shard.update(node)?;
            Ok(ItemOutcome::Merged)
        }
    }
}

async fn commit_edge<D: GraphDriver>(
    driver: &D,
    shard: &mut PartitionShard,
    edge: &ResolvedEdge,
    failed_nodes: &HashSet<Uuid>,
    failed_edges: &HashSet<Uuid>,
) -> Result<ItemOutcome> {
    for endpoint in [edge.source_uuid, edge.target_uuid] {
        if failed_nodes.contains(&endpoint) || shard.get(&endpoint).is_none() {
            return Err(IngestError::Persistence(format!(
                "endpoint node {endpoint} was not persisted"
            )));
        }
    }

    let candidate = &edge.candidate;
    match edge.resolution {
        Resolution::Create { uuid } => {
            let mut entity_edge = EntityEdge::new(
                edge.source_uuid,
                edge.target_uuid,
                &candidate.type_name,
                &candidate.group_id,
            );
            entity_edge.uuid = uuid;
            entity_edge.fact = candidate.fact.clone().unwrap_or_default();
            entity_edge.attributes = candidate.attributes.clone();

            driver.create_edge(&entity_edge).await?;
            shard.insert_edge(entity_edge)?;
            Ok(ItemOutcome::Created)
        }
        Resolution::Merge { uuid } | Resolution::MergePending { uuid, .. } => {
            if failed_edges.contains(&uuid) {
                return Err(IngestError::Persistence(format!(
                    "target edge {uuid} was not created"
                )));
            }
            let key = EdgeKey {
                source: edge.source_uuid,
                target: edge.target_uuid,
                name: candidate.type_name.clone(),
            };
            let mut existing = shard.find_edge(&key).cloned().ok_or_else(|| {
                IngestError::Persistence(format!("target edge {uuid} is not in the partition"))
            })?;
            merge_attributes(&mut existing.attributes, &candidate.attributes);
            if let Some(fact) = candidate.fact.as_deref().filter(|f| !f.trim().is_empty()) {
                existing.fact = fact.to_string();
            }

            driver.update_edge(uuid, &EdgeUpdate::from(&existing)).await?;
            shard.update_edge(existing)?;
            Ok(ItemOutcome::Merged)
        }
    }
}

/// Fold a resolved candidate into an existing node: union labels, overwrite
/// supplied attributes and a non-empty summary, fill a missing embedding.
pub fn merge_node(node: &mut EntityNode, entity: &ResolvedEntity) {
    let candidate = &entity.candidate;
    node.add_label(&candidate.type_name);
    merge_attributes(&mut node.attributes, &candidate.attributes);
    if let Some(summary) = candidate.summary.as_deref().filter(|s| !s.trim().is_empty()) {
        node.summary = summary.to_string();
    }
    if node.name_embedding.is_none() {
        node.name_embedding = entity.embedding.clone();
    }
}

/// Supplied values overwrite, absent keys are left untouched.
pub fn merge_attributes(target: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for (key, value) in incoming {
        target.insert(key.clone(), value.clone());
    }
}
