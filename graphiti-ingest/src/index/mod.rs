//! Partition index: per-partition lookup of existing entities.
//!
//! Each partition (`group_id`) owns one [`PartitionShard`] behind an async
//! mutex. Holding the shard guard *is* the per-partition ingestion lock: the
//! lookup-then-write sequence of one ingestion call runs while the guard is
//! held, so two calls for the same partition cannot both see "no match" and
//! create the same node twice. Different partitions never share a shard.

pub mod similarity;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::driver::PartitionSnapshot;
use crate::edges::{EdgeKey, EntityEdge};
use crate::errors::{IngestError, Result};
use crate::nodes::EntityNode;
use crate::types::{IngestConfig, MatchingStrategy};
use crate::utils::normalize_name;

pub use similarity::{EmbeddingCosine, NameQuery, NameSimilarity, ShingleJaccard};

/// Matching knobs shared by every shard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchConfig {
    pub threshold: f32,
    pub strategy: MatchingStrategy,
}

impl From<&IngestConfig> for MatchConfig {
    fn from(config: &IngestConfig) -> Self {
        Self {
            threshold: config.fuzzy_threshold,
            strategy: config.matching_strategy,
        }
    }
}

/// A fuzzy match and its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredNode {
    pub node: EntityNode,
    pub score: f32,
}

/// Outcome of [`PartitionShard::lookup`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupResult {
    /// Nodes with the same normalised name and type.
    pub exact: Vec<EntityNode>,
    /// Name matches at or above the threshold, best first. Only computed when
    /// `exact` is empty.
    pub fuzzy: Vec<ScoredNode>,
}

impl LookupResult {
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.fuzzy.is_empty()
    }
}

/// Index of one partition's nodes and edges.
pub struct PartitionShard {
    group_id: String,
    hydrated: bool,
    nodes: HashMap<Uuid, EntityNode>,
    // normalised name -> node uuids
    by_name: HashMap<String, Vec<Uuid>>,
    edges: HashMap<EdgeKey, EntityEdge>,
    similarity: Arc<dyn NameSimilarity>,
    config: MatchConfig,
}

impl std::fmt::Debug for PartitionShard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionShard")
            .field("group_id", &self.group_id)
            .field("hydrated", &self.hydrated)
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("config", &self.config)
            .finish()
    }
}

impl PartitionShard {
    pub fn new(
        group_id: impl Into<String>,
        similarity: Arc<dyn NameSimilarity>,
        config: MatchConfig,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            hydrated: false,
            nodes: HashMap::new(),
            by_name: HashMap::new(),
            edges: HashMap::new(),
            similarity,
            config,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Whether the shard has been loaded from storage.
    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Load a storage snapshot of this partition. Items of other partitions are
    /// rejected. Anything left over from an earlier failed load is discarded first.
    pub fn hydrate(&mut self, snapshot: PartitionSnapshot) -> Result<()> {
        self.nodes.clear();
        self.by_name.clear();
        self.edges.clear();
        for node in snapshot.nodes {
            self.insert(node)?;
        }
        for edge in snapshot.edges {
            self.insert_edge(edge)?;
        }
        self.hydrated = true;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&EntityNode> {
        self.nodes.get(uuid)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &EntityNode> {
        self.nodes.values()
    }

    /// Exact lookup on (normalised name, type), then fuzzy lookup on name.
    ///
    /// Under [`MatchingStrategy::TypeBlind`] the fuzzy stage ignores type, so an
    /// `Airport` "SFO" is a fuzzy candidate for a `City` "SFO".
    pub fn lookup(&self, query: &NameQuery<'_>, type_name: &str) -> LookupResult {
        let exact = self.exact_matches(&query.normalized, type_name);
        if !exact.is_empty() {
            return LookupResult {
                exact,
                fuzzy: Vec::new(),
            };
        }
        LookupResult {
            exact,
            fuzzy: self.fuzzy_matches(query, type_name),
        }
    }

    fn exact_matches(&self, normalized: &str, type_name: &str) -> Vec<EntityNode> {
        let mut hits: Vec<EntityNode> = self
            .by_name
            .get(normalized)
            .into_iter()
            .flatten()
            .filter_map(|uuid| self.nodes.get(uuid))
            .filter(|node| node.has_type(type_name))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.uuid.cmp(&b.uuid)));
        hits
    }

    fn fuzzy_matches(&self, query: &NameQuery<'_>, type_name: &str) -> Vec<ScoredNode> {
        self.rank(query, type_name, self.nodes.values())
    }

    /// Score `nodes` with this shard's similarity, threshold and matching
    /// strategy, best first. Used for nodes not yet in the index, such as those
    /// about to be created by the current call.
    pub fn rank<'a, I>(&self, query: &NameQuery<'_>, type_name: &str, nodes: I) -> Vec<ScoredNode>
    where
        I: IntoIterator<Item = &'a EntityNode>,
    {
        let mut scored: Vec<ScoredNode> = nodes
            .into_iter()
            .filter(|node| match self.config.strategy {
                MatchingStrategy::TypeBlind => true,
                MatchingStrategy::TypeScoped => node.has_type(type_name),
            })
            .filter_map(|node| {
                let score = self.similarity.score(query, node);
                (score >= self.config.threshold).then(|| ScoredNode {
                    node: node.clone(),
                    score,
                })
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.node.created_at.cmp(&b.node.created_at))
                .then(a.node.uuid.cmp(&b.node.uuid))
        });
        scored
    }

    /// Add a newly persisted node. A uuid already indexed is replaced in place.
    pub fn insert(&mut self, node: EntityNode) -> Result<()> {
        self.check_partition(&node.group_id)?;
        if self.nodes.contains_key(&node.uuid) {
            return self.update(node);
        }
        self.by_name
            .entry(normalize_name(&node.name))
            .or_default()
            .push(node.uuid);
        self.nodes.insert(node.uuid, node);
        Ok(())
    }

    /// Replace a node after a merge. The name key is refreshed in case it changed.
    pub fn update(&mut self, node: EntityNode) -> Result<()> {
        self.check_partition(&node.group_id)?;
        let Some(previous) = self.nodes.get(&node.uuid) else {
            return Err(IngestError::Validation(format!(
                "node {} is not indexed in partition '{}'",
                node.uuid, self.group_id
            )));
        };

        let old_key = normalize_name(&previous.name);
        let new_key = normalize_name(&node.name);
        if old_key != new_key {
            if let Some(uuids) = self.by_name.get_mut(&old_key) {
                uuids.retain(|u| *u != node.uuid);
            }
            self.by_name.entry(new_key).or_default().push(node.uuid);
        }
        self.nodes.insert(node.uuid, node);
        Ok(())
    }

    pub fn find_edge(&self, key: &EdgeKey) -> Option<&EntityEdge> {
        self.edges.get(key)
    }

    pub fn insert_edge(&mut self, edge: EntityEdge) -> Result<()> {
        self.check_partition(&edge.group_id)?;
        self.edges.insert(edge.key(), edge);
        Ok(())
    }

    pub fn update_edge(&mut self, edge: EntityEdge) -> Result<()> {
        self.insert_edge(edge)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn check_partition(&self, group_id: &str) -> Result<()> {
        if group_id != self.group_id {
            return Err(IngestError::Validation(format!(
                "item of partition '{group_id}' cannot be indexed in partition '{}'",
                self.group_id
            )));
        }
        Ok(())
    }
}

/// Registry of partition shards.
pub struct PartitionIndex {
    shards: Mutex<HashMap<String, Arc<AsyncMutex<PartitionShard>>>>,
    similarity: Arc<dyn NameSimilarity>,
    config: MatchConfig,
}

impl PartitionIndex {
    pub fn new(similarity: Arc<dyn NameSimilarity>, config: MatchConfig) -> Self {
        Self {
            shards: Mutex::new(HashMap::new()),
            similarity,
            config,
        }
    }

    pub fn config(&self) -> MatchConfig {
        self.config
    }

    /// Acquire exclusive access to `group_id`'s shard, waiting for any
    /// in-flight ingestion of that partition to finish.
    pub async fn lock(&self, group_id: &str) -> Result<OwnedMutexGuard<PartitionShard>> {
        let shard = {
            let mut shards = self
                .shards
                .lock()
                .map_err(|e| IngestError::Driver(format!("partition registry poisoned: {e}")))?;
            shards
                .entry(group_id.to_string())
                .or_insert_with(|| {
                    Arc::new(AsyncMutex::new(PartitionShard::new(
                        group_id,
                        self.similarity.clone(),
                        self.config,
                    )))
                })
                .clone()
        };
        Ok(shard.lock_owned().await)
    }

    /// Lookup scoped to one partition.
    pub async fn lookup(
        &self,
        group_id: &str,
        name: &str,
        type_name: &str,
    ) -> Result<LookupResult> {
        let shard = self.lock(group_id).await?;
        Ok(shard.lookup(&NameQuery::new(name), type_name))
    }

    /// Partition keys with a shard.
    pub fn partitions(&self) -> Vec<String> {
        self.shards
            .lock()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }
}
