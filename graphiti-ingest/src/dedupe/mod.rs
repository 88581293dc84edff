//! Deduplication engine: resolve candidates against one partition's index.
//!
//! Per candidate entity:
//!
//! ```text
//! Unresolved ─┬─> ExactMatched            (one exact hit: merge into it)
//!             ├─> FuzzyMatched ─┬─> DisambiguatedDuplicate  (merge)
//!             │                 └─> DisambiguatedDistinct   (create)
//!             └─> NoMatch                 (create)
//! ```
//!
//! Only the first candidate of each exact key (normalised name + type) in a
//! call is looked up; later ones follow it. Judgment calls for fuzzy matches
//! run concurrently under a timeout. A candidate that would still create a
//! node is then scored against the nodes earlier candidates of the same call
//! are creating, and judged against them in order. A missing verdict, an error or a timeout
//! applies the [`JudgmentFallback`] policy, which by default creates a new node.
//!
//! Edges never go through judgment: they merge into an existing edge with the
//! same `(source, target, type)` or are created.

pub mod judge;

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::edges::EdgeKey;
use crate::embedder::Embedding;
use crate::index::{NameQuery, PartitionShard, ScoredNode};
use crate::nodes::EntityNode;
use crate::normalize::{CandidateEdge, CandidateEntity};
use crate::registry::{SchemaType, TypeRegistry};
use crate::types::{IngestConfig, JudgmentFallback};
use crate::utils::{bounded_join_all, normalize_name};

pub use judge::{
    CandidateContext, Judge, JudgmentRequest, LlmJudge, MatchContext, UnavailableJudge, Verdict,
};

/// Resolution state of a candidate entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    Unresolved,
    ExactMatched,
    FuzzyMatched,
    NoMatch,
    DisambiguatedDuplicate,
    DisambiguatedDistinct,
}

/// What the judgment collaborator contributed to a resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum JudgmentOutcome {
    /// No fuzzy stage ran.
    NotNeeded,
    Verdicts(Vec<Verdict>),
    /// Answered, but with no verdict for any matched node.
    NoVerdict,
    TimedOut,
    Unavailable(String),
}

impl JudgmentOutcome {
    /// Whether the fallback policy decided the outcome.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            JudgmentOutcome::NoVerdict | JudgmentOutcome::TimedOut | JudgmentOutcome::Unavailable(_)
        )
    }
}

/// Where a resolved candidate is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Create a new item with this uuid.
    Create { uuid: Uuid },
    /// Merge into an item already in the partition.
    Merge { uuid: Uuid },
    /// Merge into an item created earlier in the same call by candidate `leader`.
    MergePending { uuid: Uuid, leader: usize },
}

impl Resolution {
    pub fn uuid(&self) -> Uuid {
        match *self {
            Resolution::Create { uuid }
            | Resolution::Merge { uuid }
            | Resolution::MergePending { uuid, .. } => uuid,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, Resolution::Create { .. })
    }
}

/// A candidate entity with its final state and write target.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntity {
    pub candidate: CandidateEntity,
    pub state: MatchState,
    pub resolution: Resolution,
    pub judgment: JudgmentOutcome,
    /// Existing nodes considered, best first.
    pub matched: Vec<Uuid>,
    pub embedding: Option<Embedding>,
}

/// A candidate edge with its write target and resolved endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEdge {
    pub candidate: CandidateEdge,
    pub source_uuid: Uuid,
    pub target_uuid: Uuid,
    pub resolution: Resolution,
}

/// Outcome of the lookup phase for one exact-key leader.
enum Lookup {
    Exact(Uuid),
    NoMatch,
    Fuzzy(Vec<ScoredNode>),
}

/// Deduplication engine. Holds the judgment collaborator and the fail-open policy.
pub struct Deduplicator<J> {
    judge: J,
    timeout: Duration,
    fallback: JudgmentFallback,
    max_concurrency: usize,
}

impl<J: Judge> Deduplicator<J> {
    pub fn new(judge: J, config: &IngestConfig) -> Self {
        Self {
            judge,
            timeout: config.judgment_timeout(),
            fallback: config.judgment_fallback,
            max_concurrency: config.max_concurrency,
        }
    }

    pub fn judge(&self) -> &J {
        &self.judge
    }

    pub fn fallback(&self) -> JudgmentFallback {
        self.fallback
    }

    /// Resolve every candidate of one call. `embeddings` is parallel to
    /// `candidates` (or empty).
    pub async fn resolve_entities(
        &self,
        shard: &PartitionShard,
        registry: &TypeRegistry,
        candidates: Vec<CandidateEntity>,
        embeddings: Vec<Option<Embedding>>,
    ) -> Vec<ResolvedEntity> {
        let mut embeddings = embeddings.into_iter();

        // first candidate index per exact key
        let mut leaders: HashMap<(String, String), usize> = HashMap::new();
        let mut follows: Vec<Option<usize>> = Vec::with_capacity(candidates.len());
        let mut lookups: Vec<Option<Lookup>> = Vec::with_capacity(candidates.len());
        let mut embedded: Vec<Option<Embedding>> = Vec::with_capacity(candidates.len());

        for (i, candidate) in candidates.iter().enumerate() {
            let embedding = embeddings.next().flatten();
            let key = (normalize_name(&candidate.name), candidate.type_name.clone());
            match leaders.get(&key) {
                Some(&leader) => {
                    follows.push(Some(leader));
                    lookups.push(None);
                }
                None => {
                    leaders.insert(key, i);
                    follows.push(None);
                    let query = NameQuery::new(&candidate.name).with_embedding(embedding.as_deref());
                    lookups.push(Some(classify(shard.lookup(&query, &candidate.type_name))));
                }
            }
            embedded.push(embedding);
        }

        let verdicts = self
            .run_judgments(shard.group_id(), registry, &candidates, &lookups)
            .await;

        let mut resolved: Vec<ResolvedEntity> = Vec::with_capacity(candidates.len());
        // nodes this call will create, with the index of the candidate creating each
        let mut pending: Vec<(usize, EntityNode)> = Vec::new();
        for (i, ((candidate, lookup), embedding)) in candidates
            .into_iter()
            .zip(lookups)
            .zip(embedded)
            .enumerate()
        {
            let entity = match (follows[i], lookup) {
                (Some(leader), _) => {
                    let resolution = match resolved[leader].resolution {
                        Resolution::Create { uuid } => Resolution::MergePending { uuid, leader },
                        other => other,
                    };
                    ResolvedEntity {
                        candidate,
                        state: MatchState::ExactMatched,
                        resolution,
                        judgment: JudgmentOutcome::NotNeeded,
                        matched: vec![resolution.uuid()],
                        embedding,
                    }
                }
                (None, Some(Lookup::Exact(uuid))) => ResolvedEntity {
                    candidate,
                    state: MatchState::ExactMatched,
                    resolution: Resolution::Merge { uuid },
                    judgment: JudgmentOutcome::NotNeeded,
                    matched: vec![uuid],
                    embedding,
                },
                (None, Some(Lookup::Fuzzy(matches))) => {
                    let judgment = verdicts
                        .get(&i)
                        .cloned()
                        .unwrap_or(JudgmentOutcome::NoVerdict);
                    self.disambiguate(candidate, matches, judgment, embedding)
                }
                (None, _) => ResolvedEntity {
                    candidate,
                    state: MatchState::NoMatch,
                    resolution: Resolution::Create {
                        uuid: Uuid::new_v4(),
                    },
                    judgment: JudgmentOutcome::NotNeeded,
                    matched: Vec::new(),
                    embedding,
                },
            };
            let entity = if follows[i].is_none() && entity.resolution.is_create() {
                self.match_pending(shard, registry, entity, &pending).await
            } else {
                entity
            };
            if let Resolution::Create { uuid } = entity.resolution {
                pending.push((i, pending_node(&entity, uuid)));
            }
            debug!(
                group_id = %entity.candidate.group_id,
                candidate = %entity.candidate.name,
                type_name = %entity.candidate.type_name,
                state = ?entity.state,
                resolution = ?entity.resolution,
                "entity resolved"
            );
            resolved.push(entity);
        }
        resolved
    }

    /// Fan out judgment requests for every fuzzy-matched leader.
    async fn run_judgments(
        &self,
        group_id: &str,
        registry: &TypeRegistry,
        candidates: &[CandidateEntity],
        lookups: &[Option<Lookup>],
    ) -> HashMap<usize, JudgmentOutcome> {
        let requests: Vec<(usize, JudgmentRequest)> = lookups
            .iter()
            .enumerate()
            .filter_map(|(i, lookup)| match lookup {
                Some(Lookup::Fuzzy(matches)) => Some((
                    i,
                    judgment_request(group_id, registry, &candidates[i], matches),
                )),
                _ => None,
            })
            .collect();
        if requests.is_empty() {
            return HashMap::new();
        }

        let calls = requests.iter().map(|(_, request)| self.ask(request));
        let outcomes = bounded_join_all(calls, self.max_concurrency).await;

        requests
            .iter()
            .map(|(i, _)| *i)
            .zip(outcomes)
            .collect()
    }

    /// One judgment call under the configured timeout. Verdicts for nodes the
    /// request did not mention are discarded.
    async fn ask(&self, request: &JudgmentRequest) -> JudgmentOutcome {
        match tokio::time::timeout(self.timeout, self.judge.judge(request)).await {
            Err(_) => JudgmentOutcome::TimedOut,
            Ok(Err(e)) => JudgmentOutcome::Unavailable(e.to_string()),
            Ok(Ok(verdicts)) => {
                let relevant: Vec<Verdict> = verdicts
                    .into_iter()
                    .filter(|v| request.matches.iter().any(|m| m.uuid == v.node_uuid))
                    .collect();
                if relevant.is_empty() {
                    JudgmentOutcome::NoVerdict
                } else {
                    JudgmentOutcome::Verdicts(relevant)
                }
            }
        }
    }

    /// Compare a candidate about to create a node with the nodes earlier
    /// candidates of the same call are creating. A duplicate verdict (or the
    /// merge fallback) turns the create into a merge into that pending node.
    async fn match_pending(
        &self,
        shard: &PartitionShard,
        registry: &TypeRegistry,
        mut entity: ResolvedEntity,
        pending: &[(usize, EntityNode)],
    ) -> ResolvedEntity {
        if pending.is_empty() {
            return entity;
        }
        let query =
            NameQuery::new(&entity.candidate.name).with_embedding(entity.embedding.as_deref());
        let matches = shard.rank(
            &query,
            &entity.candidate.type_name,
            pending.iter().map(|(_, node)| node),
        );
        if matches.is_empty() {
            return entity;
        }

        let request = judgment_request(shard.group_id(), registry, &entity.candidate, &matches);
        let judgment = self.ask(&request).await;
        let matched: Vec<Uuid> = matches.iter().map(|m| m.node.uuid).collect();
        let duplicate_of = self.pick_duplicate(&entity.candidate, &matched, &judgment);
        entity.matched.extend(matched);

        let leader = duplicate_of.and_then(|uuid| {
            pending
                .iter()
                .find(|(_, node)| node.uuid == uuid)
                .map(|(leader, _)| (uuid, *leader))
        });
        match leader {
            Some((uuid, leader)) => {
                entity.state = MatchState::DisambiguatedDuplicate;
                entity.resolution = Resolution::MergePending { uuid, leader };
                entity.judgment = judgment;
            }
            None => {
                entity.state = MatchState::DisambiguatedDistinct;
                if entity.judgment == JudgmentOutcome::NotNeeded {
                    entity.judgment = judgment;
                }
            }
        }
        entity
    }

    /// The match a candidate merges into: the best-ranked duplicate verdict, or
    /// the fallback policy when the judge gave none.
    fn pick_duplicate(
        &self,
        candidate: &CandidateEntity,
        matched: &[Uuid],
        judgment: &JudgmentOutcome,
    ) -> Option<Uuid> {
        match judgment {
            // matches are sorted best first, so the first accepted one wins
            JudgmentOutcome::Verdicts(verdicts) => matched
                .iter()
                .copied()
                .find(|uuid| verdicts.iter().any(|v| v.node_uuid == *uuid && v.is_duplicate)),
            _ => {
                warn!(
                    group_id = %candidate.group_id,
                    candidate = %candidate.name,
                    outcome = ?judgment,
                    fallback = ?self.fallback,
                    "judgment unavailable, applying fallback policy"
                );
                match self.fallback {
                    JudgmentFallback::TreatAsDistinct => None,
                    JudgmentFallback::MergeBestMatch => matched.first().copied(),
                }
            }
        }
    }

    fn disambiguate(
        &self,
        candidate: CandidateEntity,
        matches: Vec<ScoredNode>,
        judgment: JudgmentOutcome,
        embedding: Option<Embedding>,
    ) -> ResolvedEntity {
        let matched: Vec<Uuid> = matches.iter().map(|m| m.node.uuid).collect();
        let duplicate_of = self.pick_duplicate(&candidate, &matched, &judgment);

        let (state, resolution) = match duplicate_of {
            Some(uuid) => (MatchState::DisambiguatedDuplicate, Resolution::Merge { uuid }),
            None => (
                MatchState::DisambiguatedDistinct,
                Resolution::Create {
                    uuid: Uuid::new_v4(),
                },
            ),
        };

        ResolvedEntity {
            candidate,
            state,
            resolution,
            judgment,
            matched,
            embedding,
        }
    }

    /// Resolve edges against the partition's existing edges. Endpoints come from
    /// the entity resolutions of the same call.
    pub fn resolve_edges(
        &self,
        shard: &PartitionShard,
        edges: Vec<CandidateEdge>,
        entities: &[ResolvedEntity],
    ) -> Vec<ResolvedEdge> {
        resolve_edges(shard, edges, entities)
    }
}

fn resolve_edges(
    shard: &PartitionShard,
    edges: Vec<CandidateEdge>,
    entities: &[ResolvedEntity],
) -> Vec<ResolvedEdge> {
    let mut pending: HashMap<EdgeKey, (Uuid, usize)> = HashMap::new();
    let mut resolved = Vec::with_capacity(edges.len());

    for (i, candidate) in edges.into_iter().enumerate() {
        let source_uuid = entities[candidate.source].resolution.uuid();
        let target_uuid = entities[candidate.target].resolution.uuid();
        let key = EdgeKey {
            source: source_uuid,
            target: target_uuid,
            name: candidate.type_name.clone(),
        };

        let resolution = if let Some(existing) = shard.find_edge(&key) {
            Resolution::Merge {
                uuid: existing.uuid,
            }
        } else if let Some(&(uuid, leader)) = pending.get(&key) {
            Resolution::MergePending { uuid, leader }
        } else {
            let uuid = Uuid::new_v4();
            pending.insert(key, (uuid, i));
            Resolution::Create { uuid }
        };

        resolved.push(ResolvedEdge {
            candidate,
            source_uuid,
            target_uuid,
            resolution,
        });
    }
    resolved
}

/// Stand-in for the node a `Create` resolution will write, so later candidates
/// of the same call can be scored against it.
fn pending_node(entity: &ResolvedEntity, uuid: Uuid) -> EntityNode {
    let candidate = &entity.candidate;
    let mut node = EntityNode::new(&candidate.name, &candidate.type_name, &candidate.group_id);
    node.uuid = uuid;
    node.attributes = candidate.attributes.clone();
    node.summary = candidate.summary.clone().unwrap_or_default();
    node.name_embedding = entity.embedding.clone();
    node
}

fn classify(result: crate::index::LookupResult) -> Lookup {
    match result.exact.len() {
        1 => Lookup::Exact(result.exact[0].uuid),
        // Several exact hits mean storage already holds duplicates; let the
        // judge pick.
        n if n > 1 => Lookup::Fuzzy(
            result
                .exact
                .into_iter()
                .map(|node| ScoredNode { node, score: 1.0 })
                .collect(),
        ),
        _ if result.fuzzy.is_empty() => Lookup::NoMatch,
        _ => Lookup::Fuzzy(result.fuzzy),
    }
}

fn judgment_request(
    group_id: &str,
    registry: &TypeRegistry,
    candidate: &CandidateEntity,
    matches: &[ScoredNode],
) -> JudgmentRequest {
    JudgmentRequest {
        group_id: group_id.to_string(),
        candidate: CandidateContext {
            name: candidate.name.clone(),
            type_name: candidate.type_name.clone(),
            type_description: registry
                .resolve_entity_type(&candidate.type_name)
                .and_then(|def| def.description())
                .map(str::to_string),
            attributes: candidate.attributes.clone(),
            summary: candidate.summary.clone(),
        },
        matches: matches
            .iter()
            .map(|m| MatchContext {
                uuid: m.node.uuid,
                name: m.node.name.clone(),
                labels: m.node.labels.clone(),
                summary: m.node.summary.clone(),
                attributes: m.node.attributes.clone(),
                score: m.score,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::Map;

    use crate::errors::{IngestError, Result};
    use crate::index::{MatchConfig, PartitionIndex, ShingleJaccard};
    use crate::registry::TypePair;
    use crate::types::MatchingStrategy;

    enum Script {
        Duplicate,
        Distinct,
        Empty,
        Fail,
        Hang,
    }

    struct ScriptedJudge {
        script: Script,
        calls: AtomicUsize,
    }

    impl ScriptedJudge {
        fn new(script: Script) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Judge for ScriptedJudge {
        async fn judge(&self, request: &JudgmentRequest) -> Result<Vec<Verdict>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script {
                Script::Duplicate => Ok(request
                    .matches
                    .iter()
                    .map(|m| Verdict::duplicate(m.uuid))
                    .collect()),
                Script::Distinct => Ok(request
                    .matches
                    .iter()
                    .map(|m| Verdict::distinct(m.uuid))
                    .collect()),
                Script::Empty => Ok(Vec::new()),
                Script::Fail => Err(IngestError::JudgmentUnavailable("down".into())),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    fn config(fallback: JudgmentFallback) -> IngestConfig {
        IngestConfig {
            judgment_timeout_ms: 50,
            judgment_fallback: fallback,
            ..IngestConfig::default()
        }
    }

    fn candidate(name: &str, type_name: &str) -> CandidateEntity {
        CandidateEntity {
            raw_index: 0,
            name: name.into(),
            type_name: type_name.into(),
            attributes: Map::new(),
            summary: None,
            group_id: "p1".into(),
        }
    }

    async fn shard_with(nodes: Vec<EntityNode>) -> tokio::sync::OwnedMutexGuard<PartitionShard> {
        let index = PartitionIndex::new(
            Arc::new(ShingleJaccard::default()),
            MatchConfig {
                threshold: 0.9,
                strategy: MatchingStrategy::TypeBlind,
            },
        );
        let mut shard = index.lock("p1").await.unwrap();
        for node in nodes {
            shard.insert(node).unwrap();
        }
        shard
    }

    async fn resolve_one(
        judge: ScriptedJudge,
        fallback: JudgmentFallback,
        existing: Vec<EntityNode>,
        incoming: CandidateEntity,
    ) -> (ResolvedEntity, usize) {
        let shard = shard_with(existing).await;
        let dedupe = Deduplicator::new(judge, &config(fallback));
        let mut resolved = dedupe
            .resolve_entities(&shard, &TypeRegistry::default(), vec![incoming], Vec::new())
            .await;
        (resolved.remove(0), dedupe.judge().calls.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn single_exact_hit_merges_without_judgment() {
        let sfo = EntityNode::new("SFO", "Airport", "p1");
        let (entity, calls) = resolve_one(
            ScriptedJudge::new(Script::Distinct),
            JudgmentFallback::TreatAsDistinct,
            vec![sfo.clone()],
            candidate("sfo", "Airport"),
        )
        .await;

        assert_eq!(entity.state, MatchState::ExactMatched);
        assert_eq!(entity.resolution, Resolution::Merge { uuid: sfo.uuid });
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn no_match_creates() {
        let (entity, calls) = resolve_one(
            ScriptedJudge::new(Script::Duplicate),
            JudgmentFallback::TreatAsDistinct,
            vec![EntityNode::new("JFK", "Airport", "p1")],
            candidate("SFO", "Airport"),
        )
        .await;

        assert_eq!(entity.state, MatchState::NoMatch);
        assert!(entity.resolution.is_create());
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn duplicate_verdict_merges_across_types() {
        let airport = EntityNode::new("SFO", "Airport", "p1");
        let (entity, calls) = resolve_one(
            ScriptedJudge::new(Script::Duplicate),
            JudgmentFallback::TreatAsDistinct,
            vec![airport.clone()],
            candidate("SFO", "City"),
        )
        .await;

        assert_eq!(entity.state, MatchState::DisambiguatedDuplicate);
        assert_eq!(entity.resolution, Resolution::Merge { uuid: airport.uuid });
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn distinct_verdict_creates() {
        let (entity, _) = resolve_one(
            ScriptedJudge::new(Script::Distinct),
            JudgmentFallback::MergeBestMatch,
            vec![EntityNode::new("SFO", "Airport", "p1")],
            candidate("SFO", "City"),
        )
        .await;

        assert_eq!(entity.state, MatchState::DisambiguatedDistinct);
        assert!(entity.resolution.is_create());
        assert!(!entity.judgment.is_fallback());
    }

    #[tokio::test]
    async fn timeout_fails_open() {
        let (entity, _) = resolve_one(
            ScriptedJudge::new(Script::Hang),
            JudgmentFallback::TreatAsDistinct,
            vec![EntityNode::new("SFO", "Airport", "p1")],
            candidate("SFO", "City"),
        )
        .await;

        assert_eq!(entity.judgment, JudgmentOutcome::TimedOut);
        assert_eq!(entity.state, MatchState::DisambiguatedDistinct);
        assert!(entity.resolution.is_create());
    }

    #[tokio::test]
    async fn error_and_empty_answers_fail_open() {
        for script in [Script::Fail, Script::Empty] {
            let (entity, _) = resolve_one(
                ScriptedJudge::new(script),
                JudgmentFallback::TreatAsDistinct,
                vec![EntityNode::new("SFO", "Airport", "p1")],
                candidate("SFO", "City"),
            )
            .await;
            assert!(entity.judgment.is_fallback());
            assert!(entity.resolution.is_create());
        }
    }

    #[tokio::test]
    async fn merge_best_match_fallback_merges() {
        let airport = EntityNode::new("SFO", "Airport", "p1");
        let (entity, _) = resolve_one(
            ScriptedJudge::new(Script::Fail),
            JudgmentFallback::MergeBestMatch,
            vec![airport.clone()],
            candidate("SFO", "City"),
        )
        .await;

        assert_eq!(entity.state, MatchState::DisambiguatedDuplicate);
        assert_eq!(entity.resolution, Resolution::Merge { uuid: airport.uuid });
    }

    #[tokio::test]
    async fn several_exact_hits_go_to_judgment() {
        let first = EntityNode::new("SFO", "Airport", "p1");
        let second = EntityNode::new("SFO", "Airport", "p1");
        let (entity, calls) = resolve_one(
            ScriptedJudge::new(Script::Duplicate),
            JudgmentFallback::TreatAsDistinct,
            vec![first, second],
            candidate("SFO", "Airport"),
        )
        .await;

        assert_eq!(calls, 1);
        assert_eq!(entity.matched.len(), 2);
        assert_eq!(entity.resolution, Resolution::Merge { uuid: entity.matched[0] });
    }

    #[tokio::test]
    async fn same_key_in_one_call_follows_the_leader() {
        let shard = shard_with(Vec::new()).await;
        let dedupe = Deduplicator::new(
            ScriptedJudge::new(Script::Distinct),
            &config(JudgmentFallback::TreatAsDistinct),
        );
        let resolved = dedupe
            .resolve_entities(
                &shard,
                &TypeRegistry::default(),
                vec![
                    candidate("SFO", "Airport"),
                    candidate(" sfo", "Airport"),
                    candidate("SFO", "City"),
                ],
                Vec::new(),
            )
            .await;

        let leader = resolved[0].resolution.uuid();
        assert!(resolved[0].resolution.is_create());
        assert_eq!(resolved[1].resolution, Resolution::MergePending { uuid: leader, leader: 0 });
        // Same name, different type: a separate key, judged against the pending node.
        assert_eq!(dedupe.judge().calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolved[2].state, MatchState::DisambiguatedDistinct);
        assert_eq!(resolved[2].matched, vec![leader]);
        assert!(resolved[2].resolution.is_create());
        assert_ne!(resolved[2].resolution.uuid(), leader);
    }

    #[tokio::test]
    async fn duplicate_verdict_merges_into_pending_node() {
        let shard = shard_with(Vec::new()).await;
        let dedupe = Deduplicator::new(
            ScriptedJudge::new(Script::Duplicate),
            &config(JudgmentFallback::TreatAsDistinct),
        );
        let resolved = dedupe
            .resolve_entities(
                &shard,
                &TypeRegistry::default(),
                vec![
                    candidate("SFO", "Airport"),
                    candidate("JFK", "Airport"),
                    candidate("SFO", "City"),
                    candidate("sfo", "City"),
                ],
                Vec::new(),
            )
            .await;

        let airport = resolved[0].resolution.uuid();
        assert_eq!(resolved[0].state, MatchState::NoMatch);
        assert!(resolved[1].resolution.is_create());
        assert_eq!(resolved[2].state, MatchState::DisambiguatedDuplicate);
        assert_eq!(
            resolved[2].resolution,
            Resolution::MergePending { uuid: airport, leader: 0 }
        );
        // follows its own key's leader, which already merged
        assert_eq!(
            resolved[3].resolution,
            Resolution::MergePending { uuid: airport, leader: 0 }
        );
        // JFK and the City SFO each compared against earlier pending nodes;
        // only SFO scored above the threshold
        assert_eq!(dedupe.judge().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pending_timeout_applies_fallback() {
        let shard = shard_with(Vec::new()).await;
        for (fallback, merges) in [
            (JudgmentFallback::TreatAsDistinct, false),
            (JudgmentFallback::MergeBestMatch, true),
        ] {
            let dedupe = Deduplicator::new(ScriptedJudge::new(Script::Hang), &config(fallback));
            let resolved = dedupe
                .resolve_entities(
                    &shard,
                    &TypeRegistry::default(),
                    vec![candidate("SFO", "Airport"), candidate("SFO", "City")],
                    Vec::new(),
                )
                .await;
            assert_eq!(resolved[1].judgment, JudgmentOutcome::TimedOut);
            assert_eq!(!resolved[1].resolution.is_create(), merges);
        }
    }

    #[tokio::test]
    async fn type_scoped_strategy_keeps_pending_types_apart() {
        let index = PartitionIndex::new(
            Arc::new(ShingleJaccard::default()),
            MatchConfig {
                threshold: 0.9,
                strategy: MatchingStrategy::TypeScoped,
            },
        );
        let shard = index.lock("p1").await.unwrap();
        let dedupe = Deduplicator::new(
            ScriptedJudge::new(Script::Duplicate),
            &config(JudgmentFallback::TreatAsDistinct),
        );
        let resolved = dedupe
            .resolve_entities(
                &shard,
                &TypeRegistry::default(),
                vec![candidate("SFO", "Airport"), candidate("SFO", "City")],
                Vec::new(),
            )
            .await;

        assert_eq!(dedupe.judge().calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolved[1].state, MatchState::NoMatch);
        assert!(resolved[1].resolution.is_create());
    }

    #[tokio::test]
    async fn edges_merge_into_existing_and_pending() {
        let flight = EntityNode::new("UA 123", "Flight", "p1");
        let sfo = EntityNode::new("SFO", "Airport", "p1");
        let mut shard = shard_with(vec![flight.clone(), sfo.clone()]).await;
        let existing = crate::edges::EntityEdge::new(flight.uuid, sfo.uuid, "DEPARTS_FROM", "p1");
        shard.insert_edge(existing.clone()).unwrap();

        let entities: Vec<ResolvedEntity> = [(&flight, "Flight"), (&sfo, "Airport")]
            .into_iter()
            .map(|(node, ty)| ResolvedEntity {
                candidate: candidate(&node.name, ty),
                state: MatchState::ExactMatched,
                resolution: Resolution::Merge { uuid: node.uuid },
                judgment: JudgmentOutcome::NotNeeded,
                matched: vec![node.uuid],
                embedding: None,
            })
            .collect();

        let edge = |ty: &str| CandidateEdge {
            raw_index: 0,
            source: 0,
            target: 1,
            type_name: ty.into(),
            signature: TypePair::new("Flight", "Airport"),
            fact: None,
            attributes: Map::new(),
            group_id: "p1".into(),
        };

        let resolved = resolve_edges(
            &shard,
            vec![edge("DEPARTS_FROM"), edge("ARRIVES_AT"), edge("ARRIVES_AT")],
            &entities,
        );
        assert_eq!(resolved[0].resolution, Resolution::Merge { uuid: existing.uuid });
        assert!(resolved[1].resolution.is_create());
        assert_eq!(
            resolved[2].resolution,
            Resolution::MergePending { uuid: resolved[1].resolution.uuid(), leader: 1 }
        );
        assert_eq!(resolved[1].source_uuid, flight.uuid);
    }
}
