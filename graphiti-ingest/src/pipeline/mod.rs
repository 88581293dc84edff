//! Ingestion pipeline.
//!
//! The stages of one [`Ingestor::ingest`] call, in order:
//! 1. **Validate**: re-run the registry's reserved-field checks, edge types
//!    included when `strict_edge_fields` is set on either the registry or the config
//! 2. **Extract**: the extraction collaborator turns raw content into typed candidates
//! 3. **Normalize**: map asserted types onto the registry, drop unpermitted edges
//! 4. **Lock**: take the partition's shard, hydrating it from storage on first use
//! 5. **Embed**: one batched embedding call for candidate names (optional)
//! 6. **Deduplicate**: exact, then fuzzy plus judgment, per candidate; edges by key
//! 7. **Commit**: create or merge each item, reporting per-item outcomes
//!
//! Steps 4-7 run while holding the partition lock, so at most one call per
//! partition is between lookup and write at any time. Calls for different
//! partitions never wait on each other.

pub mod commit;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dedupe::{Deduplicator, Judge};
use crate::driver::{GraphDriver, PartitionFilter};
use crate::embedder::{EmbedderClient, Embedding, NoEmbedder};
use crate::errors::{IngestError, Result};
use crate::extraction::{ExtractionResult, Extractor, SourceKind};
use crate::index::{MatchConfig, NameSimilarity, PartitionIndex, ShingleJaccard};
use crate::normalize::{normalize, CandidateEntity};
use crate::registry::TypeRegistry;
use crate::types::IngestConfig;

pub use commit::{CommitResult, EdgeReport, EntityReport, ItemOutcome};

/// Entry point of the pipeline.
///
/// Generic over its collaborators: the graph driver `D`, extractor `X`,
/// judge `J` and optional embedder `E`.
pub struct Ingestor<D, X, J, E = NoEmbedder> {
    driver: D,
    extractor: X,
    dedupe: Deduplicator<J>,
    embedder: Option<E>,
    index: PartitionIndex,
    config: IngestConfig,
}

impl<D, X, J> Ingestor<D, X, J, NoEmbedder>
where
    D: GraphDriver,
    X: Extractor,
    J: Judge,
{
    /// Build an ingestor with the default [`ShingleJaccard`] similarity.
    ///
    /// # Errors
    /// [`IngestError::Validation`] when `config` violates its constraints.
    pub fn new(driver: D, extractor: X, judge: J, config: IngestConfig) -> Result<Self> {
        config.check()?;
        Ok(Self {
            driver,
            extractor,
            dedupe: Deduplicator::new(judge, &config),
            embedder: None,
            index: PartitionIndex::new(
                Arc::new(ShingleJaccard::default()),
                MatchConfig::from(&config),
            ),
            config,
        })
    }

    /// Embed candidate names with `embedder` and store the vectors on nodes.
    pub fn with_embedder<E2: EmbedderClient>(self, embedder: E2) -> Ingestor<D, X, J, E2> {
        Ingestor {
            driver: self.driver,
            extractor: self.extractor,
            dedupe: self.dedupe,
            embedder: Some(embedder),
            index: self.index,
            config: self.config,
        }
    }
}

impl<D, X, J, E> Ingestor<D, X, J, E>
where
    D: GraphDriver,
    X: Extractor,
    J: Judge,
    E: EmbedderClient,
{
    /// Replace the fuzzy name similarity function. Partition shards are
    /// rebuilt from storage on their next use.
    pub fn with_similarity<S: NameSimilarity + 'static>(mut self, similarity: S) -> Self {
        self.index = PartitionIndex::new(Arc::new(similarity), MatchConfig::from(&self.config));
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn judge(&self) -> &J {
        self.dedupe.judge()
    }

    pub fn index(&self) -> &PartitionIndex {
        &self.index
    }

    /// Ingest raw content into partition `group_id`.
    ///
    /// # Errors
    /// Only call-level failures: registry validation, extraction, or loading
    /// the partition from storage. Per-item problems are reported inside the
    /// returned [`CommitResult`].
    pub async fn ingest(
        &self,
        group_id: &str,
        content: &str,
        source: SourceKind,
        registry: &TypeRegistry,
    ) -> Result<CommitResult> {
        check_group_id(group_id)?;
        registry.validate_with(self.config.registry_options())?;

        let extracted = self.extractor.extract(content, source, registry).await?;
        debug!(
            group_id,
            source = source.as_str(),
            entities = extracted.entities.len(),
            edges = extracted.edges.len(),
            "extraction complete"
        );
        self.apply(group_id, extracted, registry).await
    }

    /// Ingest an already extracted candidate set, skipping the extractor.
    pub async fn ingest_extraction(
        &self,
        group_id: &str,
        extracted: ExtractionResult,
        registry: &TypeRegistry,
    ) -> Result<CommitResult> {
        check_group_id(group_id)?;
        registry.validate_with(self.config.registry_options())?;
        self.apply(group_id, extracted, registry).await
    }

    async fn apply(
        &self,
        group_id: &str,
        extracted: ExtractionResult,
        registry: &TypeRegistry,
    ) -> Result<CommitResult> {
        let normalized = normalize(extracted, registry, group_id);
        for dropped in &normalized.dropped_edges {
            warn!(
                group_id,
                edge_type = %dropped.edge_type,
                reason = %dropped.reason,
                "edge dropped"
            );
        }

        let mut shard = self.index.lock(group_id).await?;
        if !shard.is_hydrated() {
            let snapshot = self
                .driver
                .query_by_partition(group_id, &PartitionFilter::all())
                .await?;
            debug!(
                group_id,
                nodes = snapshot.nodes.len(),
                edges = snapshot.edges.len(),
                "partition hydrated"
            );
            shard.hydrate(snapshot)?;
        }

        let embeddings = self.embed_names(&normalized.entities).await;
        let entities = self
            .dedupe
            .resolve_entities(&shard, registry, normalized.entities, embeddings)
            .await;
        let edges = self
            .dedupe
            .resolve_edges(&shard, normalized.edges, &entities);

        let result = commit::commit(
            &self.driver,
            &mut shard,
            entities,
            edges,
            normalized.dropped_entities,
            normalized.dropped_edges,
        )
        .await;

        info!(
            group_id,
            created = result.created(),
            merged = result.merged(),
            dropped = result.dropped(),
            failed = result.failed(),
            "ingestion committed"
        );
        Ok(result)
    }

    /// One batched embedding call. Any failure degrades to no embeddings.
    async fn embed_names(&self, entities: &[CandidateEntity]) -> Vec<Option<Embedding>> {
        let Some(embedder) = &self.embedder else {
            return Vec::new();
        };
        if entities.is_empty() {
            return Vec::new();
        }

        let names: Vec<&str> = entities.iter().map(|e| e.name.as_str()).collect();
        match tokio::time::timeout(self.config.embedding_timeout(), embedder.embed_batch(&names))
            .await
        {
            Ok(Ok(vectors)) if vectors.len() == names.len() => {
                vectors.into_iter().map(Some).collect()
            }
            Ok(Ok(vectors)) => {
                warn!(
                    expected = names.len(),
                    got = vectors.len(),
                    "embedder returned the wrong number of vectors, continuing without embeddings"
                );
                Vec::new()
            }
            Ok(Err(e)) => {
                warn!(error = %e, "embedding failed, continuing without embeddings");
                Vec::new()
            }
            Err(_) => {
                warn!("embedding timed out, continuing without embeddings");
                Vec::new()
            }
        }
    }
}

fn check_group_id(group_id: &str) -> Result<()> {
    if group_id.trim().is_empty() {
        return Err(IngestError::Validation(
            "group_id must not be empty".to_string(),
        ));
    }
    Ok(())
}
