//! # graphiti-ingest
//!
//! Schema-constrained, partition-scoped entity/relationship ingestion for
//! graphiti knowledge graphs.
//!
//! ## Architecture
//!
//! - **Type registry**: custom entity and edge types plus the `(source, target)`
//!   edge compatibility map, validated once at build time
//! - **Normalisation**: extractor output is mapped onto the registry, with the
//!   `Entity` wildcard absorbing anything unmodelled
//! - **Partition-scoped deduplication**: exact, then fuzzy name matching within
//!   one `group_id`, with an external judge deciding fuzzy matches and a
//!   fail-open policy when it cannot
//! - **Per-item commit**: nodes and edges are created or merged individually and
//!   reported in a [`CommitResult`]

pub mod edges;
pub mod errors;
pub mod nodes;
pub mod types;

pub mod driver;
pub mod embedder;
pub mod llm_client;

pub mod prompts;

pub mod dedupe;
pub mod extraction;
pub mod index;
pub mod normalize;
pub mod pipeline;
pub mod registry;
pub mod utils;

pub use errors::{IngestError, LlmError, Result};
pub use extraction::{ExtractionResult, Extractor, PassthroughExtractor, SourceKind};
pub use pipeline::{CommitResult, Ingestor, ItemOutcome};
pub use registry::{
    EdgeTypeDef, EdgeTypeMap, EntityTypeDef, FieldDef, FieldType, TypeRegistry,
    WILDCARD_ENTITY_TYPE,
};
pub use types::{IngestConfig, JudgmentFallback, MatchingStrategy};
