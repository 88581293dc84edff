//! Extraction collaborator: raw content in, candidate entities/edges out.
//!
//! The extraction algorithm itself is a black box to the pipeline. This module
//! fixes the shape of its output ([`ExtractionResult`]) and the [`Extractor`]
//! seam, with two implementations:
//! - [`PassthroughExtractor`]: content already *is* an `ExtractionResult` JSON document
//! - [`llm::LlmExtractor`]: structured-output LLM call prompted with the registry schema

pub mod llm;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{IngestError, Result};
use crate::registry::TypeRegistry;

pub use llm::LlmExtractor;

/// Kind of raw content handed to [`crate::pipeline::Ingestor::ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Structured JSON (e.g. an API export record).
    Json,
    /// Free text.
    Text,
    /// Conversational message(s).
    Message,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Json => "json",
            SourceKind::Text => "text",
            SourceKind::Message => "message",
        }
    }
}

/// An entity as asserted by the extractor, before type normalisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawEntity {
    pub name: String,
    /// Asserted type name; unknown or missing types fall back to `Entity`.
    #[serde(default, alias = "type")]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl RawEntity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: Some(entity_type.into()),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// A relationship as asserted by the extractor. Endpoints are positions in
/// [`ExtractionResult::entities`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawEdge {
    pub source: usize,
    pub target: usize,
    #[serde(alias = "type")]
    pub edge_type: String,
    #[serde(default)]
    pub fact: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl RawEdge {
    pub fn new(source: usize, target: usize, edge_type: impl Into<String>) -> Self {
        Self {
            source,
            target,
            edge_type: edge_type.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Candidate set produced by one extraction call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionResult {
    #[serde(default)]
    pub entities: Vec<RawEntity>,
    #[serde(default)]
    pub edges: Vec<RawEdge>,
}

/// Trait for extraction collaborators.
#[allow(async_fn_in_trait)]
pub trait Extractor: Send + Sync {
    /// Turn raw content into typed candidates, guided by the registry's schemas.
    async fn extract(
        &self,
        content: &str,
        source: SourceKind,
        registry: &TypeRegistry,
    ) -> Result<ExtractionResult>;
}

/// Extractor for callers that already hold structured candidates: the content
/// is parsed as an [`ExtractionResult`] JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughExtractor;

impl Extractor for PassthroughExtractor {
    async fn extract(
        &self,
        content: &str,
        source: SourceKind,
        _registry: &TypeRegistry,
    ) -> Result<ExtractionResult> {
        serde_json::from_str(content).map_err(|e| {
            IngestError::Extraction(format!(
                "{} content is not an extraction result document: {e}",
                source.as_str()
            ))
        })
    }
}
