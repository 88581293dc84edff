//! LLM-backed extractor.

use tracing::debug;

use crate::errors::{IngestError, Result};
use crate::llm_client::LlmClient;
use crate::prompts::extract_nodes;
use crate::registry::TypeRegistry;

use super::{ExtractionResult, Extractor, SourceKind};

/// [`Extractor`] that prompts an LLM with the registry's schemas and parses
/// its structured output.
pub struct LlmExtractor<C> {
    client: C,
}

impl<C: LlmClient> LlmExtractor<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: LlmClient> Extractor for LlmExtractor<C> {
    async fn extract(
        &self,
        content: &str,
        source: SourceKind,
        registry: &TypeRegistry,
    ) -> Result<ExtractionResult> {
        if content.trim().is_empty() {
            return Ok(ExtractionResult::default());
        }

        let messages = extract_nodes::build(content, source, registry);
        let result: ExtractionResult = self
            .client
            .generate_structured(&messages)
            .await
            .map_err(|e| IngestError::Extraction(format!("LLM extraction failed: {e}")))?;

        debug!(
            entities = result.entities.len(),
            edges = result.edges.len(),
            source = source.as_str(),
            "LLM extraction complete"
        );
        Ok(result)
    }
}
