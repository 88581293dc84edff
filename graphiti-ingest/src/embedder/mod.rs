//! Embedder client abstraction.
//!
//! Embeddings are optional: when an embedder is configured the pipeline embeds
//! every candidate name once per ingestion call, stores the vector on created
//! nodes, and hands it to the name similarity function. Without one, names
//! are compared by text alone.

pub mod openai;

use crate::errors::{IngestError, Result};

pub use openai::OpenAiEmbedder;

/// A vector embedding (f32 components).
pub type Embedding = Vec<f32>;

/// Trait for text-to-vector embedding clients.
#[allow(async_fn_in_trait)]
pub trait EmbedderClient: Send + Sync {
    /// Generate an embedding for a single text string.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generate embeddings for a batch of texts, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Returns the dimensionality of embeddings produced by this client.
    fn dim(&self) -> usize;
}

/// Placeholder embedder type for pipelines built without one. Never called.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEmbedder;

impl EmbedderClient for NoEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding> {
        Err(IngestError::Embedder("no embedder configured".to_string()))
    }

    async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Embedding>> {
        Err(IngestError::Embedder("no embedder configured".to_string()))
    }

    fn dim(&self) -> usize {
        0
    }
}
