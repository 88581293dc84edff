//! OpenAI embedding client.
//!
//! Batches are split into API-sized chunks; network failures are retried with
//! exponential backoff, everything else fails the batch.

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig, error::OpenAIError, types::CreateEmbeddingRequestArgs, Client,
};
use backoff::{future::retry, ExponentialBackoffBuilder};

use crate::embedder::{EmbedderClient, Embedding};
use crate::errors::{IngestError, Result};
use crate::types::OpenAiConfig;

pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Maximum number of inputs per OpenAI embeddings API call.
const BATCH_CHUNK_SIZE: usize = 2048;

fn model_dim(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

fn classify_error(err: OpenAIError) -> backoff::Error<IngestError> {
    let msg = err.to_string();
    match &err {
        OpenAIError::Reqwest(e) if e.is_timeout() || e.is_connect() => {
            backoff::Error::transient(IngestError::Embedder(msg))
        }
        _ => backoff::Error::permanent(IngestError::Embedder(msg)),
    }
}

/// OpenAI embedding client that implements [`EmbedderClient`].
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dim: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_config(OpenAIConfig::new().with_api_key(api_key.into()), model.into())
    }

    /// Embedder for the model named in `config`.
    pub fn from_config(config: &OpenAiConfig) -> Self {
        Self::new(config.openai_api_key.clone(), config.embedding_model.clone())
    }

    /// Point at an OpenAI-compatible endpoint.
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self::with_config(
            OpenAIConfig::new()
                .with_api_key(api_key.into())
                .with_api_base(base_url.into()),
            model.into(),
        )
    }

    fn with_config(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            dim: model_dim(&model),
            model,
        }
    }

    async fn embed_chunk(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(10))
            .with_max_elapsed_time(Some(Duration::from_secs(60)))
            .build();

        let input: Vec<String> = texts.iter().map(|s| (*s).to_owned()).collect();
        let expected = input.len();
        let model = self.model.as_str();
        let client = &self.client;

        let embeddings: Vec<Embedding> = retry(policy, move || {
            let input = input.clone();
            async move {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(model)
                    .input(input)
                    .build()
                    .map_err(|e| backoff::Error::permanent(IngestError::Embedder(e.to_string())))?;

                let mut response = client
                    .embeddings()
                    .create(request)
                    .await
                    .map_err(classify_error)?;

                response.data.sort_by_key(|item| item.index);
                Ok::<Vec<Embedding>, backoff::Error<IngestError>>(response
                    .data
                    .into_iter()
                    .map(|item| item.embedding.into_iter().map(|x| x as f32).collect())
                    .collect())
            }
        })
        .await?;

        if embeddings.len() != expected {
            return Err(IngestError::Embedder(format!(
                "expected {expected} embeddings, got {}",
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }
}

impl EmbedderClient for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut embeddings = self.embed_chunk(&[text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| IngestError::Embedder("empty response from embedding API".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut result = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_CHUNK_SIZE) {
            result.extend(self.embed_chunk(chunk).await?);
        }
        Ok(result)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}
