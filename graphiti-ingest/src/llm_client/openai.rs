//! OpenAI LLM client implementation.
//!
//! Uses `async-openai` for API calls, `moka` for response caching, and
//! `backoff` for exponential-backoff retry on rate limits / transient errors.

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::{IngestError, LlmError, Result};
use crate::types::OpenAiConfig;
use crate::utils::extract_json_from_response;

use super::{LlmClient, Message};

/// Configuration for the in-process response cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_capacity: u64,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 1_000,
            ttl: Duration::from_secs(3_600),
        }
    }
}

/// Retry budget for rate limits and server errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(60),
            max_elapsed: Duration::from_secs(300),
        }
    }
}

impl RetryConfig {
    /// A budget that never retries.
    pub fn none() -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build()
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build()
    }
}

/// OpenAI chat-completions client implementing [`LlmClient`].
pub struct OpenAiClient {
    client: async_openai::Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retry: RetryConfig,
    /// md5(prefix + model + messages) -> response text.
    cache: Cache<String, String>,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        cache_config: CacheConfig,
    ) -> Self {
        Self::build(
            OpenAIConfig::new().with_api_key(api_key),
            model.into(),
            cache_config,
            RetryConfig::default(),
        )
    }

    /// Client for the chat model named in `config`.
    pub fn from_config(config: &OpenAiConfig) -> Self {
        Self::new(
            config.openai_api_key.clone(),
            config.model_name.clone(),
            CacheConfig::default(),
        )
    }

    /// Point at an OpenAI-compatible endpoint.
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self::build(
            OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(base_url),
            model.into(),
            CacheConfig::default(),
            retry,
        )
    }

    fn build(
        config: OpenAIConfig,
        model: String,
        cache_config: CacheConfig,
        retry: RetryConfig,
    ) -> Self {
        // `call_with_retry` owns the retry budget; the client itself sends once.
        let client = async_openai::Client::with_config(config).with_backoff(RetryConfig::none());
        let cache = Cache::builder()
            .max_capacity(cache_config.max_capacity)
            .time_to_live(cache_config.ttl)
            .build();

        Self {
            client,
            model,
            temperature: 0.0,
            max_tokens: 8_192,
            retry,
            cache,
        }
    }

    /// Override the sampling temperature (default `0.0`).
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the max output token limit (default `8192`).
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn cache_key(&self, prefix: &str, messages: &[Message]) -> String {
        use md5::{Digest, Md5};
        let mut h = Md5::new();
        h.update(prefix.as_bytes());
        h.update(self.model.as_bytes());
        for m in messages {
            h.update(m.role.as_str().as_bytes());
            h.update(m.content.as_bytes());
        }
        format!("{:x}", h.finalize())
    }

    fn request_body(&self, messages: &[Message]) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }

    async fn call_with_retry(&self, request: Value) -> Result<Value> {
        let client = &self.client;
        backoff::future::retry(self.retry.backoff(), move || {
            let request = request.clone();
            async move {
                let outcome: std::result::Result<Value, OpenAIError> =
                    client.chat().create_byot(request).await;
                outcome.map_err(|e| {
                    let err = map_openai_error(e);
                    let transient = match &err {
                        LlmError::RateLimit => true,
                        LlmError::Api { status, .. } => *status >= 500,
                        _ => false,
                    };
                    if transient {
                        warn!(error = %err, "OpenAI transient error, retrying with backoff");
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        })
        .await
        .map_err(IngestError::Llm)
    }

    async fn complete(&self, prefix: &str, request: Value, key: String) -> Result<String> {
        if let Some(cached) = self.cache.get(&key).await {
            debug!(prefix, "LLM cache hit");
            return Ok(cached);
        }

        let response = self.call_with_retry(request).await?;
        let content = response_content(&response)?;
        self.cache.insert(key, content.clone()).await;
        Ok(content)
    }
}

impl LlmClient for OpenAiClient {
    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let key = self.cache_key("text", messages);
        self.complete("text", self.request_body(messages), key).await
    }

    async fn generate_structured<T>(&self, messages: &[Message]) -> Result<T>
    where
        T: DeserializeOwned + schemars::JsonSchema,
    {
        let prefix = std::any::type_name::<T>();
        let key = self.cache_key(prefix, messages);

        // Not strict: extraction payloads carry free-form attribute maps,
        // which strict mode rejects.
        let schema = serde_json::to_value(schemars::schema_for!(T))?;
        let mut request = self.request_body(messages);
        request["response_format"] = json!({
            "type": "json_schema",
            "json_schema": { "name": "response", "schema": schema, "strict": false }
        });

        let content = self.complete(prefix, request, key).await?;
        let payload = extract_json_from_response(&content).unwrap_or(&content);
        Ok(serde_json::from_str(payload)?)
    }
}

/// Assistant text of a chat-completions response.
fn response_content(response: &Value) -> Result<String> {
    let message = &response["choices"][0]["message"];
    if message["refusal"].as_str().is_some_and(|r| !r.is_empty()) {
        return Err(LlmError::Refusal.into());
    }
    match message["content"].as_str() {
        Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
        _ => Err(LlmError::EmptyResponse.into()),
    }
}

fn map_openai_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::ApiError(api_err) => {
            let code = api_err.code.as_deref().unwrap_or_default();
            let kind = api_err.r#type.as_deref().unwrap_or_default();
            match (code, kind) {
                ("invalid_api_key", _) | (_, "authentication_error") => LlmError::Authentication,
                ("rate_limit_exceeded", _) | (_, "requests" | "tokens") => LlmError::RateLimit,
                (_, "server_error") => LlmError::Api {
                    status: 500,
                    message: api_err.message,
                },
                _ => LlmError::Api {
                    status: 400,
                    message: api_err.message,
                },
            }
        }
        other => LlmError::Api {
            status: 0,
            message: other.to_string(),
        },
    }
}
