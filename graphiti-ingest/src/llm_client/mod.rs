//! LLM client abstraction.
//!
//! Used by [`crate::extraction::LlmExtractor`] and [`crate::dedupe::LlmJudge`].
//! The pipeline never calls a model directly, so any client that returns
//! schema-shaped JSON can back extraction and duplicate judgment.
//!
//! # Implementations
//! - [`openai::OpenAiClient`]: OpenAI chat completions via `async-openai`.

pub mod openai;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::Result;

pub use openai::{CacheConfig, OpenAiClient, RetryConfig};

/// A chat message for the LLM conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Speaker role in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Trait for LLM clients supporting structured output (JSON schema).
#[allow(async_fn_in_trait)]
pub trait LlmClient: Send + Sync {
    /// Send a request and return the response text.
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Send a request and parse the response as `T`, using the JSON schema
    /// derived from `T` to constrain the model output.
    async fn generate_structured<T>(&self, messages: &[Message]) -> Result<T>
    where
        T: DeserializeOwned + schemars::JsonSchema;
}
