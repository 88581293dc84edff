//! Error types for graphiti-ingest.
//!
//! Only schema construction (`SchemaConflict`, `ReservedField`) is fatal to an
//! ingestion call. The remaining variants surface per item inside a
//! [`crate::pipeline::CommitResult`] or are absorbed by the fail-open policy.

/// Alias for Results returning [`IngestError`].
pub type Result<T> = std::result::Result<T, IngestError>;

/// Top-level error type for graphiti-ingest.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    #[error("Reserved field '{field_name}' declared on type '{type_name}'")]
    ReservedField {
        type_name: String,
        field_name: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Judgment timed out after {timeout_ms} ms")]
    JudgmentTimeout { timeout_ms: u64 },

    #[error("Judgment unavailable: {0}")]
    JudgmentUnavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Embedder error: {0}")]
    Embedder(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IngestError {
    /// True for errors that abort a whole registry build.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            IngestError::SchemaConflict(_) | IngestError::ReservedField { .. }
        )
    }
}

/// LLM-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Rate limited")]
    RateLimit,

    #[error("Model refused to respond")]
    Refusal,

    #[error("Empty response from LLM")]
    EmptyResponse,

    #[error("Authentication failed")]
    Authentication,

    #[error("API error: HTTP {status}: {message}")]
    Api { status: u16, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_field_message_names_type_and_field() {
        let err = IngestError::ReservedField {
            type_name: "Flight".to_string(),
            field_name: "attributes".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Flight"));
        assert!(msg.contains("attributes"));
        assert!(err.is_schema_error());
    }

    #[test]
    fn runtime_errors_are_not_schema_errors() {
        assert!(!IngestError::JudgmentTimeout { timeout_ms: 10 }.is_schema_error());
        assert!(!IngestError::Persistence("disk full".into()).is_schema_error());
        assert!(IngestError::SchemaConflict("dup".into()).is_schema_error());
    }

    #[test]
    fn llm_error_converts() {
        let err: IngestError = LlmError::RateLimit.into();
        assert!(matches!(err, IngestError::Llm(LlmError::RateLimit)));
    }
}
