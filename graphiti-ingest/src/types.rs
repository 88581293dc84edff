//! Shared configuration types.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{IngestError, Result};
use crate::registry::RegistryOptions;

/// Default Jaccard threshold for fuzzy name matches.
pub const DEFAULT_FUZZY_THRESHOLD: f32 = 0.9;

/// Default bound on concurrent collaborator calls within one ingestion call.
pub const DEFAULT_SEMAPHORE_LIMIT: usize = 20;

/// Whether the fuzzy stage of a partition lookup considers entity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingStrategy {
    /// Name-only fuzzy matching: differently typed entities sharing a name are
    /// candidate duplicates of each other.
    #[default]
    TypeBlind,
    /// Fuzzy matches must carry the candidate's type.
    TypeScoped,
}

impl FromStr for MatchingStrategy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "type_blind" => Ok(Self::TypeBlind),
            "type_scoped" => Ok(Self::TypeScoped),
            other => Err(IngestError::Validation(format!(
                "MATCHING_STRATEGY must be 'type_blind' or 'type_scoped', got '{other}'"
            ))),
        }
    }
}

/// What the deduplication engine does when the judgment collaborator times out,
/// errors, or gives no verdict for a fuzzy-matched candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgmentFallback {
    /// Fail open: create a new node rather than risk a wrong merge.
    #[default]
    TreatAsDistinct,
    /// Merge into the highest-scoring fuzzy match.
    MergeBestMatch,
}

impl FromStr for JudgmentFallback {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "treat_as_distinct" => Ok(Self::TreatAsDistinct),
            "merge_best_match" => Ok(Self::MergeBestMatch),
            other => Err(IngestError::Validation(format!(
                "JUDGMENT_FALLBACK must be 'treat_as_distinct' or 'merge_best_match', got '{other}'"
            ))),
        }
    }
}

/// Ingestion pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IngestConfig {
    /// Minimum similarity in `[0, 1]` for a fuzzy name match.
    #[validate(range(min = 0.0, max = 1.0))]
    pub fuzzy_threshold: f32,

    pub matching_strategy: MatchingStrategy,

    /// Per-call timeout for the judgment collaborator (must be > 0).
    #[validate(range(min = 1))]
    pub judgment_timeout_ms: u64,

    pub judgment_fallback: JudgmentFallback,

    /// Bound on the one batched embedding call per ingestion (must be > 0).
    /// When it elapses the call continues without embeddings.
    #[validate(range(min = 1))]
    pub embedding_timeout_ms: u64,

    /// Max concurrent collaborator calls within one ingestion call (must be > 0).
    #[validate(range(min = 1))]
    pub max_concurrency: usize,

    /// Check edge-type fields against reserved edge attribute names on every
    /// ingestion call, even for a registry built without that check.
    pub strict_edge_fields: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            matching_strategy: MatchingStrategy::TypeBlind,
            judgment_timeout_ms: 30_000,
            judgment_fallback: JudgmentFallback::TreatAsDistinct,
            embedding_timeout_ms: 30_000,
            max_concurrency: DEFAULT_SEMAPHORE_LIMIT,
            strict_edge_fields: true,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` first (non-fatal if `.env` is absent).
    /// Unset variables keep their defaults; malformed ones return
    /// [`IngestError::Validation`] naming the variable.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            fuzzy_threshold: parse_env("FUZZY_THRESHOLD", defaults.fuzzy_threshold)?,
            matching_strategy: parse_env("MATCHING_STRATEGY", defaults.matching_strategy)?,
            judgment_timeout_ms: parse_env("JUDGMENT_TIMEOUT_MS", defaults.judgment_timeout_ms)?,
            judgment_fallback: parse_env("JUDGMENT_FALLBACK", defaults.judgment_fallback)?,
            embedding_timeout_ms: parse_env("EMBEDDING_TIMEOUT_MS", defaults.embedding_timeout_ms)?,
            max_concurrency: parse_env("SEMAPHORE_LIMIT", defaults.max_concurrency)?,
            strict_edge_fields: parse_env("STRICT_EDGE_FIELDS", defaults.strict_edge_fields)?,
        };

        config.check()?;
        Ok(config)
    }

    /// Run `validator` rules, mapping failures to [`IngestError::Validation`].
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| IngestError::Validation(e.to_string()))
    }

    pub fn judgment_timeout(&self) -> Duration {
        Duration::from_millis(self.judgment_timeout_ms)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            strict_edge_fields: self.strict_edge_fields,
        }
    }
}

/// Settings for the OpenAI-backed collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OpenAiConfig {
    #[validate(length(min = 1))]
    pub openai_api_key: String,

    /// Chat model used by the extractor and judge.
    #[validate(length(min = 1))]
    pub model_name: String,

    #[validate(length(min = 1))]
    pub embedding_model: String,
}

impl OpenAiConfig {
    /// Load from `OPENAI_API_KEY` (required), `MODEL_NAME` and `EMBEDDING_MODEL`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let openai_api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            IngestError::Validation("OPENAI_API_KEY is required".to_string())
        })?;
        let model_name = std::env::var("MODEL_NAME").unwrap_or_else(|_| "gpt-4o".to_string());
        let embedding_model = std::env::var("EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());

        let config = Self {
            openai_api_key,
            model_name,
            embedding_model,
        };
        config
            .validate()
            .map_err(|e| IngestError::Validation(e.to_string()))?;
        Ok(config)
    }
}

fn parse_env<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| IngestError::Validation(format!("{name} has an invalid value '{raw}'"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    /// Env vars are process-global; serialize the tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const VARS: [&str; 7] = [
        "FUZZY_THRESHOLD",
        "MATCHING_STRATEGY",
        "JUDGMENT_TIMEOUT_MS",
        "JUDGMENT_FALLBACK",
        "EMBEDDING_TIMEOUT_MS",
        "SEMAPHORE_LIMIT",
        "STRICT_EDGE_FIELDS",
    ];

    /// Temporarily sets env vars for a test, clearing the other config vars
    /// and restoring originals afterward.
    fn with_env<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let originals: Vec<(&str, Option<String>)> =
            VARS.iter().map(|k| (*k, env::var(k).ok())).collect();

        for k in VARS {
            env::remove_var(k);
        }
        for (k, v) in vars {
            env::set_var(k, v);
        }

        let result = f();

        for (k, original) in &originals {
            match original {
                Some(v) => env::set_var(k, v),
                None => env::remove_var(k),
            }
        }
        result
    }

    #[test]
    fn test_config_defaults() {
        with_env(&[], || {
            let config = IngestConfig::from_env().expect("config should load");
            assert_eq!(config.fuzzy_threshold, DEFAULT_FUZZY_THRESHOLD);
            assert_eq!(config.matching_strategy, MatchingStrategy::TypeBlind);
            assert_eq!(config.judgment_timeout_ms, 30_000);
            assert_eq!(config.judgment_fallback, JudgmentFallback::TreatAsDistinct);
            assert_eq!(config.embedding_timeout_ms, 30_000);
            assert_eq!(config.max_concurrency, DEFAULT_SEMAPHORE_LIMIT);
            assert!(config.strict_edge_fields);
        });
    }

    #[test]
    fn test_config_custom_values() {
        with_env(
            &[
                ("FUZZY_THRESHOLD", "0.75"),
                ("MATCHING_STRATEGY", "type_scoped"),
                ("JUDGMENT_TIMEOUT_MS", "250"),
                ("JUDGMENT_FALLBACK", "merge_best_match"),
                ("EMBEDDING_TIMEOUT_MS", "1500"),
                ("SEMAPHORE_LIMIT", "4"),
                ("STRICT_EDGE_FIELDS", "false"),
            ],
            || {
                let config = IngestConfig::from_env().expect("config should load");
                assert_eq!(config.fuzzy_threshold, 0.75);
                assert_eq!(config.matching_strategy, MatchingStrategy::TypeScoped);
                assert_eq!(config.judgment_timeout(), Duration::from_millis(250));
                assert_eq!(config.judgment_fallback, JudgmentFallback::MergeBestMatch);
                assert_eq!(config.embedding_timeout(), Duration::from_millis(1500));
                assert_eq!(config.max_concurrency, 4);
                assert!(!config.registry_options().strict_edge_fields);
            },
        );
    }

    #[test]
    fn test_config_threshold_out_of_range() {
        with_env(&[("FUZZY_THRESHOLD", "1.5")], || {
            let err = IngestConfig::from_env().unwrap_err();
            assert!(matches!(err, IngestError::Validation(_)));
        });
    }

    #[test]
    fn test_config_unparsable_value_names_variable() {
        with_env(&[("JUDGMENT_TIMEOUT_MS", "soon")], || {
            match IngestConfig::from_env().unwrap_err() {
                IngestError::Validation(msg) => assert!(msg.contains("JUDGMENT_TIMEOUT_MS")),
                e => panic!("expected Validation error, got {e:?}"),
            }
        });
    }

    #[test]
    fn test_config_zero_embedding_timeout_rejected() {
        with_env(&[("EMBEDDING_TIMEOUT_MS", "0")], || {
            assert!(IngestConfig::from_env().is_err());
        });
    }

    #[test]
    fn test_config_zero_concurrency_rejected() {
        with_env(&[("SEMAPHORE_LIMIT", "0")], || {
            assert!(IngestConfig::from_env().is_err());
        });
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        assert!("fuzzy".parse::<MatchingStrategy>().is_err());
        assert_eq!(
            "TYPE_BLIND".parse::<MatchingStrategy>().unwrap(),
            MatchingStrategy::TypeBlind
        );
    }

    #[test]
    fn test_openai_config_requires_key() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let saved = env::var("OPENAI_API_KEY").ok();
        env::remove_var("OPENAI_API_KEY");

        let result = OpenAiConfig::from_env();

        if let Some(v) = saved {
            env::set_var("OPENAI_API_KEY", v);
        }
        match result.unwrap_err() {
            IngestError::Validation(msg) => assert!(msg.contains("OPENAI_API_KEY")),
            e => panic!("expected Validation error, got {e:?}"),
        }
    }
}
