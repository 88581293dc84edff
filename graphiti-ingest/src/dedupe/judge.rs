//! Judgment collaborator: decides whether fuzzy matches are the same entity.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::errors::{IngestError, Result};
use crate::llm_client::LlmClient;
use crate::prompts::dedupe_nodes;

/// The candidate being resolved, with its type context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateContext {
    pub name: String,
    pub type_name: String,
    pub type_description: Option<String>,
    pub attributes: Map<String, Value>,
    pub summary: Option<String>,
}

/// One existing node the candidate may duplicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchContext {
    pub uuid: Uuid,
    pub name: String,
    pub labels: Vec<String>,
    pub summary: String,
    pub attributes: Map<String, Value>,
    pub score: f32,
}

/// Input to [`Judge::judge`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgmentRequest {
    pub group_id: String,
    pub candidate: CandidateContext,
    pub matches: Vec<MatchContext>,
}

/// Binary verdict on one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub node_uuid: Uuid,
    pub is_duplicate: bool,
}

impl Verdict {
    pub fn duplicate(node_uuid: Uuid) -> Self {
        Self {
            node_uuid,
            is_duplicate: true,
        }
    }

    pub fn distinct(node_uuid: Uuid) -> Self {
        Self {
            node_uuid,
            is_duplicate: false,
        }
    }
}

/// Trait for judgment collaborators.
///
/// Implementations return one verdict per entry of `request.matches`. Missing
/// verdicts are read as "no verdict" for that node; errors and timeouts make
/// the deduplication engine fall back to its configured policy.
#[allow(async_fn_in_trait)]
pub trait Judge: Send + Sync {
    async fn judge(&self, request: &JudgmentRequest) -> Result<Vec<Verdict>>;
}

/// Judge for deployments without one: every call is unavailable, so fuzzy
/// matches always take the fallback path.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableJudge;

impl Judge for UnavailableJudge {
    async fn judge(&self, _request: &JudgmentRequest) -> Result<Vec<Verdict>> {
        Err(IngestError::JudgmentUnavailable(
            "no judgment collaborator configured".to_string(),
        ))
    }
}

/// Structured model response: one entry per numbered match.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DuplicateJudgments {
    #[serde(default)]
    pub judgments: Vec<DuplicateJudgment>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DuplicateJudgment {
    /// Position of the existing entity in the prompt's list.
    pub id: usize,
    pub is_duplicate: bool,
}

/// [`Judge`] backed by an LLM.
pub struct LlmJudge<C> {
    client: C,
}

impl<C: LlmClient> LlmJudge<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: LlmClient> Judge for LlmJudge<C> {
    async fn judge(&self, request: &JudgmentRequest) -> Result<Vec<Verdict>> {
        let messages = dedupe_nodes::build(request);
        let response: DuplicateJudgments = self.client.generate_structured(&messages).await?;

        let mut verdicts = Vec::with_capacity(request.matches.len());
        for judgment in response.judgments {
            let Some(node) = request.matches.get(judgment.id) else {
                warn!(
                    candidate = %request.candidate.name,
                    id = judgment.id,
                    "judge returned a verdict for an unknown match id"
                );
                continue;
            };
            if verdicts.iter().any(|v: &Verdict| v.node_uuid == node.uuid) {
                continue;
            }
            verdicts.push(Verdict {
                node_uuid: node.uuid,
                is_duplicate: judgment.is_duplicate,
            });
        }
        Ok(verdicts)
    }
}
