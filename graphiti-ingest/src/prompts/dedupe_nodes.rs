//! Node deduplication prompt.

use serde_json::{json, Value};

use crate::dedupe::JudgmentRequest;
use crate::llm_client::Message;
use crate::utils::truncate_with_ellipsis;

const MAX_SUMMARY_CHARS: usize = 500;

const SYSTEM: &str = "You are a helpful assistant that determines whether or not a NEW ENTITY \
is a duplicate of any EXISTING ENTITIES.";

/// Messages asking the model for a [`crate::dedupe::judge::DuplicateJudgments`].
pub fn build(request: &JudgmentRequest) -> Vec<Message> {
    let candidate = &request.candidate;
    let new_entity = json!({
        "name": candidate.name,
        "entity_type": candidate.type_name,
        "entity_type_description": candidate.type_description,
        "summary": candidate.summary,
        "attributes": candidate.attributes,
    });
    let existing: Vec<Value> = request
        .matches
        .iter()
        .enumerate()
        .map(|(id, m)| {
            json!({
                "id": id,
                "name": m.name,
                "entity_types": m.labels,
                "summary": truncate_with_ellipsis(&m.summary, MAX_SUMMARY_CHARS),
                "attributes": m.attributes,
            })
        })
        .collect();

    let user = format!(
        r#"<NEW ENTITY>
{new_entity}
</NEW ENTITY>

<EXISTING ENTITIES>
{existing}
</EXISTING ENTITIES>

For each EXISTING ENTITY, decide whether it refers to the same real-world object or concept as the NEW ENTITY.

Guidelines:
1. Entities are duplicates only if they refer to the same real-world thing. Use the names, types, summaries and attributes.
2. A shared name is not enough: "SFO" the airport and "SFO" the city are different entities unless the context shows otherwise.
3. Differently typed entities may still be duplicates when one type is a more specific description of the same thing.

Return a "judgments" list with exactly one entry per existing entity: its "id" and "is_duplicate" (true or false)."#,
        new_entity = new_entity,
        existing = Value::Array(existing),
    );

    vec![Message::system(SYSTEM), Message::user(user)]
}
