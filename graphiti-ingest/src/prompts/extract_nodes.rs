//! Entity and relationship extraction prompt.

use crate::extraction::SourceKind;
use crate::llm_client::Message;
use crate::registry::{TypeRegistry, WILDCARD_ENTITY_TYPE};

use super::describe_type;

const SYSTEM: &str = "You are an AI assistant that extracts entity nodes and the \
relationships between them from content, classifying each one against a fixed schema.";

/// Messages asking the model for an [`crate::extraction::ExtractionResult`].
pub fn build(content: &str, source: SourceKind, registry: &TypeRegistry) -> Vec<Message> {
    let user = format!(
        r#"<ENTITY TYPES>
{entity_types}
</ENTITY TYPES>

<EDGE TYPES>
{edge_types}
</EDGE TYPES>

<{tag}>
{content}
</{tag}>

{instructions}

Guidelines:
1. Extract every significant entity mentioned in the {noun}, including people, places, organisations and bookings.
2. Set "entity_type" to the most specific ENTITY TYPE that applies. Use "{wildcard}" when none applies.
3. Only fill "attributes" with fields declared on the chosen type, using the declared value types. Omit unknown values.
4. Do not extract dates, times or amounts as entities; record them as attributes instead.
5. Edges reference entities by their position in the "entities" list (0-based) through "source" and "target".
6. Only use an EDGE TYPE when the source and target types appear in its allowed signatures. Write a one-sentence "fact" for each edge.
7. Do not invent entities or relationships that the {noun} does not state."#,
        entity_types = entity_types(registry),
        edge_types = edge_types(registry),
        tag = source_tag(source),
        instructions = instructions(source),
        noun = source_noun(source),
        wildcard = WILDCARD_ENTITY_TYPE,
    );

    vec![Message::system(SYSTEM), Message::user(user)]
}

fn entity_types(registry: &TypeRegistry) -> String {
    let mut lines: Vec<String> = registry.entity_types().iter().map(describe_type).collect();
    lines.push(format!(
        "- {WILDCARD_ENTITY_TYPE}: Any entity that matches none of the other types."
    ));
    lines.join("\n")
}

fn edge_types(registry: &TypeRegistry) -> String {
    if registry.edge_types().is_empty() {
        return "(none; return an empty \"edges\" list)".to_string();
    }
    registry
        .edge_types()
        .iter()
        .map(|def| {
            let signatures: Vec<String> = registry
                .signatures_for(&def.name)
                .iter()
                .map(|pair| format!("{} -> {}", pair.source, pair.target))
                .collect();
            format!(
                "{}\n    allowed between: {}",
                describe_type(def),
                if signatures.is_empty() {
                    "nothing".to_string()
                } else {
                    signatures.join(", ")
                }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn source_tag(source: SourceKind) -> &'static str {
    match source {
        SourceKind::Json => "JSON",
        SourceKind::Text => "TEXT",
        SourceKind::Message => "MESSAGES",
    }
}

fn source_noun(source: SourceKind) -> &'static str {
    match source {
        SourceKind::Json => "JSON",
        SourceKind::Text => "text",
        SourceKind::Message => "conversation",
    }
}

fn instructions(source: SourceKind) -> &'static str {
    match source {
        SourceKind::Json => {
            "Given the JSON above, extract the entities it describes and the relationships between them. \
             Use the value of a \"name\" or similarly descriptive field as the entity name."
        }
        SourceKind::Text => {
            "Given the text above, extract the entities it mentions and the relationships between them."
        }
        SourceKind::Message => {
            "Given the conversation above, extract the entities the speakers mention and the \
             relationships between them. Treat the speaker as an entity when they refer to themselves."
        }
    }
}
