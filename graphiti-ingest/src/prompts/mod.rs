//! Prompt templates for LLM interactions.
//!
//! Each submodule builds the message list for one pipeline stage. Prompts are
//! Rust string literals, formatted with the registry's schema at call time.

pub mod dedupe_nodes;
pub mod extract_nodes;

use crate::registry::{FieldDef, SchemaType};

/// Render a type and its fields as an indented block, e.g.
///
/// ```text
/// - Flight: A flight reservation.
///     airline_code (string, optional): IATA airline code
/// ```
pub(crate) fn describe_type<T: SchemaType>(def: &T) -> String {
    let mut out = format!("- {}", def.name());
    if let Some(description) = def.description() {
        out.push_str(": ");
        out.push_str(description);
    }
    for field in def.fields() {
        out.push_str("\n    ");
        out.push_str(&describe_field(field));
    }
    out
}

fn describe_field(field: &FieldDef) -> String {
    let presence = if field.optional { "optional" } else { "required" };
    match &field.description {
        Some(d) => format!("{} ({}, {presence}): {d}", field.name, field.field_type.as_str()),
        None => format!("{} ({}, {presence})", field.name, field.field_type.as_str()),
    }
}
