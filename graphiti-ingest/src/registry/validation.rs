//! Reserved-field validation for registered types.
//!
//! Entity nodes reserve their structural slots; a custom field with the same
//! name would overwrite them when attributes are flattened into the node.

use crate::errors::{IngestError, Result};

use super::{EdgeTypeDef, EntityTypeDef, SchemaType};

/// Structural attribute names on every persisted entity node.
pub const RESERVED_ENTITY_FIELDS: [&str; 8] = [
    "uuid",
    "name",
    "group_id",
    "labels",
    "created_at",
    "name_embedding",
    "summary",
    "attributes",
];

/// Structural attribute names on every persisted entity edge.
///
/// Narrower than the node set: `attributes` and `name` stay legal on edges.
pub const RESERVED_EDGE_FIELDS: [&str; 5] = [
    "uuid",
    "group_id",
    "created_at",
    "source_node_uuid",
    "target_node_uuid",
];

pub fn is_reserved_entity_field(name: &str) -> bool {
    RESERVED_ENTITY_FIELDS.contains(&name)
}

pub fn is_reserved_edge_field(name: &str) -> bool {
    RESERVED_EDGE_FIELDS.contains(&name)
}

/// Fail with [`IngestError::ReservedField`] on the first entity-type field
/// that reuses a reserved node attribute name.
pub fn validate_entity_types(defs: &[EntityTypeDef]) -> Result<()> {
    check_reserved(defs, &RESERVED_ENTITY_FIELDS)
}

/// Edge counterpart of [`validate_entity_types`], checked against
/// [`RESERVED_EDGE_FIELDS`].
pub fn validate_edge_types(defs: &[EdgeTypeDef]) -> Result<()> {
    check_reserved(defs, &RESERVED_EDGE_FIELDS)
}

fn check_reserved<T: SchemaType>(defs: &[T], reserved: &[&str]) -> Result<()> {
    for def in defs {
        if let Some(field) = def.fields().iter().find(|f| reserved.contains(&f.name.as_str())) {
            return Err(IngestError::ReservedField {
                type_name: def.name().to_string(),
                field_name: field.name.clone(),
            });
        }
    }
    Ok(())
}
