//! Candidate normalizer: canonicalise raw extraction output into the
//! registry's type vocabulary.
//!
//! Entities are never rejected for their type: anything that does not resolve
//! becomes the wildcard `Entity`. Edges must be permitted by the edge type map
//! (with wildcard fallback) or they are dropped with a [`DroppedEdge`]
//! diagnostic; a partial extraction never aborts the call.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::extraction::{ExtractionResult, RawEntity};
use crate::registry::validation::{RESERVED_EDGE_FIELDS, RESERVED_ENTITY_FIELDS};
use crate::registry::{SchemaType, TypePair, TypeRegistry, WILDCARD_ENTITY_TYPE};
use crate::utils::normalize_whitespace;

/// An entity candidate typed against the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEntity {
    /// Position of the source entity in the extraction result.
    pub raw_index: usize,
    pub name: String,
    /// A registered type name or [`WILDCARD_ENTITY_TYPE`].
    pub type_name: String,
    pub attributes: Map<String, Value>,
    pub summary: Option<String>,
    pub group_id: String,
}

/// An edge candidate whose type is permitted between its endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEdge {
    /// Position of the source edge in the extraction result.
    pub raw_index: usize,
    /// Index into [`Normalized::entities`].
    pub source: usize,
    /// Index into [`Normalized::entities`].
    pub target: usize,
    pub type_name: String,
    /// The edge type map key that admitted this edge.
    pub signature: TypePair,
    pub fact: Option<String>,
    pub attributes: Map<String, Value>,
    pub group_id: String,
}

/// Why a raw entity or edge did not become a candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropReason {
    EmptyName,
    UnknownEndpoint { index: usize },
    UnknownEdgeType { edge_type: String },
    NotPermitted {
        edge_type: String,
        source_type: String,
        target_type: String,
    },
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::EmptyName => write!(f, "entity has an empty name"),
            DropReason::UnknownEndpoint { index } => {
                write!(f, "edge endpoint {index} does not reference a kept entity")
            }
            DropReason::UnknownEdgeType { edge_type } => {
                write!(f, "edge type '{edge_type}' is not registered")
            }
            DropReason::NotPermitted {
                edge_type,
                source_type,
                target_type,
            } => write!(
                f,
                "edge type '{edge_type}' is not permitted from {source_type} to {target_type}"
            ),
        }
    }
}

/// Raw entity that was not kept.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedEntity {
    pub raw_index: usize,
    pub name: String,
    pub reason: DropReason,
}

/// Per-edge diagnostic for an edge that was not kept. Not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedEdge {
    pub raw_index: usize,
    pub edge_type: String,
    pub reason: DropReason,
}

/// Output of [`normalize`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub entities: Vec<CandidateEntity>,
    pub edges: Vec<CandidateEdge>,
    pub dropped_entities: Vec<DroppedEntity>,
    pub dropped_edges: Vec<DroppedEdge>,
}

/// Normalise one extraction result for partition `group_id`.
pub fn normalize(raw: ExtractionResult, registry: &TypeRegistry, group_id: &str) -> Normalized {
    let mut out = Normalized::default();
    // raw entity index -> candidate index
    let mut positions: Vec<Option<usize>> = Vec::with_capacity(raw.entities.len());

    for (raw_index, entity) in raw.entities.into_iter().enumerate() {
        match normalize_entity(raw_index, entity, registry, group_id) {
            Ok(candidate) => {
                positions.push(Some(out.entities.len()));
                out.entities.push(candidate);
            }
            Err(dropped) => {
                debug!(raw_index, reason = %dropped.reason, "dropping raw entity");
                positions.push(None);
                out.dropped_entities.push(dropped);
            }
        }
    }

    for (raw_index, edge) in raw.edges.into_iter().enumerate() {
        let endpoint = |index: usize| positions.get(index).copied().flatten();
        let dropped = |reason: DropReason| DroppedEdge {
            raw_index,
            edge_type: edge.edge_type.clone(),
            reason,
        };

        let (source, target) = match (endpoint(edge.source), endpoint(edge.target)) {
            (Some(s), Some(t)) => (s, t),
            (None, _) => {
                out.dropped_edges.push(dropped(DropReason::UnknownEndpoint { index: edge.source }));
                continue;
            }
            (_, None) => {
                out.dropped_edges.push(dropped(DropReason::UnknownEndpoint { index: edge.target }));
                continue;
            }
        };

        let Some(edge_def) = registry.edge_type(&edge.edge_type) else {
            out.dropped_edges.push(dropped(DropReason::UnknownEdgeType {
                edge_type: edge.edge_type.clone(),
            }));
            continue;
        };

        let source_type = &out.entities[source].type_name;
        let target_type = &out.entities[target].type_name;
        let Some(signature) =
            permitted_signature(registry, source_type, target_type, &edge.edge_type)
        else {
            out.dropped_edges.push(dropped(DropReason::NotPermitted {
                edge_type: edge.edge_type.clone(),
                source_type: source_type.clone(),
                target_type: target_type.clone(),
            }));
            continue;
        };

        let attributes = conform_attributes(Some(edge_def), edge.attributes, &RESERVED_EDGE_FIELDS);
        out.edges.push(CandidateEdge {
            raw_index,
            source,
            target,
            type_name: edge.edge_type,
            signature,
            fact: edge.fact.filter(|f| !f.trim().is_empty()),
            attributes,
            group_id: group_id.to_string(),
        });
    }

    for dropped in &out.dropped_edges {
        debug!(
            raw_index = dropped.raw_index,
            edge_type = %dropped.edge_type,
            reason = %dropped.reason,
            "dropping raw edge"
        );
    }

    out
}

fn normalize_entity(
    raw_index: usize,
    entity: RawEntity,
    registry: &TypeRegistry,
    group_id: &str,
) -> std::result::Result<CandidateEntity, DroppedEntity> {
    let name = normalize_whitespace(&entity.name);
    if name.is_empty() {
        return Err(DroppedEntity {
            raw_index,
            name: entity.name,
            reason: DropReason::EmptyName,
        });
    }

    let def = entity
        .entity_type
        .as_deref()
        .map(str::trim)
        .and_then(|t| registry.resolve_entity_type(t));
    let type_name = def
        .map(|d| d.name.clone())
        .unwrap_or_else(|| WILDCARD_ENTITY_TYPE.to_string());

    Ok(CandidateEntity {
        raw_index,
        name,
        type_name,
        attributes: conform_attributes(def, entity.attributes, &RESERVED_ENTITY_FIELDS),
        summary: entity.summary.filter(|s| !s.trim().is_empty()),
        group_id: group_id.to_string(),
    })
}

/// Find the edge type map key that admits `edge_type` between the two entity
/// types, trying `(s, t)`, `(s, Entity)`, `(Entity, t)`, `(Entity, Entity)` in order.
///
/// Every node is an `Entity`, so a rule keyed on the wildcard applies to any
/// concrete type on that side.
pub fn permitted_signature(
    registry: &TypeRegistry,
    source_type: &str,
    target_type: &str,
    edge_type: &str,
) -> Option<TypePair> {
    let w = WILDCARD_ENTITY_TYPE;
    [
        (source_type, target_type),
        (source_type, w),
        (w, target_type),
        (w, w),
    ]
    .into_iter()
    .map(|(s, t)| TypePair::new(s, t))
    .find(|pair| {
        registry
            .edge_type_map()
            .get(pair)
            .is_some_and(|allowed| allowed.contains(edge_type))
    })
}

/// Keep only attributes that fit the type's declared fields.
///
/// With no definition (wildcard entities) attributes are free-form. Reserved
/// structural names are always stripped.
pub fn conform_attributes<T: SchemaType>(
    def: Option<&T>,
    attributes: Map<String, Value>,
    reserved: &[&str],
) -> Map<String, Value> {
    attributes
        .into_iter()
        .filter(|(key, value)| {
            let keep = !reserved.contains(&key.as_str())
                && def.map_or(true, |d| d.field(key).is_some_and(|f| f.accepts(value)));
            if !keep {
                debug!(field = %key, "dropping non-conforming attribute");
            }
            keep
        })
        .collect()
}
