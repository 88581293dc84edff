//! Type registry: entity/edge type schemas and the edge compatibility map.
//!
//! A [`TypeRegistry`] is pure data: it is built once from caller-supplied
//! definitions, validated eagerly, and then only read. The reserved
//! [`WILDCARD_ENTITY_TYPE`] (`Entity`) is implicitly registered and stands for
//! "any entity not matching a custom type".

pub mod validation;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{IngestError, Result};

pub use validation::{
    validate_edge_types, validate_entity_types, RESERVED_EDGE_FIELDS, RESERVED_ENTITY_FIELDS,
};

/// Name of the wildcard entity type carried by every persisted node.
pub const WILDCARD_ENTITY_TYPE: &str = "Entity";

/// JSON shape accepted for a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
}

impl FieldType {
    /// Whether `value` has this field's JSON type. `null` is never accepted here;
    /// optionality is decided by [`FieldDef::accepts`].
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            // Integers widen to floats (`12` is a valid latitude).
            FieldType::Float => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
        }
    }
}

/// A single declared attribute on an entity or edge type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    /// Optional fields accept `null` and may be absent.
    pub optional: bool,
    pub description: Option<String>,
}

impl FieldDef {
    /// An optional field with no description.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            optional: true,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.optional = false;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether `value` may be stored under this field.
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return self.optional;
        }
        self.field_type.matches(value)
    }
}

/// Common view over entity and edge type definitions.
pub trait SchemaType {
    fn name(&self) -> &str;
    fn description(&self) -> Option<&str>;
    fn fields(&self) -> &[FieldDef];

    fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields().iter().find(|f| f.name == name)
    }
}

macro_rules! type_def {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            pub name: String,
            pub description: Option<String>,
            pub fields: Vec<FieldDef>,
        }

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self {
                    name: name.into(),
                    description: None,
                    fields: Vec::new(),
                }
            }

            pub fn describe(mut self, description: impl Into<String>) -> Self {
                self.description = Some(description.into());
                self
            }

            /// Append a field; declaration order is preserved.
            pub fn with_field(mut self, field: FieldDef) -> Self {
                self.fields.push(field);
                self
            }
        }

        impl SchemaType for $name {
            fn name(&self) -> &str {
                &self.name
            }

            fn description(&self) -> Option<&str> {
                self.description.as_deref()
            }

            fn fields(&self) -> &[FieldDef] {
                &self.fields
            }
        }
    };
}

type_def!(
    /// A custom entity (node) type.
    EntityTypeDef
);

type_def!(
    /// A custom edge (relationship) type.
    EdgeTypeDef
);

/// Canonical `(source, target)` entity-type pair keying the [`EdgeTypeMap`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypePair {
    pub source: String,
    pub target: String,
}

impl TypePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl std::fmt::Display for TypePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.source, self.target)
    }
}

/// Directed `(source type, target type) -> allowed edge types` rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeTypeMap {
    rules: BTreeMap<TypePair, BTreeSet<String>>,
}

impl EdgeTypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `edge_types` from `source` to `target`. Repeated calls for the same
    /// pair accumulate.
    pub fn allow<I, S>(mut self, source: &str, target: &str, edge_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules
            .entry(TypePair::new(source, target))
            .or_default()
            .extend(edge_types.into_iter().map(Into::into));
        self
    }

    pub fn get(&self, pair: &TypePair) -> Option<&BTreeSet<String>> {
        self.rules.get(pair)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TypePair, &BTreeSet<String>)> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Build options for [`TypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Also reject edge-type fields named after [`RESERVED_EDGE_FIELDS`].
    ///
    /// Upstream graphiti only checks entity types; this is on by default here.
    pub strict_edge_fields: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            strict_edge_fields: true,
        }
    }
}

/// Validated set of entity types, edge types and their compatibility map.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    entity_types: Vec<EntityTypeDef>,
    entity_index: HashMap<String, usize>,
    edge_types: Vec<EdgeTypeDef>,
    edge_index: HashMap<String, usize>,
    edge_type_map: EdgeTypeMap,
    options: RegistryOptions,
}

impl TypeRegistry {
    /// Build a registry with default [`RegistryOptions`].
    ///
    /// # Errors
    /// - [`IngestError::SchemaConflict`] for duplicate or empty type names, duplicate
    ///   field names within a type, a custom type named `Entity`, or an edge map
    ///   referencing an unregistered type.
    /// - [`IngestError::ReservedField`] when a field reuses a reserved attribute name.
    pub fn register(
        entity_types: Vec<EntityTypeDef>,
        edge_types: Vec<EdgeTypeDef>,
        edge_type_map: EdgeTypeMap,
    ) -> Result<Self> {
        Self::register_with_options(
            entity_types,
            edge_types,
            edge_type_map,
            RegistryOptions::default(),
        )
    }

    pub fn register_with_options(
        entity_types: Vec<EntityTypeDef>,
        edge_types: Vec<EdgeTypeDef>,
        edge_type_map: EdgeTypeMap,
        options: RegistryOptions,
    ) -> Result<Self> {
        let entity_index = index_names("entity", &entity_types)?;
        if entity_index.contains_key(WILDCARD_ENTITY_TYPE) {
            return Err(IngestError::SchemaConflict(format!(
                "'{WILDCARD_ENTITY_TYPE}' is the reserved wildcard type and cannot be registered"
            )));
        }
        let edge_index = index_names("edge", &edge_types)?;

        for (pair, allowed) in edge_type_map.iter() {
            for side in [&pair.source, &pair.target] {
                if side != WILDCARD_ENTITY_TYPE && !entity_index.contains_key(side) {
                    return Err(IngestError::SchemaConflict(format!(
                        "edge type map key {pair} references unknown entity type '{side}'"
                    )));
                }
            }
            if let Some(unknown) = allowed.iter().find(|e| !edge_index.contains_key(*e)) {
                return Err(IngestError::SchemaConflict(format!(
                    "edge type map key {pair} references unknown edge type '{unknown}'"
                )));
            }
        }

        let registry = Self {
            entity_types,
            entity_index,
            edge_types,
            edge_index,
            edge_type_map,
            options,
        };
        registry.validate()?;
        Ok(registry)
    }

    /// Re-run the reserved-field validators. Side-effect free; called again by
    /// every ingestion call.
    pub fn validate(&self) -> Result<()> {
        self.validate_with(self.options)
    }

    /// Like [`validate`](Self::validate), also applying the edge checks that
    /// `options` turns on. A registry built strict stays strict.
    pub fn validate_with(&self, options: RegistryOptions) -> Result<()> {
        validate_entity_types(&self.entity_types)?;
        if self.options.strict_edge_fields || options.strict_edge_fields {
            validate_edge_types(&self.edge_types)?;
        }
        Ok(())
    }

    pub fn options(&self) -> RegistryOptions {
        self.options
    }

    /// Look up a custom entity type. The wildcard resolves to `None`.
    pub fn resolve_entity_type(&self, name: &str) -> Option<&EntityTypeDef> {
        self.entity_index.get(name).map(|&i| &self.entity_types[i])
    }

    /// Whether `name` is a registered custom type or the wildcard.
    pub fn is_entity_type(&self, name: &str) -> bool {
        name == WILDCARD_ENTITY_TYPE || self.entity_index.contains_key(name)
    }

    pub fn edge_type(&self, name: &str) -> Option<&EdgeTypeDef> {
        self.edge_index.get(name).map(|&i| &self.edge_types[i])
    }

    pub fn entity_types(&self) -> &[EntityTypeDef] {
        &self.entity_types
    }

    pub fn edge_types(&self) -> &[EdgeTypeDef] {
        &self.edge_types
    }

    pub fn edge_type_map(&self) -> &EdgeTypeMap {
        &self.edge_type_map
    }

    /// Edge types registered for the directed pair `(source, target)`.
    ///
    /// Empty when no rule exists; wildcard fallbacks are applied by the caller
    /// (see [`crate::normalize::permitted_signature`]).
    pub fn allowed_edge_types(&self, source: &str, target: &str) -> BTreeSet<String> {
        self.edge_type_map
            .get(&TypePair::new(source, target))
            .cloned()
            .unwrap_or_default()
    }

    /// All type pairs that permit `edge_type`, in map order.
    pub fn signatures_for(&self, edge_type: &str) -> Vec<&TypePair> {
        self.edge_type_map
            .iter()
            .filter(|(_, allowed)| allowed.contains(edge_type))
            .map(|(pair, _)| pair)
            .collect()
    }
}

fn index_names<T: SchemaType>(kind: &str, defs: &[T]) -> Result<HashMap<String, usize>> {
    let mut index = HashMap::with_capacity(defs.len());
    for (i, def) in defs.iter().enumerate() {
        if def.name().trim().is_empty() {
            return Err(IngestError::SchemaConflict(format!(
                "{kind} type at position {i} has an empty name"
            )));
        }
        if index.insert(def.name().to_string(), i).is_some() {
            return Err(IngestError::SchemaConflict(format!(
                "duplicate {kind} type '{}'",
                def.name()
            )));
        }
        let mut seen = HashSet::new();
        for field in def.fields() {
            if !seen.insert(field.name.as_str()) {
                return Err(IngestError::SchemaConflict(format!(
                    "{kind} type '{}' declares field '{}' twice",
                    def.name(),
                    field.name
                )));
            }
        }
    }
    Ok(index)
}
