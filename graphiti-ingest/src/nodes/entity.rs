//! EntityNode: a persisted, partition-scoped real-world entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::registry::WILDCARD_ENTITY_TYPE;

/// A real-world entity (airport, traveler, booking agency) resolved into a partition.
///
/// `uuid`, `group_id` and `created_at` never change after creation. `labels`
/// always contain [`WILDCARD_ENTITY_TYPE`] plus every custom type the node has
/// been resolved as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub uuid: Uuid,
    pub name: String,
    pub group_id: String,
    pub labels: Vec<String>,
    pub summary: String,
    pub name_embedding: Option<Vec<f32>>,
    pub attributes: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl EntityNode {
    /// A fresh node of `type_name` with a generated uuid and the wildcard label.
    pub fn new(name: impl Into<String>, type_name: &str, group_id: impl Into<String>) -> Self {
        let mut node = Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            group_id: group_id.into(),
            labels: vec![WILDCARD_ENTITY_TYPE.to_string()],
            summary: String::new(),
            name_embedding: None,
            attributes: Map::new(),
            created_at: Utc::now(),
        };
        node.add_label(type_name);
        node
    }

    /// Add a type label if absent. Returns whether the label set changed.
    pub fn add_label(&mut self, label: &str) -> bool {
        if self.labels.iter().any(|l| l == label) {
            return false;
        }
        self.labels.push(label.to_string());
        true
    }

    /// Custom type labels, i.e. every label except the wildcard.
    pub fn custom_types(&self) -> impl Iterator<Item = &str> {
        self.labels
            .iter()
            .map(String::as_str)
            .filter(|l| *l != WILDCARD_ENTITY_TYPE)
    }

    /// Whether the node is resolved as `type_name`.
    ///
    /// The wildcard only matches nodes that carry no custom type, so an untyped
    /// "SFO" and an `Airport` "SFO" are not the same exact key.
    pub fn has_type(&self, type_name: &str) -> bool {
        if type_name == WILDCARD_ENTITY_TYPE {
            return self.custom_types().next().is_none();
        }
        self.labels.iter().any(|l| l == type_name)
    }

    /// Labels used for edge compatibility checks: custom types, or the wildcard
    /// alone for untyped nodes.
    pub fn type_names(&self) -> Vec<&str> {
        let custom: Vec<&str> = self.custom_types().collect();
        if custom.is_empty() {
            vec![WILDCARD_ENTITY_TYPE]
        } else {
            custom
        }
    }
}
