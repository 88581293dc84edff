//! Node types for the knowledge graph.
//!
//! Ingestion only ever materialises [`entity::EntityNode`]s.

pub mod entity;

pub use entity::EntityNode;
