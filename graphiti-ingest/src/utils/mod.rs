//! Shared utilities.
//!
//! Includes:
//! - Similarity math (cosine over embeddings, shingle Jaccard over names)
//! - Name and whitespace normalisation, LLM response JSON extraction
//! - Bounded `join_all` for collaborator fan-out

pub mod concurrency;
pub mod similarity;
pub mod text;

pub use concurrency::bounded_join_all;
pub use similarity::{char_shingles, cosine_similarity, jaccard_similarity};
pub use text::{
    extract_json_from_response, normalize_name, normalize_whitespace, truncate_with_ellipsis,
};
