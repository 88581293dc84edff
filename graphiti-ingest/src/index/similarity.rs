//! Pluggable name similarity for the fuzzy stage of a partition lookup.
//!
//! Every implementation must be deterministic and give an identical
//! normalised name the top score of `1.0`, so fuzzy results are always a
//! superset of what an exact name match would return.

use crate::nodes::EntityNode;
use crate::utils::{char_shingles, cosine_similarity, jaccard_similarity, normalize_name};

/// Candidate side of a similarity comparison.
#[derive(Debug, Clone)]
pub struct NameQuery<'a> {
    pub name: &'a str,
    /// [`normalize_name`] of `name`.
    pub normalized: String,
    /// Name embedding from the embedding collaborator, when one is configured.
    pub embedding: Option<&'a [f32]>,
}

impl<'a> NameQuery<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            normalized: normalize_name(name),
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Option<&'a [f32]>) -> Self {
        self.embedding = embedding;
        self
    }
}

/// Scores a candidate name against an existing node, in `[0, 1]`.
pub trait NameSimilarity: Send + Sync {
    fn score(&self, query: &NameQuery<'_>, node: &EntityNode) -> f32;
}

impl<F> NameSimilarity for F
where
    F: Fn(&NameQuery<'_>, &EntityNode) -> f32 + Send + Sync,
{
    fn score(&self, query: &NameQuery<'_>, node: &EntityNode) -> f32 {
        self(query, node)
    }
}

/// Jaccard similarity of character n-gram shingles over normalised names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShingleJaccard {
    pub shingle_size: usize,
}

impl Default for ShingleJaccard {
    fn default() -> Self {
        Self { shingle_size: 3 }
    }
}

impl NameSimilarity for ShingleJaccard {
    fn score(&self, query: &NameQuery<'_>, node: &EntityNode) -> f32 {
        let other = normalize_name(&node.name);
        if query.normalized == other {
            return 1.0;
        }
        jaccard_similarity(
            &char_shingles(&query.normalized, self.shingle_size),
            &char_shingles(&other, self.shingle_size),
        )
    }
}

/// Cosine similarity of name embeddings, clamped to `[0, 1]`.
///
/// Identical normalised names score `1.0` even when either side lacks an embedding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbeddingCosine;

impl NameSimilarity for EmbeddingCosine {
    fn score(&self, query: &NameQuery<'_>, node: &EntityNode) -> f32 {
        if query.normalized == normalize_name(&node.name) {
            return 1.0;
        }
        match (query.embedding, node.name_embedding.as_deref()) {
            (Some(a), Some(b)) => cosine_similarity(a, b).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> EntityNode {
        EntityNode::new(name, "Entity", "p1")
    }

    #[test]
    fn identical_names_score_one() {
        let q = NameQuery::new("San  Francisco");
        assert_eq!(ShingleJaccard::default().score(&q, &node("san francisco")), 1.0);
        assert_eq!(EmbeddingCosine.score(&q, &node("SAN FRANCISCO")), 1.0);
    }

    #[test]
    fn shingle_scores_are_deterministic_and_ordered() {
        let sim = ShingleJaccard::default();
        let q = NameQuery::new("Marriott Marquis");
        let close = sim.score(&q, &node("Marriott Marquis SF"));
        let far = sim.score(&q, &node("Hilton Union Square"));
        assert!(close > far);
        assert_eq!(close, sim.score(&q, &node("Marriott Marquis SF")));
        assert!(close < 1.0);
    }

    #[test]
    fn embedding_cosine_uses_vectors() {
        let mut a = node("NYC");
        a.name_embedding = Some(vec![1.0, 0.0]);
        let mut b = node("Paris");
        b.name_embedding = Some(vec![0.0, 1.0]);

        let emb = [1.0_f32, 0.1];
        let q = NameQuery::new("New York City").with_embedding(Some(&emb));
        assert!(EmbeddingCosine.score(&q, &a) > 0.9);
        assert!(EmbeddingCosine.score(&q, &b) < 0.2);
        assert_eq!(EmbeddingCosine.score(&NameQuery::new("New York City"), &a), 0.0);
    }

    #[test]
    fn closures_are_similarity_functions() {
        let first_letter = |q: &NameQuery<'_>, n: &EntityNode| -> f32 {
            if q.normalized.chars().next() == n.name.to_lowercase().chars().next() {
                1.0
            } else {
                0.0
            }
        };
        assert_eq!(first_letter.score(&NameQuery::new("Delta"), &node("DL")), 1.0);
    }
}
