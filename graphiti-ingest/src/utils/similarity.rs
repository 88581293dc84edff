//! Similarity functions over vectors and name shingles.

use std::collections::HashSet;

use ndarray::ArrayView1;

/// Compute the cosine similarity between two f32 slices.
///
/// Returns `0.0` for empty slices, mismatched lengths, or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);

    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    a.dot(&b) / (norm_a * norm_b)
}

/// Character `n`-gram shingles of `s`, computed over its chars with spaces removed.
///
/// Strings shorter than `n` yield themselves as their only shingle so that
/// short codes like "SFO" or "UA" still compare.
pub fn char_shingles(s: &str, n: usize) -> HashSet<String> {
    let chars: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
    if chars.is_empty() {
        return HashSet::new();
    }
    if chars.len() < n || n == 0 {
        return HashSet::from([chars.into_iter().collect()]);
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

/// Jaccard index `|a ∩ b| / |a ∪ b|`; `0.0` when both sets are empty.
pub fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}
