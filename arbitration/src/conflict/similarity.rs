//! Surface-term similarity for semantic conflict candidates
//!
//! Two terms are similar when either the character n-gram Jaccard index or
//! the normalized Levenshtein ratio of their normalized forms reaches the
//! threshold. Both constants are configuration, not derived values.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Similarity parameters. Defaults: trigrams, θ = 0.6.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityParams {
    pub ngram_size: usize,
    pub threshold: f64,
}

impl Default for SimilarityParams {
    fn default() -> Self {
        Self {
            ngram_size: 3,
            threshold: 0.6,
        }
    }
}

/// Trim, lowercase, strip punctuation and collapse whitespace.
pub fn normalize_term(term: &str) -> String {
    let stripped: String = term
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn char_ngrams(text: &str, n: usize) -> HashSet<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return HashSet::new();
    }
    let n = n.max(1);
    if chars.len() < n {
        return HashSet::from([text.to_string()]);
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

/// Jaccard index over character n-grams. Empty input scores 0.
pub fn ngram_jaccard(a: &str, b: &str, n: usize) -> f64 {
    let grams_a = char_ngrams(a, n);
    let grams_b = char_ngrams(b, n);
    if grams_a.is_empty() || grams_b.is_empty() {
        return 0.0;
    }
    let intersection = grams_a.intersection(&grams_b).count();
    let union = grams_a.union(&grams_b).count();
    intersection as f64 / union as f64
}

/// Whole-string edit similarity in [0, 1]. Empty input scores 0.
pub fn edit_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b)
}

impl SimilarityParams {
    /// Whether two raw terms are distinct after normalization yet similar.
    pub fn distinct_but_similar(&self, a: &str, b: &str) -> bool {
        let a = normalize_term(a);
        let b = normalize_term(b);
        if a.is_empty() || b.is_empty() || a == b {
            return false;
        }
        ngram_jaccard(&a, &b, self.ngram_size) >= self.threshold
            || edit_ratio(&a, &b) >= self.threshold
    }
}
