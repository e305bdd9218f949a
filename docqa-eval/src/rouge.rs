//! ROUGE-N and ROUGE-L scoring.
//!
//! Texts are tokenized into lowercase runs of Unicode letters and numbers;
//! punctuation and whitespace only separate tokens.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Which ROUGE variant to compute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RougeMetric {
    /// N-gram overlap.
    N { n: usize },
    /// Longest common subsequence.
    L,
}

impl Default for RougeMetric {
    fn default() -> Self {
        Self::N { n: 1 }
    }
}

impl fmt::Display for RougeMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::N { n } => write!(f, "ROUGE-{n}"),
            Self::L => write!(f, "ROUGE-L"),
        }
    }
}

/// Precision, recall and F-measure of a candidate against a reference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Score {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Score {
    pub const PERFECT: Self = Self { precision: 1.0, recall: 1.0, f1: 1.0 };
    pub const ZERO: Self = Self { precision: 0.0, recall: 0.0, f1: 0.0 };

    fn from_overlap(overlap: usize, candidate_total: usize, reference_total: usize) -> Self {
        if overlap == 0 || candidate_total == 0 || reference_total == 0 {
            return Self::ZERO;
        }
        let precision = overlap as f64 / candidate_total as f64;
        let recall = overlap as f64 / reference_total as f64;
        let f1 = 2.0 * precision * recall / (precision + recall);
        Self { precision, recall, f1 }
    }
}

/// Split `text` into lowercase letter/number tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Score `candidate` against `reference` with `metric`.
pub fn score(metric: RougeMetric, candidate: &str, reference: &str) -> Score {
    let candidate = tokenize(candidate);
    let reference = tokenize(reference);
    // Identical token streams are a perfect match even when too short for n-grams.
    if candidate == reference {
        return Score::PERFECT;
    }
    match metric {
        RougeMetric::N { n } => rouge_n(&candidate, &reference, n),
        RougeMetric::L => rouge_l(&candidate, &reference),
    }
}

fn ngrams(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if n == 0 {
        return counts;
    }
    for gram in tokens.windows(n) {
        *counts.entry(gram).or_insert(0) += 1;
    }
    counts
}

/// ROUGE-N over pre-tokenized text, with clipped n-gram counts.
pub fn rouge_n(candidate: &[String], reference: &[String], n: usize) -> Score {
    let candidate_grams = ngrams(candidate, n);
    let reference_grams = ngrams(reference, n);
    let overlap: usize = candidate_grams
        .iter()
        .map(|(gram, count)| (*count).min(reference_grams.get(gram).copied().unwrap_or(0)))
        .sum();
    Score::from_overlap(
        overlap,
        candidate_grams.values().sum(),
        reference_grams.values().sum(),
    )
}

/// ROUGE-L over pre-tokenized text.
pub fn rouge_l(candidate: &[String], reference: &[String]) -> Score {
    Score::from_overlap(lcs_len(candidate, reference), candidate.len(), reference.len())
}

fn lcs_len(a: &[String], b: &[String]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y { prev[j] + 1 } else { prev[j + 1].max(curr[j]) };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_lowercases_and_splits_on_punctuation() {
        assert_eq!(tokenize("Hello, WORLD! v2.0 Привет"), ["hello", "world", "v2", "0", "привет"]);
        assert!(tokenize(" ... ").is_empty());
    }

    #[test]
    fn identical_text_scores_one() {
        let text = "The cat sat on the mat.";
        assert_eq!(score(RougeMetric::default(), text, text), Score::PERFECT);
        assert_eq!(score(RougeMetric::L, text, text), Score::PERFECT);
        assert_eq!(score(RougeMetric::N { n: 4 }, "short", "Short!"), Score::PERFECT);
    }

    #[test]
    fn zero_overlap_scores_zero() {
        assert_eq!(score(RougeMetric::default(), "alpha beta", "gamma delta"), Score::ZERO);
        assert_eq!(score(RougeMetric::L, "alpha beta", "gamma delta"), Score::ZERO);
        assert_eq!(score(RougeMetric::default(), "", "gamma delta"), Score::ZERO);
    }

    #[test]
    fn rouge_1_counts_are_clipped() {
        let s = score(RougeMetric::default(), "the the the", "the cat");
        assert!((s.precision - 1.0 / 3.0).abs() < 1e-12);
        assert!((s.recall - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rouge_2_and_l_on_known_pair() {
        let candidate = "the cat was found under the bed";
        let reference = "the cat was under the bed";
        let bigrams = score(RougeMetric::N { n: 2 }, candidate, reference);
        // 4 of the reference's 5 bigrams, 4 of the candidate's 6.
        assert!((bigrams.recall - 0.8).abs() < 1e-12);
        assert!((bigrams.precision - 4.0 / 6.0).abs() < 1e-12);

        let lcs = score(RougeMetric::L, candidate, reference);
        assert!((lcs.recall - 1.0).abs() < 1e-12);
        assert!((lcs.precision - 6.0 / 7.0).abs() < 1e-12);
    }
}
