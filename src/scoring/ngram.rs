use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{clamp_unit, Metric, MetricKind, NormalizedText, ScoreValue};
use crate::error::MetricUnavailable;

/// Count every contiguous n-gram of `tokens`
pub(crate) fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if n == 0 || tokens.len() < n {
        return counts;
    }
    for window in tokens.windows(n) {
        *counts.entry(window).or_insert(0) += 1;
    }
    counts
}

/// Candidate n-grams matched against the reference, each match clipped to the reference count
pub(crate) fn clipped_overlap(reference: &[String], candidate: &[String], n: usize) -> (usize, usize) {
    let reference_counts = ngram_counts(reference, n);
    let candidate_counts = ngram_counts(candidate, n);

    let matched: usize = candidate_counts
        .iter()
        .map(|(gram, count)| (*count).min(reference_counts.get(gram).copied().unwrap_or(0)))
        .sum();
    let total: usize = candidate_counts.values().sum();
    (matched, total)
}

/// Treatment of orders with no matching n-grams
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BleuSmoothing {
    /// A zero precision at any order makes the score 0
    None,
    /// Replace a zero numerator by `epsilon`
    Epsilon(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BleuConfig {
    pub max_order: usize,
    pub smoothing: BleuSmoothing,
}

impl Default for BleuConfig {
    fn default() -> Self {
        Self {
            max_order: 4,
            smoothing: BleuSmoothing::None,
        }
    }
}

/// Sentence-level BLEU of the candidate against a single reference
#[derive(Debug, Clone, Default)]
pub struct NGramPrecisionScorer {
    config: BleuConfig,
}

impl NGramPrecisionScorer {
    pub fn new(config: BleuConfig) -> Self {
        Self { config }
    }

    pub fn bleu(&self, reference: &[String], candidate: &[String]) -> f64 {
        let c = candidate.len();
        let r = reference.len();

        if c == 0 {
            return if r == 0 { 1.0 } else { 0.0 };
        }
        if r == 0 {
            return 0.0;
        }

        // Orders above the candidate length have no n-grams to judge
        let orders = self.config.max_order.max(1).min(c);

        let mut log_precision_sum = 0.0;
        for n in 1..=orders {
            let (matched, total) = clipped_overlap(reference, candidate, n);
            let numerator = if matched == 0 {
                match self.config.smoothing {
                    BleuSmoothing::None => return 0.0,
                    BleuSmoothing::Epsilon(epsilon) => epsilon,
                }
            } else {
                matched as f64
            };
            log_precision_sum += (numerator / total as f64).ln();
        }

        let geometric_mean = (log_precision_sum / orders as f64).exp();
        clamp_unit(brevity_penalty(r, c) * geometric_mean)
    }
}

fn brevity_penalty(reference_len: usize, candidate_len: usize) -> f64 {
    if candidate_len >= reference_len {
        1.0
    } else {
        (1.0 - reference_len as f64 / candidate_len as f64).exp()
    }
}

impl Metric for NGramPrecisionScorer {
    fn kind(&self) -> MetricKind {
        MetricKind::Bleu
    }

    fn score(
        &self,
        reference: &NormalizedText,
        candidate: &NormalizedText,
    ) -> Result<ScoreValue, MetricUnavailable> {
        if self.config.max_order == 0 {
            return Err(MetricUnavailable::new(MetricKind::Bleu, "max n-gram order must be at least 1"));
        }
        Ok(ScoreValue::Scalar(self.bleu(&reference.tokens, &candidate.tokens)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_identical_sentences_score_one() {
        let scorer = NGramPrecisionScorer::default();
        let sentence = tokens("the product is delivered at a faster rate");
        assert!((scorer.bleu(&sentence, &sentence) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_short_exact_answer_scores_one() {
        let scorer = NGramPrecisionScorer::default();
        let answer = tokens("quality product");
        assert!((scorer.bleu(&answer, &answer) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_boundaries() {
        let scorer = NGramPrecisionScorer::default();
        assert_eq!(scorer.bleu(&[], &[]), 1.0);
        assert_eq!(scorer.bleu(&tokens("devops"), &[]), 0.0);
        assert_eq!(scorer.bleu(&[], &tokens("devops")), 0.0);
    }

    #[test]
    fn test_clipped_precision() {
        // Classic example: "the the the" may only match "the" as often as the reference has it
        let (matched, total) = clipped_overlap(&tokens("the cat is on the mat"), &tokens("the the the the"), 1);
        assert_eq!(matched, 2);
        assert_eq!(total, 4);
    }

    #[test]
    fn test_brevity_penalty_applies_to_short_candidates() {
        let scorer = NGramPrecisionScorer::new(BleuConfig {
            max_order: 1,
            smoothing: BleuSmoothing::None,
        });
        let reference = tokens("fast delivery through continuous integration");
        let candidate = tokens("fast delivery");
        let expected = (1.0_f64 - 5.0 / 2.0).exp();
        assert!((scorer.bleu(&reference, &candidate) - expected).abs() < 1e-12);
        assert!(brevity_penalty(2, 5) == 1.0);
    }

    #[test]
    fn test_missing_higher_order_match_zeroes_without_smoothing() {
        let reference = tokens("the mitochondria is the powerhouse of the cell");
        let candidate = tokens("mitochondria is found inside a human brain");

        let plain = NGramPrecisionScorer::default().bleu(&reference, &candidate);
        assert_eq!(plain, 0.0);

        let smoothed = NGramPrecisionScorer::new(BleuConfig {
            max_order: 4,
            smoothing: BleuSmoothing::Epsilon(0.1),
        })
        .bleu(&reference, &candidate);
        assert!(smoothed > 0.0 && smoothed < 0.2, "smoothed bleu was {}", smoothed);
    }

    #[test]
    fn test_asymmetric_roles() {
        let scorer = NGramPrecisionScorer::new(BleuConfig {
            max_order: 1,
            smoothing: BleuSmoothing::None,
        });
        let long = tokens("feedback loops improve the user experience");
        let short = tokens("feedback loops");
        // Short candidate is penalized for brevity, long candidate for precision
        assert_ne!(scorer.bleu(&long, &short), scorer.bleu(&short, &long));
    }

    #[test]
    fn test_zero_order_is_unavailable() {
        let scorer = NGramPrecisionScorer::new(BleuConfig {
            max_order: 0,
            smoothing: BleuSmoothing::None,
        });
        let text = NormalizedText {
            text: "a b".to_string(),
            tokens: tokens("a b"),
        };
        assert!(scorer.score(&text, &text).is_err());
    }
}
