use std::collections::{HashMap, HashSet};

use super::{clamp_unit, Metric, MetricKind, NormalizedText, ScoreValue};
use crate::error::MetricUnavailable;

/// Set overlap of the two token vocabularies
#[derive(Debug, Clone, Copy, Default)]
pub struct JaccardScorer;

impl JaccardScorer {
    pub fn similarity(&self, reference: &NormalizedText, candidate: &NormalizedText) -> f64 {
        let reference_set: HashSet<&str> = reference.tokens.iter().map(String::as_str).collect();
        let candidate_set: HashSet<&str> = candidate.tokens.iter().map(String::as_str).collect();

        match (reference_set.is_empty(), candidate_set.is_empty()) {
            (true, true) => return 1.0,
            (true, false) | (false, true) => return 0.0,
            _ => {}
        }

        let intersection = reference_set.intersection(&candidate_set).count();
        let union = reference_set.union(&candidate_set).count();
        intersection as f64 / union as f64
    }
}

impl Metric for JaccardScorer {
    fn kind(&self) -> MetricKind {
        MetricKind::Jaccard
    }

    fn score(
        &self,
        reference: &NormalizedText,
        candidate: &NormalizedText,
    ) -> Result<ScoreValue, MetricUnavailable> {
        Ok(ScoreValue::Scalar(self.similarity(reference, candidate)))
    }
}

/// Cosine similarity of TF-IDF vectors fitted on the pair alone.
///
/// Term frequency is the raw count and IDF is smoothed as
/// `ln((1 + n) / (1 + df)) + 1`, so terms shared by both documents keep a
/// weight of 1 instead of vanishing in a two-document corpus.
#[derive(Debug, Clone, Copy, Default)]
pub struct TfIdfCosineScorer;

impl TfIdfCosineScorer {
    pub fn similarity(&self, reference: &NormalizedText, candidate: &NormalizedText) -> f64 {
        let reference_counts = term_counts(&reference.tokens);
        let candidate_counts = term_counts(&candidate.tokens);

        if reference_counts.is_empty() || candidate_counts.is_empty() {
            return 0.0;
        }

        let documents = 2.0_f64;
        let idf = |term: &str| -> f64 {
            let df = reference_counts.contains_key(term) as u8 + candidate_counts.contains_key(term) as u8;
            ((1.0 + documents) / (1.0 + df as f64)).ln() + 1.0
        };

        let weigh = |counts: &HashMap<&str, usize>| -> HashMap<String, f64> {
            counts
                .iter()
                .map(|(&term, &count)| (term.to_string(), count as f64 * idf(term)))
                .collect()
        };

        let reference_vector = weigh(&reference_counts);
        let candidate_vector = weigh(&candidate_counts);

        let dot: f64 = reference_vector
            .iter()
            .filter_map(|(term, weight)| candidate_vector.get(term).map(|other| weight * other))
            .sum();
        let reference_norm = reference_vector.values().map(|w| w * w).sum::<f64>().sqrt();
        let candidate_norm = candidate_vector.values().map(|w| w * w).sum::<f64>().sqrt();

        if reference_norm == 0.0 || candidate_norm == 0.0 {
            return 0.0;
        }

        clamp_unit(dot / (reference_norm * candidate_norm))
    }
}

impl Metric for TfIdfCosineScorer {
    fn kind(&self) -> MetricKind {
        MetricKind::TfIdfCosine
    }

    fn score(
        &self,
        reference: &NormalizedText,
        candidate: &NormalizedText,
    ) -> Result<ScoreValue, MetricUnavailable> {
        Ok(ScoreValue::Scalar(self.similarity(reference, candidate)))
    }
}

fn term_counts(tokens: &[String]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_insert(0) += 1;
    }
    counts
}
