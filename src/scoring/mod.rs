//! Multi-metric similarity scoring between a reference answer and a candidate answer.
//!
//! Every metric consumes the same [`NormalizedText`] pair and is independent of the
//! others. The [`ScoreAggregator`] runs the configured set and assembles a
//! [`ScoreReport`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MetricUnavailable;

pub mod aggregator;
pub mod edit_distance;
pub mod lexical;
pub mod ngram;
pub mod normalizer;
pub mod report;
pub mod semantic;
pub mod structural;

pub use aggregator::{AggregatorConfig, ScoreAggregator, WeightingPolicy};
pub use normalizer::{NormalizedText, NormalizerConfig, TextNormalizer};
pub use report::{MetricOutcome, ScoreReport};

/// Names of the metrics the engine knows how to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricKind {
    #[serde(rename = "jaccard")]
    Jaccard,
    #[serde(rename = "tfidf_cosine")]
    TfIdfCosine,
    #[serde(rename = "levenshtein")]
    Levenshtein,
    #[serde(rename = "bleu")]
    Bleu,
    #[serde(rename = "rouge1")]
    Rouge1,
    #[serde(rename = "rouge2")]
    Rouge2,
    #[serde(rename = "rougeL")]
    RougeL,
    #[serde(rename = "semantic")]
    Semantic,
}

impl MetricKind {
    pub const ALL: [MetricKind; 8] = [
        MetricKind::Jaccard,
        MetricKind::TfIdfCosine,
        MetricKind::Levenshtein,
        MetricKind::Bleu,
        MetricKind::Rouge1,
        MetricKind::Rouge2,
        MetricKind::RougeL,
        MetricKind::Semantic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Jaccard => "jaccard",
            MetricKind::TfIdfCosine => "tfidf_cosine",
            MetricKind::Levenshtein => "levenshtein",
            MetricKind::Bleu => "bleu",
            MetricKind::Rouge1 => "rouge1",
            MetricKind::Rouge2 => "rouge2",
            MetricKind::RougeL => "rougeL",
            MetricKind::Semantic => "semantic",
        }
    }

    /// Metrics computed from the normalized pair alone, without an external provider
    pub fn is_classical(&self) -> bool {
        !matches!(self, MetricKind::Semantic)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        MetricKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let known: Vec<&str> = MetricKind::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown metric '{}' (expected one of: {})", wanted, known.join(", "))
            })
    }
}

/// Precision/recall/F1 triple reported by overlap metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlapScore {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl OverlapScore {
    pub const ZERO: OverlapScore = OverlapScore {
        precision: 0.0,
        recall: 0.0,
        f1: 0.0,
    };

    /// Build from overlap counts; candidate size drives precision, reference size drives recall
    pub fn from_counts(overlap: usize, candidate_total: usize, reference_total: usize) -> Self {
        if candidate_total == 0 || reference_total == 0 {
            return Self::ZERO;
        }
        let precision = overlap as f64 / candidate_total as f64;
        let recall = overlap as f64 / reference_total as f64;
        Self::from_precision_recall(precision, recall)
    }

    pub fn from_precision_recall(precision: f64, recall: f64) -> Self {
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self { precision, recall, f1 }
    }
}

/// Value produced by one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreValue {
    Scalar(f64),
    Overlap(OverlapScore),
}

impl ScoreValue {
    /// Scalar used when combining metrics: F1 for overlap triples
    pub fn headline(&self) -> f64 {
        match self {
            ScoreValue::Scalar(value) => *value,
            ScoreValue::Overlap(overlap) => overlap.f1,
        }
    }

    pub fn as_overlap(&self) -> Option<&OverlapScore> {
        match self {
            ScoreValue::Overlap(overlap) => Some(overlap),
            ScoreValue::Scalar(_) => None,
        }
    }
}

/// A pure similarity measure over a normalized (reference, candidate) pair
pub trait Metric: Send + Sync {
    fn kind(&self) -> MetricKind;

    fn score(
        &self,
        reference: &NormalizedText,
        candidate: &NormalizedText,
    ) -> Result<ScoreValue, MetricUnavailable>;

    /// Note attached to the report when the value is computed but approximate
    fn caveat(&self, _reference: &NormalizedText, _candidate: &NormalizedText) -> Option<String> {
        None
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
