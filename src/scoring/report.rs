use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{MetricKind, OverlapScore, ScoreValue};
use crate::error::MetricUnavailable;

/// Marker recorded in place of a value when a metric could not run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnavailableMarker {
    pub unavailable: bool,
    pub reason: String,
}

/// What the report holds for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricOutcome {
    Score(f64),
    Overlap(OverlapScore),
    Unavailable(UnavailableMarker),
}

impl MetricOutcome {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        MetricOutcome::Unavailable(UnavailableMarker {
            unavailable: true,
            reason: reason.into(),
        })
    }

    /// The computed value, `None` for an unavailable metric
    pub fn value(&self) -> Option<ScoreValue> {
        match self {
            MetricOutcome::Score(value) => Some(ScoreValue::Scalar(*value)),
            MetricOutcome::Overlap(overlap) => Some(ScoreValue::Overlap(*overlap)),
            MetricOutcome::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, MetricOutcome::Unavailable(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            MetricOutcome::Unavailable(marker) => Some(&marker.reason),
            _ => None,
        }
    }
}

impl From<ScoreValue> for MetricOutcome {
    fn from(value: ScoreValue) -> Self {
        match value {
            ScoreValue::Scalar(value) => MetricOutcome::Score(value),
            ScoreValue::Overlap(overlap) => MetricOutcome::Overlap(overlap),
        }
    }
}

impl From<Result<ScoreValue, MetricUnavailable>> for MetricOutcome {
    fn from(result: Result<ScoreValue, MetricUnavailable>) -> Self {
        match result {
            Ok(value) => value.into(),
            Err(error) => MetricOutcome::unavailable(error.reason),
        }
    }
}

/// Per-pair result: one entry per configured metric plus the combined score.
///
/// Serializes flat, e.g.
/// `{"jaccard": 0.4, "rouge1": {"precision": .., "recall": .., "f1": ..},
///   "semantic": {"unavailable": true, "reason": ".."},
///   "combined_score": 0.52, "warnings": [".."]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    #[serde(flatten)]
    metrics: BTreeMap<MetricKind, MetricOutcome>,
    combined_score: Option<f64>,
    warnings: Vec<String>,
}

impl ScoreReport {
    pub(crate) fn new(
        metrics: BTreeMap<MetricKind, MetricOutcome>,
        combined_score: Option<f64>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            metrics,
            combined_score,
            warnings,
        }
    }

    pub fn get(&self, metric: MetricKind) -> Option<&MetricOutcome> {
        self.metrics.get(&metric)
    }

    /// Scalar value of a metric; F1 for overlap metrics
    pub fn headline(&self, metric: MetricKind) -> Option<f64> {
        self.get(metric)?.value().map(|value| value.headline())
    }

    pub fn overlap(&self, metric: MetricKind) -> Option<OverlapScore> {
        match self.get(metric)? {
            MetricOutcome::Overlap(overlap) => Some(*overlap),
            _ => None,
        }
    }

    pub fn metrics(&self) -> impl Iterator<Item = (MetricKind, &MetricOutcome)> {
        self.metrics.iter().map(|(kind, outcome)| (*kind, outcome))
    }

    pub fn combined_score(&self) -> Option<f64> {
        self.combined_score
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn unavailable_metrics(&self) -> Vec<MetricKind> {
        self.metrics
            .iter()
            .filter(|(_, outcome)| !outcome.is_available())
            .map(|(kind, _)| *kind)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn sample_report() -> ScoreReport {
        let mut metrics = BTreeMap::new();
        metrics.insert(MetricKind::Jaccard, MetricOutcome::Score(0.4));
        metrics.insert(
            MetricKind::Rouge1,
            MetricOutcome::Overlap(OverlapScore::from_precision_recall(0.5, 0.25)),
        );
        metrics.insert(MetricKind::Semantic, MetricOutcome::unavailable("http-embeddings timed out after 10s"));
        ScoreReport::new(
            metrics,
            Some(0.4),
            vec!["semantic unavailable: http-embeddings timed out after 10s".to_string()],
        )
    }

    #[test]
    fn test_json_shape_is_flat() {
        let value: Value = serde_json::to_value(sample_report()).unwrap();

        assert_eq!(value["jaccard"], json!(0.4));
        assert_eq!(value["rouge1"]["precision"], json!(0.5));
        assert_eq!(value["rouge1"]["recall"], json!(0.25));
        assert_eq!(value["semantic"]["unavailable"], json!(true));
        assert!(value["semantic"]["reason"].as_str().unwrap().contains("timed out"));
        assert_eq!(value["combined_score"], json!(0.4));
        assert_eq!(value["warnings"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_combined_score_serializes_as_null() {
        let report = ScoreReport::new(BTreeMap::new(), None, Vec::new());
        let value: Value = serde_json::to_value(report).unwrap();
        assert_eq!(value["combined_score"], Value::Null);
    }

    #[test]
    fn test_accessors() {
        let report = sample_report();
        assert_eq!(report.headline(MetricKind::Jaccard), Some(0.4));
        assert!((report.headline(MetricKind::Rouge1).unwrap() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.headline(MetricKind::Semantic), None);
        assert_eq!(report.headline(MetricKind::Bleu), None);
        assert_eq!(report.unavailable_metrics(), vec![MetricKind::Semantic]);
        assert!(report.get(MetricKind::Semantic).unwrap().reason().unwrap().contains("timed out"));
    }

    #[test]
    fn test_outcome_from_metric_result() {
        let ok: MetricOutcome = Ok(ScoreValue::Scalar(0.75)).into();
        assert_eq!(ok, MetricOutcome::Score(0.75));

        let failed: MetricOutcome = Err(MetricUnavailable::new(MetricKind::Bleu, "no order")).into();
        assert_eq!(failed.reason(), Some("no order"));
    }
}
