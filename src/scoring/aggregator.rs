use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use super::edit_distance::EditDistanceScorer;
use super::lexical::{JaccardScorer, TfIdfCosineScorer};
use super::ngram::{BleuConfig, NGramPrecisionScorer};
use super::report::{MetricOutcome, ScoreReport};
use super::semantic::{SemanticSimilarityScorer, DEFAULT_SEMANTIC_TIMEOUT};
use super::structural::StructuralOverlapScorer;
use super::{Metric, MetricKind, NormalizerConfig, TextNormalizer};
use crate::embedding::EmbeddingProvider;
use crate::error::ScoringError;

/// Caller-supplied combination over the successful headline values
pub type CombineFn = dyn Fn(&BTreeMap<MetricKind, f64>) -> Option<f64> + Send + Sync;

/// How successful metric values are folded into `combined_score`
#[derive(Clone, Default)]
pub enum WeightingPolicy {
    /// Arithmetic mean of every successful metric
    #[default]
    Equal,
    /// Weighted mean; metrics without a weight count as 0.
    /// Weights are renormalized over the metrics that succeeded.
    Weighted(HashMap<MetricKind, f64>),
    Custom(Arc<CombineFn>),
}

impl fmt::Debug for WeightingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightingPolicy::Equal => f.write_str("Equal"),
            WeightingPolicy::Weighted(weights) => f.debug_tuple("Weighted").field(weights).finish(),
            WeightingPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl WeightingPolicy {
    pub fn combine(&self, values: &BTreeMap<MetricKind, f64>) -> Option<f64> {
        if values.is_empty() {
            return None;
        }

        match self {
            WeightingPolicy::Equal => Some(values.values().sum::<f64>() / values.len() as f64),
            WeightingPolicy::Weighted(weights) => {
                let mut weight_sum = 0.0;
                let mut weighted = 0.0;
                for (kind, value) in values {
                    let weight = weights.get(kind).copied().unwrap_or(0.0).max(0.0);
                    weight_sum += weight;
                    weighted += weight * value;
                }
                (weight_sum > 0.0).then(|| weighted / weight_sum)
            }
            // Caller functions are held to the same [0, 1] range as the built-in policies
            WeightingPolicy::Custom(combine) => combine(values)
                .filter(|value| value.is_finite())
                .map(super::clamp_unit),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Metrics to run, reported in this set regardless of order
    pub metrics: Vec<MetricKind>,
    pub normalizer: NormalizerConfig,
    pub bleu: BleuConfig,
    /// Stem tokens before ROUGE matching
    pub rouge_stemming: bool,
    pub semantic_timeout: Duration,
    pub weighting: WeightingPolicy,
    /// Pairs scored at once by `aggregate_batch`
    pub batch_concurrency: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            metrics: MetricKind::ALL.to_vec(),
            normalizer: NormalizerConfig::default(),
            bleu: BleuConfig::default(),
            rouge_stemming: true,
            semantic_timeout: DEFAULT_SEMANTIC_TIMEOUT,
            weighting: WeightingPolicy::Equal,
            batch_concurrency: 4,
        }
    }
}

/// Runs the configured metrics over one (reference, candidate) pair
pub struct ScoreAggregator {
    normalizer: TextNormalizer,
    classical: Vec<Box<dyn Metric>>,
    semantic: Option<SemanticSimilarityScorer>,
    semantic_requested: bool,
    weighting: WeightingPolicy,
    batch_concurrency: usize,
}

impl ScoreAggregator {
    /// `provider` is only needed when the semantic metric is configured;
    /// without one that metric is reported unavailable on every pair.
    pub fn new(config: AggregatorConfig, provider: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        let mut metrics = config.metrics.clone();
        metrics.sort();
        metrics.dedup();

        let classical = metrics
            .iter()
            .filter_map(|kind| build_classical(*kind, &config))
            .collect();

        let semantic_requested = metrics.contains(&MetricKind::Semantic);
        let semantic = if semantic_requested {
            provider.map(|provider| SemanticSimilarityScorer::new(provider, config.semantic_timeout))
        } else {
            None
        };

        Self {
            normalizer: TextNormalizer::new(config.normalizer),
            classical,
            semantic,
            semantic_requested,
            weighting: config.weighting,
            batch_concurrency: config.batch_concurrency.max(1),
        }
    }

    pub fn metrics(&self) -> Vec<MetricKind> {
        let mut kinds: Vec<MetricKind> = self.classical.iter().map(|metric| metric.kind()).collect();
        if self.semantic_requested {
            kinds.push(MetricKind::Semantic);
        }
        kinds
    }

    pub async fn aggregate(&self, reference: &str, candidate: &str) -> Result<ScoreReport, ScoringError> {
        let reference = self.normalizer.normalize(reference).map_err(ScoringError::Reference)?;
        let candidate = self.normalizer.normalize(candidate).map_err(ScoringError::Candidate)?;

        let mut outcomes = BTreeMap::new();
        let mut warnings = Vec::new();

        for metric in &self.classical {
            let result = metric.score(&reference, &candidate);
            if let Err(error) = &result {
                warn!("Metric {} failed: {}", metric.kind(), error.reason);
                warnings.push(error.to_string());
            } else if let Some(caveat) = metric.caveat(&reference, &candidate) {
                warnings.push(caveat);
            }
            outcomes.insert(metric.kind(), MetricOutcome::from(result));
        }

        if self.semantic_requested {
            let outcome = match &self.semantic {
                Some(scorer) => match scorer.similarity(&reference, &candidate).await {
                    Ok(cosine) => MetricOutcome::Score(cosine),
                    Err(error) => {
                        warn!("Metric {} failed: {}", MetricKind::Semantic, error.reason);
                        warnings.push(error.to_string());
                        MetricOutcome::unavailable(error.reason)
                    }
                },
                None => {
                    let reason = "no embedding provider is configured";
                    warnings.push(format!("{} unavailable: {}", MetricKind::Semantic, reason));
                    MetricOutcome::unavailable(reason)
                }
            };
            outcomes.insert(MetricKind::Semantic, outcome);
        }

        let combined_score = self.weighting.combine(&participants(&outcomes));

        debug!(
            "Scored pair ({} / {} tokens): {} metrics, {} unavailable, combined {:?}",
            reference.tokens.len(),
            candidate.tokens.len(),
            outcomes.len(),
            outcomes.values().filter(|outcome| !outcome.is_available()).count(),
            combined_score
        );

        Ok(ScoreReport::new(outcomes, combined_score, warnings))
    }

    /// Scores every pair with bounded concurrency; results keep the input order
    pub async fn aggregate_batch<R, C>(&self, pairs: &[(R, C)]) -> Vec<Result<ScoreReport, ScoringError>>
    where
        R: AsRef<str>,
        C: AsRef<str>,
    {
        stream::iter(pairs)
            .map(|(reference, candidate)| self.aggregate(reference.as_ref(), candidate.as_ref()))
            .buffered(self.batch_concurrency)
            .collect()
            .await
    }
}

fn build_classical(kind: MetricKind, config: &AggregatorConfig) -> Option<Box<dyn Metric>> {
    let metric: Box<dyn Metric> = match kind {
        MetricKind::Jaccard => Box::new(JaccardScorer),
        MetricKind::TfIdfCosine => Box::new(TfIdfCosineScorer),
        MetricKind::Levenshtein => Box::new(EditDistanceScorer),
        MetricKind::Bleu => Box::new(NGramPrecisionScorer::new(config.bleu.clone())),
        MetricKind::Rouge1 => Box::new(StructuralOverlapScorer::rouge1().with_stemming(config.rouge_stemming)),
        MetricKind::Rouge2 => Box::new(StructuralOverlapScorer::rouge2().with_stemming(config.rouge_stemming)),
        MetricKind::RougeL => Box::new(StructuralOverlapScorer::rouge_l().with_stemming(config.rouge_stemming)),
        MetricKind::Semantic => return None,
    };
    Some(metric)
}

/// Headline values that take part in the combined score
fn participants(outcomes: &BTreeMap<MetricKind, MetricOutcome>) -> BTreeMap<MetricKind, f64> {
    outcomes
        .iter()
        .filter_map(|(kind, outcome)| {
            let value = outcome.value()?.headline();
            // A negative cosine means "unrelated", not "worse than nothing"
            let value = if *kind == MetricKind::Semantic { value.max(0.0) } else { value };
            Some((*kind, value))
        })
        .collect()
}
