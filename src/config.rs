use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::embedding::{
    CachedEmbeddingProvider, CircuitBreakerConfig, CircuitBreakingProvider, EmbeddingProvider,
    HashingEmbeddingProvider, HttpEmbeddingConfig, HttpEmbeddingProvider,
};
use crate::extraction::{DocumentExtractorConfig, ImageBackend, PromptProfile, VisionConfig};
use crate::scoring::ngram::{BleuConfig, BleuSmoothing};
use crate::scoring::{AggregatorConfig, MetricKind, NormalizerConfig, WeightingPolicy};

/// Which embedding backend feeds the semantic metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// Local SHA-256 hashing encoder
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    Http,
    /// No provider; the semantic metric is reported unavailable
    None,
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hashing" => Ok(EmbeddingBackend::Hashing),
            "http" => Ok(EmbeddingBackend::Http),
            "none" | "off" => Ok(EmbeddingBackend::None),
            other => Err(format!("unknown embedding backend '{}' (expected hashing, http or none)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Embeddings
    pub embedding_backend: EmbeddingBackend,
    pub embedding_api_url: Option<String>,
    pub embedding_api_key: Option<String>,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub embedding_timeout_seconds: u64,
    pub embedding_cache_capacity: usize,
    pub embedding_failure_threshold: u32,
    pub embedding_recovery_seconds: u64,

    // Scoring
    pub scoring_metrics: Vec<MetricKind>,
    pub scoring_weights: Option<HashMap<MetricKind, f64>>,
    pub bleu_max_order: usize,
    pub bleu_smoothing_epsilon: Option<f64>,
    pub rouge_use_stemmer: bool,
    pub drop_illegible_markers: bool,
    pub batch_concurrency: usize,

    // Extraction
    pub vision_api_url: Option<String>,
    pub vision_api_key: Option<String>,
    pub vision_model: String,
    pub vision_prompt: PromptProfile,
    pub vision_temperature: f32,
    pub vision_max_tokens: u32,
    pub vision_top_p: f32,
    pub image_backend: ImageBackend,
    pub ocr_language: String,
    pub pdf_ocr_fallback: bool,
    pub pdftotext_path: String,
    pub ocrmypdf_path: String,
    pub extraction_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let scoring_metrics = match optional_var("SCORING_METRICS") {
            Some(list) => parse_metric_list(&list).context("Invalid SCORING_METRICS")?,
            None => MetricKind::ALL.to_vec(),
        };
        let scoring_weights = optional_var("SCORING_WEIGHTS")
            .map(|list| parse_weight_list(&list))
            .transpose()
            .context("Invalid SCORING_WEIGHTS")?;

        let config = Config {
            embedding_backend: parse_var("EMBEDDING_BACKEND", EmbeddingBackend::Hashing)?,
            embedding_api_url: optional_var("EMBEDDING_API_URL"),
            embedding_api_key: optional_var("EMBEDDING_API_KEY"),
            embedding_model: optional_var("EMBEDDING_MODEL").unwrap_or_else(|| "all-MiniLM-L6-v2".to_string()),
            embedding_dimensions: parse_var("EMBEDDING_DIMENSIONS", 256)?,
            embedding_timeout_seconds: parse_var("EMBEDDING_TIMEOUT_SECONDS", 10)?,
            embedding_cache_capacity: parse_var("EMBEDDING_CACHE_CAPACITY", 1024)?,
            embedding_failure_threshold: parse_var("EMBEDDING_FAILURE_THRESHOLD", 5)?,
            embedding_recovery_seconds: parse_var("EMBEDDING_RECOVERY_SECONDS", 60)?,

            scoring_metrics,
            scoring_weights,
            bleu_max_order: parse_var("BLEU_MAX_ORDER", 4)?,
            bleu_smoothing_epsilon: optional_var("BLEU_SMOOTHING_EPSILON")
                .map(|value| parse_value::<f64>("BLEU_SMOOTHING_EPSILON", &value))
                .transpose()?,
            rouge_use_stemmer: parse_bool_var("ROUGE_USE_STEMMER", true)?,
            drop_illegible_markers: parse_bool_var("DROP_ILLEGIBLE_MARKERS", true)?,
            batch_concurrency: parse_var("BATCH_CONCURRENCY", 4)?,

            vision_api_url: optional_var("VISION_API_URL"),
            vision_api_key: optional_var("VISION_API_KEY"),
            vision_model: optional_var("VISION_MODEL")
                .unwrap_or_else(|| "llama-3.2-90b-vision-preview".to_string()),
            vision_prompt: parse_var("VISION_PROMPT", PromptProfile::Handwritten)?,
            vision_temperature: parse_var("VISION_TEMPERATURE", 0.3)?,
            vision_max_tokens: parse_var("VISION_MAX_TOKENS", 2048)?,
            vision_top_p: parse_var("VISION_TOP_P", 0.9)?,
            image_backend: parse_var("IMAGE_BACKEND", ImageBackend::Vision)?,
            ocr_language: optional_var("OCR_LANGUAGE").unwrap_or_else(|| "eng".to_string()),
            pdf_ocr_fallback: parse_bool_var("PDF_OCR_FALLBACK", true)?,
            pdftotext_path: optional_var("PDFTOTEXT_PATH").unwrap_or_else(|| "pdftotext".to_string()),
            ocrmypdf_path: optional_var("OCRMYPDF_PATH").unwrap_or_else(|| "ocrmypdf".to_string()),
            extraction_timeout_seconds: parse_var("EXTRACTION_TIMEOUT_SECONDS", 120)?,
        };

        config.validate()?;

        info!(
            "Loaded configuration: {} metric(s), embedding backend {:?}, image backend {:?}",
            config.scoring_metrics.len(),
            config.embedding_backend,
            config.image_backend
        );

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.embedding_dimensions == 0 {
            return Err(anyhow!("EMBEDDING_DIMENSIONS must be at least 1"));
        }
        if self.bleu_max_order == 0 {
            return Err(anyhow!("BLEU_MAX_ORDER must be at least 1"));
        }
        if self.batch_concurrency == 0 {
            return Err(anyhow!("BATCH_CONCURRENCY must be at least 1"));
        }
        if self.embedding_backend == EmbeddingBackend::Http && self.embedding_api_url.is_none() {
            return Err(anyhow!("EMBEDDING_API_URL is required when EMBEDDING_BACKEND=http"));
        }
        if let Some(epsilon) = self.bleu_smoothing_epsilon {
            if !(epsilon > 0.0 && epsilon.is_finite()) {
                return Err(anyhow!("BLEU_SMOOTHING_EPSILON must be a positive number, got {}", epsilon));
            }
        }
        if self.scoring_metrics.is_empty() {
            return Err(anyhow!("SCORING_METRICS must name at least one metric"));
        }
        Ok(())
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        let smoothing = match self.bleu_smoothing_epsilon {
            Some(epsilon) => BleuSmoothing::Epsilon(epsilon),
            None => BleuSmoothing::None,
        };
        let weighting = match &self.scoring_weights {
            Some(weights) => WeightingPolicy::Weighted(weights.clone()),
            None => WeightingPolicy::Equal,
        };

        AggregatorConfig {
            metrics: self.scoring_metrics.clone(),
            normalizer: NormalizerConfig {
                drop_illegible_markers: self.drop_illegible_markers,
            },
            bleu: BleuConfig {
                max_order: self.bleu_max_order,
                smoothing,
            },
            rouge_stemming: self.rouge_use_stemmer,
            semantic_timeout: Duration::from_secs(self.embedding_timeout_seconds),
            weighting,
            batch_concurrency: self.batch_concurrency,
        }
    }

    /// Builds the configured provider stack: backend, then circuit breaker, then cache
    pub fn build_embedding_provider(&self) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
        let base: Arc<dyn EmbeddingProvider> = match self.embedding_backend {
            EmbeddingBackend::None => {
                if self.scoring_metrics.contains(&MetricKind::Semantic) {
                    warn!("EMBEDDING_BACKEND=none: the semantic metric will be reported unavailable");
                }
                return Ok(None);
            }
            EmbeddingBackend::Hashing => Arc::new(HashingEmbeddingProvider::new(self.embedding_dimensions)?),
            EmbeddingBackend::Http => {
                let provider = HttpEmbeddingProvider::new(HttpEmbeddingConfig {
                    base_url: self.embedding_api_url.clone().unwrap_or_default(),
                    api_key: self.embedding_api_key.clone(),
                    model: self.embedding_model.clone(),
                    timeout: Duration::from_secs(self.embedding_timeout_seconds),
                    dimensions: None,
                })?;

                let provider: Arc<dyn EmbeddingProvider> = Arc::new(provider);
                if self.embedding_failure_threshold > 0 {
                    Arc::new(CircuitBreakingProvider::new(
                        provider,
                        CircuitBreakerConfig {
                            failure_threshold: self.embedding_failure_threshold,
                            recovery_timeout: Duration::from_secs(self.embedding_recovery_seconds),
                        },
                    ))
                } else {
                    provider
                }
            }
        };

        if self.embedding_cache_capacity > 0 {
            Ok(Some(Arc::new(CachedEmbeddingProvider::new(base, self.embedding_cache_capacity))))
        } else {
            Ok(Some(base))
        }
    }

    pub fn extractor_config(&self) -> DocumentExtractorConfig {
        let timeout = Duration::from_secs(self.extraction_timeout_seconds);
        let vision = self.vision_api_url.as_ref().map(|api_url| VisionConfig {
            api_url: api_url.clone(),
            api_key: self.vision_api_key.clone(),
            model: self.vision_model.clone(),
            prompt: self.vision_prompt,
            temperature: self.vision_temperature,
            max_tokens: self.vision_max_tokens,
            top_p: self.vision_top_p,
            timeout,
        });

        DocumentExtractorConfig {
            image_backend: self.image_backend,
            vision,
            ocr_language: self.ocr_language.clone(),
            pdf_ocr_fallback: self.pdf_ocr_fallback,
            pdftotext_command: self.pdftotext_path.clone(),
            ocrmypdf_command: self.ocrmypdf_path.clone(),
            timeout,
        }
    }
}

/// A set, non-blank environment variable
fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_value<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow!("Invalid {} value '{}': {}", name, value, e))
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match optional_var(name) {
        Some(value) => parse_value(name, &value),
        None => Ok(default),
    }
}

fn parse_bool_var(name: &str, default: bool) -> Result<bool> {
    match optional_var(name) {
        None => Ok(default),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(anyhow!("Invalid {} value '{}': expected true or false", name, value)),
        },
    }
}

/// Parses `jaccard,bleu,rougeL`
pub fn parse_metric_list(list: &str) -> Result<Vec<MetricKind>> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| name.parse::<MetricKind>().map_err(|e| anyhow!(e)))
        .collect()
}

/// Parses `semantic=0.5,rougeL=0.3,bleu=0.2`
pub fn parse_weight_list(list: &str) -> Result<HashMap<MetricKind, f64>> {
    let mut weights = HashMap::new();
    for entry in list.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let (name, weight) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("expected name=weight, got '{}'", entry))?;
        let kind = name.parse::<MetricKind>().map_err(|e| anyhow!(e))?;
        let weight = weight
            .trim()
            .parse::<f64>()
            .with_context(|| format!("weight for {} is not a number", kind))?;
        if !(weight >= 0.0 && weight.is_finite()) {
            return Err(anyhow!("weight for {} must be a non-negative number, got {}", kind, weight));
        }
        weights.insert(kind, weight);
    }
    Ok(weights)
}
