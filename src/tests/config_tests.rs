use crate::config::{Config, EmbeddingBackend};
use crate::extraction::{ImageBackend, PromptProfile};
use crate::scoring::ngram::BleuSmoothing;
use crate::scoring::{MetricKind, WeightingPolicy};
use std::env;
use std::sync::Mutex;

// Tests in this module mutate the process environment
static ENV_LOCK: Mutex<()> = Mutex::new(());

const CONFIG_VARS: &[&str] = &[
    "EMBEDDING_BACKEND",
    "EMBEDDING_API_URL",
    "EMBEDDING_API_KEY",
    "EMBEDDING_MODEL",
    "EMBEDDING_DIMENSIONS",
    "EMBEDDING_TIMEOUT_SECONDS",
    "EMBEDDING_CACHE_CAPACITY",
    "EMBEDDING_FAILURE_THRESHOLD",
    "EMBEDDING_RECOVERY_SECONDS",
    "SCORING_METRICS",
    "SCORING_WEIGHTS",
    "BLEU_MAX_ORDER",
    "BLEU_SMOOTHING_EPSILON",
    "ROUGE_USE_STEMMER",
    "DROP_ILLEGIBLE_MARKERS",
    "BATCH_CONCURRENCY",
    "VISION_API_URL",
    "VISION_API_KEY",
    "VISION_MODEL",
    "VISION_PROMPT",
    "VISION_TEMPERATURE",
    "VISION_MAX_TOKENS",
    "VISION_TOP_P",
    "IMAGE_BACKEND",
    "OCR_LANGUAGE",
    "PDF_OCR_FALLBACK",
    "PDFTOTEXT_PATH",
    "OCRMYPDF_PATH",
    "EXTRACTION_TIMEOUT_SECONDS",
];

// Helper function to clear every variable the config reads
fn clear_config_env_vars() {
    for name in CONFIG_VARS {
        env::remove_var(name);
    }
}

fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    let guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    clear_config_env_vars();
    guard
}

#[test]
fn test_all_defaults_used() {
    let _guard = lock_env();

    let config = Config::from_env().expect("Config should load successfully");

    assert_eq!(config.embedding_backend, EmbeddingBackend::Hashing);
    assert_eq!(config.embedding_dimensions, 256);
    assert_eq!(config.embedding_timeout_seconds, 10);
    assert_eq!(config.embedding_cache_capacity, 1024);
    assert_eq!(config.embedding_failure_threshold, 5);
    assert_eq!(config.scoring_metrics, MetricKind::ALL.to_vec());
    assert!(config.scoring_weights.is_none());
    assert_eq!(config.bleu_max_order, 4);
    assert!(config.bleu_smoothing_epsilon.is_none());
    assert!(config.rouge_use_stemmer);
    assert!(config.drop_illegible_markers);
    assert_eq!(config.batch_concurrency, 4);
    assert_eq!(config.vision_model, "llama-3.2-90b-vision-preview");
    assert_eq!(config.vision_prompt, PromptProfile::Handwritten);
    assert!((config.vision_temperature - 0.3).abs() < 1e-6);
    assert_eq!(config.vision_max_tokens, 2048);
    assert!((config.vision_top_p - 0.9).abs() < 1e-6);
    assert_eq!(config.image_backend, ImageBackend::Vision);
    assert_eq!(config.ocr_language, "eng");
    assert!(config.pdf_ocr_fallback);
    assert_eq!(config.pdftotext_path, "pdftotext");
    assert_eq!(config.ocrmypdf_path, "ocrmypdf");
    assert_eq!(config.extraction_timeout_seconds, 120);
}

#[test]
fn test_scoring_overrides_flow_into_aggregator_config() {
    let _guard = lock_env();

    env::set_var("SCORING_METRICS", "jaccard, rougeL, semantic");
    env::set_var("SCORING_WEIGHTS", "semantic=0.5,rougeL=0.3,jaccard=0.2");
    env::set_var("BLEU_SMOOTHING_EPSILON", "0.1");
    env::set_var("DROP_ILLEGIBLE_MARKERS", "false");

    let config = Config::from_env().expect("Config should load successfully");
    let aggregator = config.aggregator_config();

    assert_eq!(
        aggregator.metrics,
        vec![MetricKind::Jaccard, MetricKind::RougeL, MetricKind::Semantic]
    );
    assert!(!aggregator.normalizer.drop_illegible_markers);
    assert_eq!(aggregator.bleu.smoothing, BleuSmoothing::Epsilon(0.1));
    match aggregator.weighting {
        WeightingPolicy::Weighted(weights) => assert_eq!(weights[&MetricKind::Semantic], 0.5),
        other => panic!("expected weighted policy, got {:?}", other),
    }

    clear_config_env_vars();
}

#[test]
fn test_invalid_number_names_the_variable() {
    let _guard = lock_env();

    env::set_var("BATCH_CONCURRENCY", "many");
    let error = Config::from_env().unwrap_err();
    assert!(error.to_string().contains("BATCH_CONCURRENCY"), "{}", error);

    clear_config_env_vars();
}

#[test]
fn test_unknown_metric_is_rejected() {
    let _guard = lock_env();

    env::set_var("SCORING_METRICS", "jaccard,meteor");
    let error = Config::from_env().unwrap_err();
    assert!(format!("{:#}", error).contains("meteor"));

    clear_config_env_vars();
}

#[test]
fn test_http_backend_requires_url() {
    let _guard = lock_env();

    env::set_var("EMBEDDING_BACKEND", "http");
    assert!(Config::from_env().is_err());

    env::set_var("EMBEDDING_API_URL", "http://localhost:8080/v1");
    let config = Config::from_env().expect("Config should load with a URL");
    assert_eq!(config.embedding_backend, EmbeddingBackend::Http);
    assert!(config.build_embedding_provider().unwrap().is_some());

    clear_config_env_vars();
}

#[test]
fn test_none_backend_builds_no_provider() {
    let _guard = lock_env();

    env::set_var("EMBEDDING_BACKEND", "none");
    let config = Config::from_env().expect("Config should load successfully");
    assert!(config.build_embedding_provider().unwrap().is_none());

    clear_config_env_vars();
}

#[test]
fn test_zero_values_are_rejected() {
    let _guard = lock_env();

    env::set_var("BLEU_MAX_ORDER", "0");
    assert!(Config::from_env().is_err());
    env::remove_var("BLEU_MAX_ORDER");

    env::set_var("EMBEDDING_DIMENSIONS", "0");
    assert!(Config::from_env().is_err());

    clear_config_env_vars();
}

#[test]
fn test_vision_config_only_with_url() {
    let _guard = lock_env();

    let config = Config::from_env().expect("Config should load successfully");
    assert!(config.extractor_config().vision.is_none());

    env::set_var("VISION_API_URL", "https://api.groq.com/openai/v1");
    env::set_var("VISION_PROMPT", "printed");
    env::set_var("IMAGE_BACKEND", "tesseract");
    let config = Config::from_env().expect("Config should load successfully");
    let extractor = config.extractor_config();
    let vision = extractor.vision.expect("vision config");
    assert_eq!(vision.prompt, PromptProfile::Printed);
    assert_eq!(extractor.image_backend, ImageBackend::Tesseract);

    clear_config_env_vars();
}

#[test]
fn test_rouge_stemming_toggle() {
    let _guard = lock_env();

    let config = Config::from_env().expect("Config should load successfully");
    assert!(config.aggregator_config().rouge_stemming);

    env::set_var("ROUGE_USE_STEMMER", "off");
    let config = Config::from_env().expect("Config should load successfully");
    assert!(!config.aggregator_config().rouge_stemming);

    env::set_var("ROUGE_USE_STEMMER", "sometimes");
    let error = Config::from_env().unwrap_err();
    assert!(error.to_string().contains("ROUGE_USE_STEMMER"), "{}", error);

    clear_config_env_vars();
}

#[test]
fn test_pdf_tool_settings_flow_into_extractor_config() {
    let _guard = lock_env();

    env::set_var("PDF_OCR_FALLBACK", "false");
    env::set_var("PDFTOTEXT_PATH", "/opt/poppler/bin/pdftotext");
    env::set_var("OCRMYPDF_PATH", "/usr/local/bin/ocrmypdf");
    let config = Config::from_env().expect("Config should load successfully");
    let extractor = config.extractor_config();

    assert!(!extractor.pdf_ocr_fallback);
    assert_eq!(extractor.pdftotext_command, "/opt/poppler/bin/pdftotext");
    assert_eq!(extractor.ocrmypdf_command, "/usr/local/bin/ocrmypdf");

    clear_config_env_vars();
}
