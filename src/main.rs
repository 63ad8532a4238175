//! Command-line front end for scoring student answers against a reference.
//!
//! Usage:
//!   answer-grader score --reference scheme.txt --candidate answer.txt
//!   answer-grader extract page1.png page2.png
//!   answer-grader grade --marking-scheme scheme.docx --answers page1.png page2.png
//!   answer-grader batch pairs.jsonl
//!
//! Reports are printed to stdout as JSON; logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use answer_grader::config::{parse_metric_list, parse_weight_list, Config};
use answer_grader::extraction::{combine_extractions, extract_all, DocumentExtractor, TextExtractionProvider};
use answer_grader::scoring::{ScoreAggregator, WeightingPolicy};

#[derive(Parser)]
#[command(name = "answer-grader")]
#[command(about = "Score free-text answers against a reference with multiple similarity metrics")]
struct Args {
    /// Comma-separated metrics to run (overrides SCORING_METRICS)
    #[arg(long, global = true)]
    metrics: Option<String>,

    /// Comma-separated name=weight pairs (overrides SCORING_WEIGHTS)
    #[arg(long, global = true)]
    weights: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score one candidate text file against one reference text file
    Score {
        #[arg(short, long)]
        reference: PathBuf,
        #[arg(short, long)]
        candidate: PathBuf,
    },
    /// Extract text from answer sheets or marking schemes
    Extract {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Extract a marking scheme and an answer sheet, then score them
    Grade {
        #[arg(short, long)]
        marking_scheme: PathBuf,
        #[arg(short, long, num_args = 1.., required = true)]
        answers: Vec<PathBuf>,
    },
    /// Score every {"reference", "candidate"} line of a JSONL file
    Batch { input: PathBuf },
}

#[derive(Deserialize)]
struct BatchLine {
    reference: String,
    candidate: String,
}

#[derive(Serialize)]
struct BatchError {
    line: usize,
    error: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs on stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("answer_grader=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    match args.command {
        Command::Score { reference, candidate } => {
            let aggregator = build_aggregator(&config)?;
            let reference_text = read_text(&reference).await?;
            let candidate_text = read_text(&candidate).await?;
            let report = aggregator.aggregate(&reference_text, &candidate_text).await?;
            print_json(&report)
        }
        Command::Extract { paths } => {
            let extractor = DocumentExtractor::new(config.extractor_config())?;
            let extractions = extract_all(&extractor, &paths, config.batch_concurrency).await;
            print_json(&json!({
                "sources": extractions,
                "combined": combine_extractions(&extractions),
            }))
        }
        Command::Grade { marking_scheme, answers } => {
            let extractor = DocumentExtractor::new(config.extractor_config())?;
            info!("Extracting marking scheme {}", marking_scheme.display());
            let reference_text = extractor
                .extract(&marking_scheme)
                .await
                .with_context(|| format!("Failed to extract marking scheme {}", marking_scheme.display()))?;

            let extractions = extract_all(&extractor, &answers, config.batch_concurrency).await;
            if extractions.iter().all(|extraction| !extraction.is_ok()) {
                return Err(anyhow!("No text could be extracted from any answer page"));
            }
            let candidate_text = combine_extractions(&extractions);

            let aggregator = build_aggregator(&config)?;
            let report = aggregator.aggregate(&reference_text, &candidate_text).await?;
            print_json(&json!({
                "marking_scheme": marking_scheme,
                "answers": extractions,
                "report": report,
            }))
        }
        Command::Batch { input } => {
            let aggregator = build_aggregator(&config)?;
            run_batch(&aggregator, &input).await
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(metrics) = &args.metrics {
        config.scoring_metrics = parse_metric_list(metrics).context("Invalid --metrics")?;
        if config.scoring_metrics.is_empty() {
            return Err(anyhow!("--metrics must name at least one metric"));
        }
    }
    if let Some(weights) = &args.weights {
        config.scoring_weights = Some(parse_weight_list(weights).context("Invalid --weights")?);
    }
    Ok(config)
}

fn build_aggregator(config: &Config) -> Result<ScoreAggregator> {
    let provider = config.build_embedding_provider()?;
    let aggregator_config = config.aggregator_config();
    if let WeightingPolicy::Weighted(weights) = &aggregator_config.weighting {
        for kind in weights.keys().filter(|kind| !aggregator_config.metrics.contains(kind)) {
            warn!("Weight given for {} but that metric is not enabled", kind);
        }
    }
    Ok(ScoreAggregator::new(aggregator_config, provider))
}

async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn run_batch(aggregator: &ScoreAggregator, input: &Path) -> Result<()> {
    let content = read_text(input).await?;

    let mut pairs = Vec::new();
    let mut line_numbers = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: BatchLine = serde_json::from_str(line)
            .with_context(|| format!("{}:{} is not a {{\"reference\", \"candidate\"}} object", input.display(), index + 1))?;
        pairs.push((parsed.reference, parsed.candidate));
        line_numbers.push(index + 1);
    }

    info!("Scoring {} pair(s) from {}", pairs.len(), input.display());
    let results = aggregator.aggregate_batch(&pairs).await;

    for (line, result) in line_numbers.into_iter().zip(results) {
        let rendered = match result {
            Ok(report) => serde_json::to_string(&report)?,
            Err(error) => serde_json::to_string(&BatchError {
                line,
                error: error.to_string(),
            })?,
        };
        println!("{}", rendered);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
