//! Turning answer sheets and marking schemes into plain text.
//!
//! Scoring never touches files; everything it sees arrives through a
//! [`TextExtractionProvider`]. Illegible spans are expected to come back as
//! `[unclear]` so the normalizer can drop them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ProviderError;

pub mod docx;
pub mod document;
pub mod prompts;
pub mod vision;

pub use document::{DocumentExtractor, DocumentExtractorConfig, ImageBackend};
pub use prompts::PromptProfile;
pub use vision::{VisionConfig, VisionExtractor};

/// Source formats the extractor can route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Image,
    Pdf,
    Docx,
    PlainText,
}

impl SourceKind {
    /// Classify by file extension (case-insensitive); `None` for anything unsupported
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" | "gif" | "webp" => Some(SourceKind::Image),
            "pdf" => Some(SourceKind::Pdf),
            "docx" => Some(SourceKind::Docx),
            "txt" | "md" => Some(SourceKind::PlainText),
            _ => None,
        }
    }

    /// MIME type used when an image is inlined as a data URL
    pub fn image_mime_type(path: &Path) -> &'static str {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "bmp" => "image/bmp",
            "tif" | "tiff" => "image/tiff",
            _ => "image/jpeg",
        }
    }
}

#[async_trait]
pub trait TextExtractionProvider: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<String, ProviderError>;

    fn name(&self) -> &str;
}

/// Outcome of extracting one source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceExtraction {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceExtraction {
    pub fn succeeded(path: PathBuf, text: String) -> Self {
        Self {
            path,
            text: Some(text),
            error: None,
        }
    }

    pub fn failed(path: PathBuf, error: &ProviderError) -> Self {
        Self {
            path,
            text: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.text.is_some()
    }
}

/// Extracts every source with at most `concurrency` in flight.
///
/// Results keep the order of `paths` and a failing source never affects its
/// siblings.
pub async fn extract_all(
    provider: &dyn TextExtractionProvider,
    paths: &[PathBuf],
    concurrency: usize,
) -> Vec<SourceExtraction> {
    info!("Extracting {} source(s) with {}", paths.len(), provider.name());

    let results: Vec<SourceExtraction> = stream::iter(paths)
        .map(|path| async move {
            match provider.extract(path).await {
                Ok(text) => SourceExtraction::succeeded(path.clone(), text),
                Err(error) => {
                    warn!("Failed to extract {}: {}", path.display(), error);
                    SourceExtraction::failed(path.clone(), &error)
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let failures = results.iter().filter(|result| !result.is_ok()).count();
    info!(
        "Extraction finished: {} succeeded, {} failed",
        results.len() - failures,
        failures
    );
    results
}

/// Joins per-source texts with newlines; failed sources are rendered inline
/// as `[Error processing <path>: <reason>]` so page order is preserved.
pub fn combine_extractions(extractions: &[SourceExtraction]) -> String {
    extractions
        .iter()
        .map(|extraction| match (&extraction.text, &extraction.error) {
            (Some(text), _) => text.clone(),
            (None, Some(error)) => format!("[Error processing {}: {}]", extraction.path.display(), error),
            (None, None) => format!("[Error processing {}: no text produced]", extraction.path.display()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
