use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::docx::extract_docx_text;
use super::vision::{VisionConfig, VisionExtractor};
use super::{SourceKind, TextExtractionProvider};
use crate::error::ProviderError;

#[cfg(feature = "ocr")]
use tesseract::Tesseract;

/// How page images are turned into text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageBackend {
    /// Vision-capable chat-completions endpoint
    #[default]
    Vision,
    /// Local Tesseract, available when built with the `ocr` feature
    Tesseract,
}

impl FromStr for ImageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vision" => Ok(ImageBackend::Vision),
            "tesseract" => Ok(ImageBackend::Tesseract),
            other => Err(format!("unknown image backend '{}' (expected vision or tesseract)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentExtractorConfig {
    pub image_backend: ImageBackend,
    /// Required for images when `image_backend` is `Vision`
    pub vision: Option<VisionConfig>,
    /// Tesseract language code, e.g. `eng`
    pub ocr_language: String,
    pub timeout: Duration,
    /// OCR scanned PDFs with `ocrmypdf --sidecar` when they have no text layer
    pub pdf_ocr_fallback: bool,
    pub pdftotext_command: String,
    pub ocrmypdf_command: String,
}

impl Default for DocumentExtractorConfig {
    fn default() -> Self {
        Self {
            image_backend: ImageBackend::Vision,
            vision: None,
            ocr_language: "eng".to_string(),
            timeout: Duration::from_secs(120),
            pdf_ocr_fallback: true,
            pdftotext_command: "pdftotext".to_string(),
            ocrmypdf_command: "ocrmypdf".to_string(),
        }
    }
}

/// Routes each source to the matching extraction method by file extension
pub struct DocumentExtractor {
    config: DocumentExtractorConfig,
    vision: Option<VisionExtractor>,
}

impl DocumentExtractor {
    pub fn new(config: DocumentExtractorConfig) -> Result<Self, ProviderError> {
        let vision = match (&config.image_backend, &config.vision) {
            (ImageBackend::Vision, Some(vision_config)) => Some(VisionExtractor::new(vision_config.clone())?),
            _ => None,
        };
        Ok(Self { config, vision })
    }

    async fn extract_by_kind(&self, path: &Path, kind: SourceKind) -> Result<String, ProviderError> {
        match kind {
            SourceKind::PlainText => read_plain_text(path).await,
            SourceKind::Docx => extract_docx_text(path).await,
            SourceKind::Pdf => self.extract_pdf_text(path).await,
            SourceKind::Image => self.extract_image(path).await,
        }
    }

    async fn extract_image(&self, path: &Path) -> Result<String, ProviderError> {
        match self.config.image_backend {
            ImageBackend::Vision => match &self.vision {
                Some(vision) => vision.extract_image(path).await,
                None => Err(ProviderError::not_configured(
                    "vision",
                    "VISION_API_URL is not set; configure it or use IMAGE_BACKEND=tesseract",
                )),
            },
            ImageBackend::Tesseract => self.extract_with_tesseract(path).await,
        }
    }

    /// Text layer via `pdftotext -layout`, falling back to `ocrmypdf` for scans
    async fn extract_pdf_text(&self, path: &Path) -> Result<String, ProviderError> {
        let source_name = path.display().to_string();

        let layer_failure = match self.read_pdf_text_layer(path).await? {
            Ok(text) => {
                info!("Extracted {} chars from PDF text layer of {}", text.len(), source_name);
                return Ok(text);
            }
            Err(reason) => reason,
        };

        if !self.config.pdf_ocr_fallback {
            return Err(ProviderError::Unsupported {
                path: source_name,
                details: format!("{}; enable PDF_OCR_FALLBACK or extract its pages as images", layer_failure),
            });
        }

        info!("{} for {}, running {}", layer_failure, source_name, self.config.ocrmypdf_command);
        self.ocr_scanned_pdf(path).await.map_err(|ocr_failure| ProviderError::Unsupported {
            path: source_name,
            details: format!("{}; OCR fallback failed: {}", layer_failure, ocr_failure),
        })
    }

    /// Outer error: pdftotext could not run. Inner error: no usable text layer.
    async fn read_pdf_text_layer(&self, path: &Path) -> Result<Result<String, String>, ProviderError> {
        let output = tokio::process::Command::new(&self.config.pdftotext_command)
            .arg("-layout") // Preserve layout
            .arg(path)
            .arg("-")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ProviderError::not_configured(
                    "pdftotext",
                    format!(
                        "could not run {} ({}). On Ubuntu/Debian: 'apt-get install poppler-utils'. \
                        On macOS: 'brew install poppler'.",
                        self.config.pdftotext_command, e
                    ),
                )
            })?;

        if !output.status.success() {
            return Ok(Err(format!(
                "pdftotext failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.split_whitespace().next().is_none() {
            return Ok(Err("PDF has no text layer".to_string()));
        }
        Ok(Ok(text))
    }

    /// Runs `ocrmypdf --sidecar` and reads the recognized text back
    async fn ocr_scanned_pdf(&self, path: &Path) -> Result<String, String> {
        let sidecar = ScratchFile::new("txt");
        let ocr_output = ScratchFile::new("pdf");

        let output = tokio::process::Command::new(&self.config.ocrmypdf_command)
            .arg("--sidecar") // Extract text to sidecar file
            .arg(&sidecar.path)
            .arg("--skip-text")
            .arg("-l")
            .arg(&self.config.ocr_language)
            .arg(path)
            .arg(&ocr_output.path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                format!(
                    "could not run {} ({}). On Ubuntu/Debian: 'apt-get install ocrmypdf'. \
                    On macOS: 'brew install ocrmypdf'.",
                    self.config.ocrmypdf_command, e
                )
            })?;

        if !output.status.success() {
            return Err(format!(
                "{} exited with {}: {}",
                self.config.ocrmypdf_command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let text = tokio::fs::read_to_string(&sidecar.path)
            .await
            .map_err(|e| format!("could not read OCR sidecar: {}", e))?;
        let text = text.trim().to_string();
        if text.split_whitespace().next().is_none() {
            return Err("OCR recognized no text".to_string());
        }

        info!("Recognized {} chars in scanned PDF {}", text.len(), path.display());
        Ok(text)
    }

    #[cfg(feature = "ocr")]
    async fn extract_with_tesseract(&self, path: &Path) -> Result<String, ProviderError> {
        let source_name = path.display().to_string();
        let language = self.config.ocr_language.clone();
        let image_path = source_name.clone();

        let text = tokio::task::spawn_blocking(move || -> Result<String, String> {
            let mut tesseract = Tesseract::new(None, Some(&language))
                .map_err(|e| format!("failed to initialize tesseract: {}", e))?
                .set_image(&image_path)
                .map_err(|e| format!("failed to load image: {}", e))?;
            tesseract
                .get_text()
                .map_err(|e| format!("failed to extract text: {}", e))
        })
        .await
        .map_err(|e| ProviderError::request("tesseract", e))?
        .map_err(|details| ProviderError::invalid_response("tesseract", details))?;

        Ok(text.trim().to_string())
    }

    #[cfg(not(feature = "ocr"))]
    async fn extract_with_tesseract(&self, _path: &Path) -> Result<String, ProviderError> {
        Err(ProviderError::not_configured(
            "tesseract",
            "this build does not include the `ocr` feature",
        ))
    }
}

#[async_trait]
impl TextExtractionProvider for DocumentExtractor {
    async fn extract(&self, path: &Path) -> Result<String, ProviderError> {
        let kind = SourceKind::from_path(path).ok_or_else(|| ProviderError::Unsupported {
            path: path.display().to_string(),
            details: "expected an image, PDF, DOCX or plain-text file".to_string(),
        })?;

        debug!("Extracting {} as {:?}", path.display(), kind);

        match tokio::time::timeout(self.config.timeout, self.extract_by_kind(path, kind)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: format!("{:?} extraction of {}", kind, path.display()),
                after: self.config.timeout,
            }),
        }
    }

    fn name(&self) -> &str {
        "document-extractor"
    }
}

async fn read_plain_text(path: &Path) -> Result<String, ProviderError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ProviderError::io(path.display().to_string(), e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Temporary file path removed on drop
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn new(extension: &str) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "answer_grader_{}_{}.{}",
            std::process::id(),
            id,
            extension
        ));
        Self { path }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
