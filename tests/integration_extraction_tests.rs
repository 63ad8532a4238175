use anyhow::Result;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use answer_grader::extraction::{
    combine_extractions, extract_all, DocumentExtractor, DocumentExtractorConfig, ImageBackend, PromptProfile,
    TextExtractionProvider, VisionConfig,
};
use answer_grader::test_helpers::create_test_aggregator;
use answer_grader::MetricKind;

/// Answer sheets written to a temporary directory
struct AnswerSheets {
    temp_dir: TempDir,
}

impl AnswerSheets {
    fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    fn path(&self, filename: &str) -> PathBuf {
        self.temp_dir.path().join(filename)
    }

    fn create_text(&self, filename: &str, content: &str) -> Result<PathBuf> {
        let file_path = self.path(filename);
        fs::write(&file_path, content)?;
        Ok(file_path)
    }

    /// Minimal DOCX: one `w:p` per paragraph inside `word/document.xml`
    fn create_docx(&self, filename: &str, paragraphs: &[&str]) -> Result<PathBuf> {
        let file_path = self.path(filename);
        let file = fs::File::create(&file_path)?;
        let mut zip = zip::ZipWriter::new(file);

        zip.start_file("[Content_Types].xml", zip::write::SimpleFileOptions::default())?;
        zip.write_all(br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
    <Default Extension="xml" ContentType="application/xml"/>
</Types>"#)?;

        let body: String = paragraphs
            .iter()
            .map(|text| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", text))
            .collect();
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())?;
        zip.write_all(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
                body
            )
            .as_bytes(),
        )?;
        zip.finish()?;
        Ok(file_path)
    }

    /// Bytes only need to exist; the vision endpoint is mocked
    fn create_image(&self, filename: &str) -> Result<PathBuf> {
        let file_path = self.path(filename);
        fs::write(&file_path, [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])?;
        Ok(file_path)
    }
}

fn local_extractor() -> DocumentExtractor {
    DocumentExtractor::new(DocumentExtractorConfig {
        image_backend: ImageBackend::Vision,
        vision: None,
        ocr_language: "eng".to_string(),
        timeout: Duration::from_secs(10),
        ..DocumentExtractorConfig::default()
    })
    .expect("extractor without vision should build")
}

fn vision_extractor(server: &MockServer) -> DocumentExtractor {
    DocumentExtractor::new(DocumentExtractorConfig {
        image_backend: ImageBackend::Vision,
        vision: Some(VisionConfig {
            api_url: format!("{}/openai/v1", server.uri()),
            api_key: Some("vision-key".to_string()),
            model: "llama-3.2-90b-vision-preview".to_string(),
            prompt: PromptProfile::Handwritten,
            temperature: 0.3,
            max_tokens: 2048,
            top_p: 0.9,
            timeout: Duration::from_secs(5),
        }),
        ocr_language: "eng".to_string(),
        timeout: Duration::from_secs(10),
        ..DocumentExtractorConfig::default()
    })
    .expect("extractor with vision should build")
}

#[tokio::test]
async fn test_plain_text_and_docx_extraction() -> Result<()> {
    let sheets = AnswerSheets::new()?;
    let text_path = sheets.create_text("answer.txt", "Plants make food by photosynthesis.\n")?;
    let docx_path = sheets.create_docx("scheme.docx", &["Photosynthesis makes glucose.", "", "Light is required."])?;

    let extractor = local_extractor();

    let text = extractor.extract(&text_path).await?;
    assert_eq!(text, "Plants make food by photosynthesis.\n");

    let docx = extractor.extract(&docx_path).await?;
    assert_eq!(docx, "Photosynthesis makes glucose.\nLight is required.");
    Ok(())
}

#[tokio::test]
async fn test_unsupported_extension_is_rejected() -> Result<()> {
    let sheets = AnswerSheets::new()?;
    let path = sheets.create_text("answers.xlsx", "not really a spreadsheet")?;

    let error = local_extractor().extract(&path).await.unwrap_err();
    assert!(error.to_string().contains("unsupported source"), "{}", error);
    Ok(())
}

#[tokio::test]
async fn test_image_without_vision_config_is_not_configured() -> Result<()> {
    let sheets = AnswerSheets::new()?;
    let image = sheets.create_image("page1.png")?;

    let error = local_extractor().extract(&image).await.unwrap_err();
    assert!(error.to_string().contains("VISION_API_URL"), "{}", error);
    Ok(())
}

#[tokio::test]
async fn test_vision_transcribes_page_images() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .and(header("authorization", "Bearer vision-key"))
        .and(body_partial_json(json!({
            "model": "llama-3.2-90b-vision-preview",
            "max_tokens": 2048,
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "  Mitochondria make ATP. [unclear]  "}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sheets = AnswerSheets::new()?;
    let image = sheets.create_image("page1.png")?;

    let text = vision_extractor(&server).extract(&image).await?;
    assert_eq!(text, "Mitochondria make ATP. [unclear]");

    let request = &server.received_requests().await.expect("recording enabled")[0];
    let body: serde_json::Value = serde_json::from_slice(&request.body)?;
    let image_url = body["messages"][0]["content"][1]["image_url"]["url"]
        .as_str()
        .expect("image url");
    assert!(image_url.starts_with("data:image/png;base64,"));
    Ok(())
}

#[tokio::test]
async fn test_vision_error_status_is_reported() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let sheets = AnswerSheets::new()?;
    let image = sheets.create_image("page1.jpg")?;

    let error = vision_extractor(&server).extract(&image).await.unwrap_err();
    assert!(error.to_string().contains("429"), "{}", error);
    Ok(())
}

#[tokio::test]
async fn test_extract_all_isolates_failures_and_keeps_order() -> Result<()> {
    let sheets = AnswerSheets::new()?;
    let first = sheets.create_text("page1.txt", "Osmosis is the movement of water")?;
    let missing = sheets.path("page2.txt");
    let third = sheets.create_text("page3.txt", "across a semi-permeable membrane.")?;
    let paths = vec![first.clone(), missing.clone(), third.clone()];

    let extractions = extract_all(&local_extractor(), &paths, 2).await;

    assert_eq!(extractions.len(), 3);
    assert_eq!(extractions[0].path, first);
    assert!(extractions[0].is_ok());
    assert!(!extractions[1].is_ok());
    assert_eq!(extractions[2].path, third);
    assert!(extractions[2].is_ok());

    let combined = combine_extractions(&extractions);
    let lines: Vec<&str> = combined.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "Osmosis is the movement of water");
    assert!(lines[1].starts_with(&format!("[Error processing {}:", missing.display())));
    assert_eq!(lines[2], "across a semi-permeable membrane.");
    Ok(())
}

#[tokio::test]
async fn test_extracted_pages_can_be_graded() -> Result<()> {
    let sheets = AnswerSheets::new()?;
    let scheme = sheets.create_docx("scheme.docx", &["Osmosis is the movement of water across a membrane."])?;
    let page = sheets.create_text("page1.txt", "osmosis is the movement of WATER across a membrane")?;

    let extractor = local_extractor();
    let reference = extractor.extract(&scheme).await?;
    let candidate = combine_extractions(&extract_all(&extractor, &[page], 1).await);

    let report = create_test_aggregator().aggregate(&reference, &candidate).await?;
    assert!((report.headline(MetricKind::Jaccard).unwrap() - 1.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_prompt_profiles_mark_illegible_text() {
    for profile in [PromptProfile::Handwritten, PromptProfile::Printed] {
        assert!(profile.text().contains("[unclear]"));
    }
}
