//! DOCX marking schemes: paragraphs of `word/document.xml`, one per line.

use std::io::Read;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{info, warn};
use zip::ZipArchive;

use crate::error::ProviderError;

const MAX_DOCX_SIZE: u64 = 50 * 1024 * 1024; // 50MB compressed
const MAX_XML_SIZE: u64 = 10 * 1024 * 1024; // 10MB for document.xml
const MAX_ZIP_ENTRIES: usize = 1000;
const MAX_ENTRY_NAME_LENGTH: usize = 255;
const XML_READ_BUFFER_SIZE: usize = 8192;

/// Extracts the text of a DOCX file, joining non-empty paragraphs with `\n`
pub async fn extract_docx_text(path: &Path) -> Result<String, ProviderError> {
    let source_name = path.display().to_string();

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| ProviderError::io(&source_name, e))?;
    if metadata.len() > MAX_DOCX_SIZE {
        return Err(ProviderError::Unsupported {
            path: source_name,
            details: format!(
                "DOCX is {:.1} MB, larger than the {:.0} MB limit",
                metadata.len() as f64 / (1024.0 * 1024.0),
                MAX_DOCX_SIZE as f64 / (1024.0 * 1024.0)
            ),
        });
    }

    info!("Starting DOCX text extraction: {}", source_name);

    // Zip inflation and XML parsing are CPU-bound
    let owned: PathBuf = path.to_path_buf();
    let paragraphs = tokio::task::spawn_blocking(move || read_paragraphs(&owned))
        .await
        .map_err(|e| corrupted(&source_name, format!("extraction task failed: {}", e)))??;

    let text = paragraphs
        .into_iter()
        .map(|paragraph| paragraph.trim().to_string())
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() {
        return Err(corrupted(&source_name, "document contains no text"));
    }

    info!("DOCX extraction completed: {} chars from '{}'", text.len(), source_name);
    Ok(text)
}

fn corrupted(path: &str, details: impl Into<String>) -> ProviderError {
    ProviderError::Unsupported {
        path: path.to_string(),
        details: format!("corrupted DOCX: {}", details.into()),
    }
}

fn read_paragraphs(path: &Path) -> Result<Vec<String>, ProviderError> {
    let source_name = path.display().to_string();

    let file = std::fs::File::open(path).map_err(|e| ProviderError::io(&source_name, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| corrupted(&source_name, e.to_string()))?;

    if archive.len() > MAX_ZIP_ENTRIES {
        return Err(corrupted(
            &source_name,
            format!(
                "archive contains {} entries (maximum {}); this may be a ZIP bomb",
                archive.len(),
                MAX_ZIP_ENTRIES
            ),
        ));
    }

    // Validate all entry names before processing to prevent directory traversal
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|e| corrupted(&source_name, e.to_string()))?;
        validate_zip_entry_name(entry.name()).map_err(|details| corrupted(&source_name, details))?;
    }

    let mut document_xml = archive
        .by_name("word/document.xml")
        .map_err(|_| corrupted(&source_name, "missing word/document.xml"))?;
    let xml_content =
        read_zip_entry_safely(&mut document_xml, MAX_XML_SIZE).map_err(|details| corrupted(&source_name, details))?;
    drop(document_xml);

    parse_paragraphs(&xml_content).map_err(|details| corrupted(&source_name, details))
}

/// Collects the `w:t` runs of every `w:p` paragraph
fn parse_paragraphs(xml_content: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml_content);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    config.expand_empty_elements = false;

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text_element = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == b"w:t" {
                    in_text_element = true;
                }
            }
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" | b"w:cr" => current.push(' '),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_element {
                    let text = e.unescape().map_err(|e| format!("text unescape error: {}", e))?;
                    current.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text_element = false,
                b"w:p" => paragraphs.push(std::mem::take(&mut current)),
                b"w:tc" => current.push('\t'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parsing error - {}", e)),
            _ => {}
        }
        buf.clear();
    }

    if !current.trim().is_empty() {
        paragraphs.push(current);
    }

    let nulls = paragraphs.iter().map(|p| p.matches('\0').count()).sum::<usize>();
    if nulls > 0 {
        warn!("Removed {} null bytes from extracted DOCX text", nulls);
        for paragraph in &mut paragraphs {
            paragraph.retain(|c| c != '\0');
        }
    }

    Ok(paragraphs)
}

/// Rejects entry names that could escape the archive
fn validate_zip_entry_name(entry_name: &str) -> Result<(), String> {
    if entry_name.len() > MAX_ENTRY_NAME_LENGTH {
        return Err(format!(
            "ZIP entry name too long ({}); maximum is {} characters",
            entry_name.len(),
            MAX_ENTRY_NAME_LENGTH
        ));
    }

    if entry_name.contains("..") {
        return Err(format!("ZIP entry contains directory traversal sequence '..': '{}'", entry_name));
    }

    if entry_name.starts_with('/') || entry_name.starts_with('\\') {
        return Err(format!("ZIP entry contains absolute path: '{}'", entry_name));
    }

    if entry_name.len() >= 2 && entry_name.chars().nth(1) == Some(':') {
        return Err(format!("ZIP entry contains Windows drive letter: '{}'", entry_name));
    }

    let suspicious_chars = ['<', '>', '|', '*', '?'];
    if entry_name.chars().any(|c| suspicious_chars.contains(&c)) {
        return Err(format!("ZIP entry contains suspicious characters: '{}'", entry_name));
    }

    Ok(())
}

/// Reads a ZIP entry in chunks, failing once `max_size` bytes are exceeded
fn read_zip_entry_safely<R: Read>(reader: &mut R, max_size: u64) -> Result<String, String> {
    let mut buffer = Vec::new();
    let mut total_read = 0u64;
    let mut temp_buf = [0u8; XML_READ_BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut temp_buf).map_err(|e| e.to_string())?;
        if bytes_read == 0 {
            break;
        }
        total_read += bytes_read as u64;
        if total_read > max_size {
            return Err(format!(
                "ZIP entry content exceeds maximum allowed size of {:.1} MB",
                max_size as f64 / (1024.0 * 1024.0)
            ));
        }
        buffer.extend_from_slice(&temp_buf[..bytes_read]);
    }

    Ok(match String::from_utf8(buffer) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}
