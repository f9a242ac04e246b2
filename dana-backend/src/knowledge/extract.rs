//! Plain-text extraction for uploaded knowledge files

use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};

/// Upload extensions the knowledge base accepts
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt", "md", "csv", "json"];

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Unsupported file type '.{0}'")]
    Unsupported(String),
    #[error("Could not read PDF: {0}")]
    Pdf(String),
    #[error("Could not read DOCX: {0}")]
    Docx(String),
    #[error("Extracted text exceeds the {0} byte limit")]
    TooLarge(usize),
}

/// Lowercased extension of an uploaded filename, if it is one we accept
pub fn allowed_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Ceiling on extracted text for a given upload limit; compressed formats may expand
pub fn text_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes.saturating_mul(4)
}

pub fn extract_text(extension: &str, bytes: &[u8], limit: usize) -> Result<String, ExtractError> {
    match extension {
        "pdf" => extract_pdf(bytes, limit),
        "docx" => extract_docx(bytes, limit),
        "txt" | "md" | "csv" | "json" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other => Err(ExtractError::Unsupported(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8], limit: usize) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed documents
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) if text.len() > limit => Err(ExtractError::TooLarge(limit)),
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("malformed document".to_string())),
    }
}

/// Text runs of `word/document.xml`, one line per paragraph
fn extract_docx(bytes: &[u8], limit: usize) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Docx(e.to_string()))?;

    // Stop inflating one byte past the limit
    let mut raw = Vec::new();
    entry
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut raw)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if raw.len() > limit {
        return Err(ExtractError::TooLarge(limit));
    }
    let xml = String::from_utf8(raw).map_err(|e| ExtractError::Docx(e.to_string()))?;

    let mut reader = Reader::from_str(&xml);
    let mut text = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Text(t)) => {
                let run = t.unescape().map_err(|e| ExtractError::Docx(e.to_string()))?;
                text.push_str(&run);
            }
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" => text.push('\n'),
                _ => {}
            },
            Ok(Event::End(e)) if e.name().as_ref() == b"w:p" => text.push('\n'),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
        }
        if text.len() > limit {
            return Err(ExtractError::TooLarge(limit));
        }
    }

    Ok(text.trim_end().to_string())
}
