//! Attachment ingestion and question normalization
//!
//! Turns the wire-level upload payload into what the completion API accepts:
//! images become data-URL parts on the user message, PDFs are extracted to
//! text server-side, anything else is rejected before a paid model call.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// One uploaded file, borrowed from the request body.
#[derive(Debug, Clone, Copy)]
pub struct Attachment<'a> {
    pub name: &'a str,
    pub media_type: &'a str,
    /// Base64 payload, with or without a `data:` URL prefix
    pub data: &'a str,
}

/// Question text plus image parts, ready for the pipeline.
#[derive(Debug, Clone, Default)]
pub struct PreparedInput {
    pub text: String,
    pub image_urls: Vec<String>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported attachment type '{media_type}' for {name}")]
    UnsupportedType { name: String, media_type: String },

    #[error("attachment {name} is not valid base64")]
    InvalidEncoding { name: String },

    #[error("could not extract text from {name}: {reason}")]
    PdfExtraction { name: String, reason: String },
}

// ============================================================================
// Text normalization
// ============================================================================

/// Sloppy exponent form from uploads and OCR: `cos3(` meaning `cos^3(`
static BARE_TRIG_EXPONENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(cos|sin|tan|sec|csc|cot)\s*([0-9]+)\s*\(").unwrap());

/// Normalize common unicode artifacts before classification and prompting.
///
/// Strips U+2061 (invisible function application, pasted from rendered math)
/// and rewrites bare trig exponents to caret form.
pub fn normalize_math_text(s: &str) -> String {
    let without_invisible: String = s.chars().filter(|&c| c != '\u{2061}').collect();
    BARE_TRIG_EXPONENT
        .replace_all(&without_invisible, "${1}^${2}(")
        .into_owned()
}

// ============================================================================
// Attachment preparation
// ============================================================================

/// Resolve the effective MIME type: declared type first, filename sniff as
/// fallback when the client sent nothing useful.
fn resolve_media_type(declared: &str, name: &str) -> String {
    let declared = declared.trim().to_lowercase();
    if !declared.is_empty() && declared != "application/octet-stream" {
        return declared;
    }
    mime_guess::from_path(name)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or(declared)
}

/// Drop a `data:<mime>;base64,` prefix if present.
fn strip_data_url(data: &str) -> &str {
    match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    }
}

/// Validate and fold attachments into the question.
pub fn prepare(message: &str, files: &[Attachment<'_>]) -> Result<PreparedInput, IngestError> {
    let mut text = message.to_string();
    let mut image_urls = Vec::new();

    for file in files {
        let media_type = resolve_media_type(file.media_type, file.name);

        if media_type.starts_with("image/") {
            let url = if file.data.starts_with("data:") {
                file.data.to_string()
            } else {
                format!("data:{};base64,{}", media_type, file.data)
            };
            image_urls.push(url);
        } else if media_type == "application/pdf" {
            let bytes = BASE64
                .decode(strip_data_url(file.data).as_bytes())
                .map_err(|_| IngestError::InvalidEncoding {
                    name: file.name.to_string(),
                })?;
            let extracted = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| {
                IngestError::PdfExtraction {
                    name: file.name.to_string(),
                    reason: e.to_string(),
                }
            })?;
            text.push_str(&format!(
                "\n\n[Attached document: {}]\n{}",
                file.name,
                extracted.trim()
            ));
        } else {
            return Err(IngestError::UnsupportedType {
                name: file.name.to_string(),
                media_type,
            });
        }
    }

    Ok(PreparedInput {
        text: normalize_math_text(&text),
        image_urls,
    })
}
