use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use super::domain::{ExtractionResult, MediaType, RegistrationType};
use super::retry::Retryable;

/// Turns raw document bytes into text and labeled fields.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        document: &[u8],
        media_type: MediaType,
    ) -> Result<ExtractionResult, ExtractionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("media type `{0}` is not accepted for extraction")]
    UnsupportedFormat(String),
    #[error("extraction backend unavailable: {0}")]
    Unavailable(String),
    #[error("document could not be read: {0}")]
    Failed(String),
}

impl Retryable for ExtractionError {
    fn is_retryable(&self) -> bool {
        matches!(self, ExtractionError::Unavailable(_))
    }
}

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
const JPEG_SIGNATURE: &[u8] = &[0xff, 0xd8, 0xff];
const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Reads the embedded text layer of a document.
///
/// PDF text is recovered from `Tj` string literals. Raster images carry no text layer, so they
/// are validated and produce an empty result until an OCR backend is plugged in behind
/// [`Extractor`].
#[derive(Debug, Clone)]
pub struct TextLayerExtractor {
    allowed: Vec<MediaType>,
}

impl Default for TextLayerExtractor {
    fn default() -> Self {
        Self::new(MediaType::ALL.to_vec())
    }
}

impl TextLayerExtractor {
    pub fn new(allowed: Vec<MediaType>) -> Self {
        Self { allowed }
    }

    pub fn allows(&self, media_type: MediaType) -> bool {
        self.allowed.contains(&media_type)
    }
}

#[async_trait]
impl Extractor for TextLayerExtractor {
    async fn extract(
        &self,
        document: &[u8],
        media_type: MediaType,
    ) -> Result<ExtractionResult, ExtractionError> {
        if !self.allows(media_type) {
            return Err(ExtractionError::UnsupportedFormat(
                media_type.label().to_string(),
            ));
        }

        if document.is_empty() {
            return Err(ExtractionError::Failed("document is empty".to_string()));
        }

        let text = match media_type {
            MediaType::Pdf => {
                if !document.starts_with(PDF_SIGNATURE) {
                    return Err(ExtractionError::Failed("missing PDF header".to_string()));
                }
                pdf_text_layer(document)
            }
            MediaType::Png => {
                if !document.starts_with(PNG_SIGNATURE) {
                    return Err(ExtractionError::Failed("invalid PNG signature".to_string()));
                }
                String::new()
            }
            MediaType::Jpeg => {
                if !document.starts_with(JPEG_SIGNATURE) {
                    return Err(ExtractionError::Failed("invalid JPEG signature".to_string()));
                }
                String::new()
            }
        };

        let result = ExtractionResult {
            fields: parse_labeled_fields(&text),
            text,
        };
        debug!(
            %media_type,
            chars = result.text.len(),
            fields = result.fields.len(),
            "document text layer extracted"
        );
        Ok(result)
    }
}

/// Parses `Label: value` lines into a field mapping.
///
/// Labels mentioning a registry (e.g. `BORAQS Reg`) map to that registry's field name; other
/// labels are normalized to snake case. The first occurrence of a label wins.
pub fn parse_labeled_fields(text: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    for line in text.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        let lowered = label.to_ascii_lowercase();
        let key = RegistrationType::ALL
            .into_iter()
            .find(|kind| lowered.contains(kind.label()))
            .map(|kind| kind.field_name().to_string())
            .unwrap_or_else(|| normalize_label(&lowered));

        if !key.is_empty() {
            fields.entry(key).or_insert_with(|| value.to_string());
        }
    }

    fields
}

fn normalize_label(label: &str) -> String {
    let mut key = String::with_capacity(label.len());
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() {
            key.push(ch.to_ascii_lowercase());
        } else if !key.is_empty() && !key.ends_with('_') {
            key.push('_');
        }
    }
    key.trim_end_matches('_').to_string()
}

/// Collects the string operands of `Tj` operators, one line per operator.
fn pdf_text_layer(document: &[u8]) -> String {
    let raw = String::from_utf8_lossy(document);
    let mut chars = raw.chars().peekable();
    let mut lines = Vec::new();

    while let Some(ch) = chars.next() {
        if ch != '(' {
            continue;
        }

        let mut literal = String::new();
        let mut depth = 1usize;
        while let Some(next) = chars.next() {
            match next {
                '\\' => match chars.next() {
                    Some('n') => literal.push('\n'),
                    Some('r') => literal.push('\r'),
                    Some('t') => literal.push('\t'),
                    Some(escaped) => literal.push(escaped),
                    None => break,
                },
                '(' => {
                    depth += 1;
                    literal.push(next);
                }
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    literal.push(next);
                }
                other => literal.push(other),
            }
        }

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek() == Some(&'T') {
            chars.next();
            if chars.peek() == Some(&'j') {
                chars.next();
                lines.push(literal);
            }
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labeled_fields_map_registry_lines() {
        let fields = parse_labeled_fields(
            "Architect: John Doe\nBORAQS Reg: A-12345\nEngineer: Jane Smith\nEBK Reg: E-67890\nNotes: Site plan included.",
        );

        assert_eq!(fields.get("architect").map(String::as_str), Some("John Doe"));
        assert_eq!(
            fields.get("boraqs_registration").map(String::as_str),
            Some("A-12345")
        );
        assert_eq!(
            fields.get("ebk_registration").map(String::as_str),
            Some("E-67890")
        );
        assert_eq!(fields.get("notes").map(String::as_str), Some("Site plan included."));
    }

    #[test]
    fn labels_are_normalized_to_snake_case() {
        let fields = parse_labeled_fields("Plot Number (LR): 209/1234\nempty:   \nno separator");
        assert_eq!(fields.get("plot_number_lr").map(String::as_str), Some("209/1234"));
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn pdf_text_layer_unescapes_literals() {
        let pdf = b"%PDF-1.4\nBT /F1 12 Tf 50 750 Td (Notes: site plan \\(rev 2\\)) Tj ET\nBT (ignored) Tf ET\nBT (Line two) Tj ET";
        assert_eq!(pdf_text_layer(pdf), "Notes: site plan (rev 2)\nLine two");
    }
}
