//! PDF document parser using pdf-extract
//!
//! Pages are separated by form feeds in the extracted text; each non-blank
//! page becomes a section carrying its page number.

use crate::{DocumentParser, DocumentSection, FileType, ParsedDocument, ParserError, Result};

/// PDF document parser
#[derive(Debug, Clone, Default)]
pub struct PdfParser;

impl PdfParser {
    pub fn new() -> Self {
        Self
    }

    /// Split extracted text into one section per non-blank page
    fn page_sections(&self, text: &str) -> (Vec<DocumentSection>, u32) {
        let mut sections = Vec::new();
        let mut page_count = 0u32;

        for (i, page) in text.split('\x0C').enumerate() {
            page_count = i as u32 + 1;
            let content = page.trim();
            if content.is_empty() {
                continue;
            }

            let mut section = DocumentSection::new(content).with_start_page(page_count);
            if let Some(first_line) = content.lines().next() {
                if is_potential_header(first_line) {
                    section = section
                        .with_title(first_line.trim())
                        .with_level(detect_heading_level(first_line));
                }
            }
            sections.push(section);
        }

        (sections, page_count)
    }
}

/// Check if a line might be a section header
fn is_potential_header(line: &str) -> bool {
    let trimmed = line.trim();

    if trimmed.is_empty() || trimmed.chars().count() > 100 {
        return false;
    }

    let numbered = trimmed.starts_with(|c: char| c.is_ascii_digit())
        || trimmed.starts_with("Chapter")
        || trimmed.starts_with("Section");

    let all_caps = trimmed
        .chars()
        .filter(|c| c.is_alphabetic())
        .all(|c| c.is_uppercase())
        && trimmed.chars().any(|c| c.is_alphabetic());

    numbered || all_caps
}

/// Detect heading level from line content
fn detect_heading_level(line: &str) -> u8 {
    let trimmed = line.trim();

    if trimmed.starts_with("Chapter") || trimmed.starts_with("CHAPTER") {
        return 1;
    }
    if trimmed.starts_with("Section") {
        return 2;
    }

    // 1.1.1 = level 3
    let numbering: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let depth = numbering
        .trim_end_matches('.')
        .split('.')
        .filter(|part| !part.is_empty())
        .count();

    depth.clamp(1, 6) as u8
}

impl DocumentParser for PdfParser {
    fn parse_bytes(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ParserError::PdfError(format!("{name}: {e}")))?;

        let (sections, page_count) = self.page_sections(&text);
        tracing::debug!("Parsed {name}: {page_count} pages, {} sections", sections.len());

        let mut doc = ParsedDocument::new(name, FileType::Pdf).with_content(text);
        doc.sections = sections;
        doc.page_count = Some(page_count);
        Ok(doc)
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Pdf]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_sections() {
        let text = "INTRODUCTION\nFirst page body.\x0C\n\x0CThird page body.\nMore.";
        let (sections, page_count) = PdfParser::new().page_sections(text);

        assert_eq!(page_count, 3);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].start_page, Some(1));
        assert_eq!(sections[0].title.as_deref(), Some("INTRODUCTION"));
        assert_eq!(sections[1].start_page, Some(3));
        assert_eq!(sections[1].title, None);
        assert_eq!(sections[1].content, "Third page body.\nMore.");
    }

    #[test]
    fn test_header_detection() {
        assert!(is_potential_header("1. Introduction"));
        assert!(is_potential_header("CHAPTER ONE"));
        assert!(!is_potential_header("This is a normal paragraph."));
        assert!(!is_potential_header(""));
    }

    #[test]
    fn test_heading_level_detection() {
        assert_eq!(detect_heading_level("Chapter 1"), 1);
        assert_eq!(detect_heading_level("Section 1.1"), 2);
        assert_eq!(detect_heading_level("1.1.1 Details"), 3);
    }

    #[test]
    fn test_invalid_pdf_is_error() {
        let result = PdfParser::new().parse_bytes("broken.pdf", b"not a pdf");
        assert!(matches!(result, Err(ParserError::PdfError(_))));
    }

    #[test]
    fn test_supported_types() {
        let parser = PdfParser::new();
        assert!(parser.can_parse(FileType::Pdf));
        assert!(!parser.can_parse(FileType::Docx));
    }
}
