//! Sage Parser - Document loading and chunking
//!
//! Supports parsing of:
//! - PDF documents
//! - Microsoft Word (DOCX)
//! - Markdown files
//! - Plain text files
//!
//! Each parser implements the `DocumentParser` trait and produces a
//! `ParsedDocument`, which `TextChunker` splits into chunk records ready for
//! ingestion.

pub mod chunker;
pub mod docx;
pub mod pdf;

pub use chunker::{ChunkConfig, TextChunker, CHUNK_INDEX_KEY, PAGE_KEY, SECTION_KEY};
pub use docx::DocxParser;
pub use pdf::PdfParser;

use serde::Serialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during document parsing
#[derive(Error, Debug)]
pub enum ParserError {
    /// File format is not supported
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// IO error while reading the file
    #[error("IO error reading file: {path}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// PDF parsing error
    #[error("PDF parsing error: {0}")]
    PdfError(String),

    /// DOCX parsing error
    #[error("DOCX parsing error: {0}")]
    DocxError(String),

    /// Encoding error
    #[error("Text encoding error: {0}")]
    EncodingError(String),
}

pub type Result<T> = std::result::Result<T, ParserError>;

// ============================================================================
// Parsed Document Types
// ============================================================================

/// A parsed document with extracted content
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Source name (file name or path)
    pub name: String,

    /// Detected file type
    pub file_type: FileType,

    /// Extracted text content
    pub content: String,

    /// Structured sections (if available)
    pub sections: Vec<DocumentSection>,

    /// Extracted tables
    pub tables: Vec<Table>,

    /// Number of pages, when the format has pages
    pub page_count: Option<u32>,
}

impl ParsedDocument {
    /// Create a new parsed document
    pub fn new(name: impl Into<String>, file_type: FileType) -> Self {
        Self {
            name: name.into(),
            file_type,
            content: String::new(),
            sections: Vec::new(),
            tables: Vec::new(),
            page_count: None,
        }
    }

    /// Set content
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Add a section
    pub fn add_section(&mut self, section: DocumentSection) {
        self.sections.push(section);
    }

    /// Total character count
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }

    /// True when no text was extracted
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Supported file types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
    Markdown,
    PlainText,
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "md" | "markdown" => Self::Markdown,
            "txt" => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    /// Detect file type from a file name such as an upload's
    pub fn from_name(name: &str) -> Self {
        Self::from_path(Path::new(name))
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Docx => write!(f, "docx"),
            Self::Markdown => write!(f, "markdown"),
            Self::PlainText => write!(f, "text"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A section within a document
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSection {
    /// Section heading/title
    pub title: Option<String>,

    /// Heading level (1 = top level)
    pub level: u8,

    /// Section content
    pub content: String,

    /// Page number where section starts
    pub start_page: Option<u32>,
}

impl DocumentSection {
    /// Create a new section
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            title: None,
            level: 1,
            content: content.into(),
            start_page: None,
        }
    }

    /// Set title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set level
    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    /// Set start page
    pub fn with_start_page(mut self, page: u32) -> Self {
        self.start_page = Some(page);
        self
    }
}

/// A table extracted from a document
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// Column headers
    pub headers: Vec<String>,

    /// Table rows
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add headers
    pub fn with_headers(mut self, headers: Vec<String>) -> Self {
        self.headers = headers;
        self
    }

    /// Add a row
    pub fn add_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    /// Convert to markdown format
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        if !self.headers.is_empty() {
            md.push('|');
            for h in &self.headers {
                md.push_str(&format!(" {h} |"));
            }
            md.push('\n');

            md.push('|');
            for _ in &self.headers {
                md.push_str(" --- |");
            }
            md.push('\n');
        }

        for row in &self.rows {
            md.push('|');
            for cell in row {
                md.push_str(&format!(" {cell} |"));
            }
            md.push('\n');
        }

        md
    }
}

// ============================================================================
// Parser Trait
// ============================================================================

/// Trait for document parsers
pub trait DocumentParser: Send + Sync {
    /// Parse a document already in memory
    fn parse_bytes(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument>;

    /// Get supported file types
    fn supported_types(&self) -> &[FileType];

    /// Parse a document from a file path
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        self.parse_bytes(&display_name(path), &bytes)
    }

    /// Check if this parser can handle a file type
    fn can_parse(&self, file_type: FileType) -> bool {
        self.supported_types().contains(&file_type)
    }
}

/// File name used as a chunk's `source`
fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Parser Registry
// ============================================================================

/// Registry of available parsers
pub struct ParserRegistry {
    parsers: Vec<Box<dyn DocumentParser>>,
}

impl ParserRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Registry with PDF, DOCX, and text parsers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PdfParser::new());
        registry.register(DocxParser::new());
        registry.register(PlainTextParser);
        registry
    }

    /// Register a parser
    pub fn register<P: DocumentParser + 'static>(&mut self, parser: P) {
        self.parsers.push(Box::new(parser));
    }

    /// Find a parser for a file type
    pub fn find_parser(&self, file_type: FileType) -> Option<&dyn DocumentParser> {
        self.parsers
            .iter()
            .find(|p| p.can_parse(file_type))
            .map(|p| p.as_ref())
    }

    /// True when some registered parser handles `name`'s extension
    pub fn supports(&self, name: &str) -> bool {
        self.find_parser(FileType::from_name(name)).is_some()
    }

    /// Parse a file using the appropriate parser
    pub fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        self.parser_for(path)?.parse(path)
    }

    /// Parse in-memory bytes, choosing the parser by `name`'s extension
    pub fn parse_bytes(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument> {
        self.parser_for(Path::new(name))?.parse_bytes(name, bytes)
    }

    fn parser_for(&self, path: &Path) -> Result<&dyn DocumentParser> {
        let file_type = FileType::from_path(path);

        if file_type == FileType::Unknown {
            return Err(ParserError::UnsupportedFormat(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("none")
                    .to_string(),
            ));
        }

        self.find_parser(file_type)
            .ok_or_else(|| ParserError::UnsupportedFormat(file_type.to_string()))
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// Plain Text Parser
// ============================================================================

/// Plain text and markdown parser
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn parse_bytes(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument> {
        let content = std::str::from_utf8(bytes)
            .map_err(|e| ParserError::EncodingError(format!("{name}: {e}")))?;

        let file_type = match FileType::from_name(name) {
            FileType::Markdown => FileType::Markdown,
            _ => FileType::PlainText,
        };

        Ok(ParsedDocument::new(name, file_type).with_content(content))
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::PlainText, FileType::Markdown]
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_extension("pdf"), FileType::Pdf);
        assert_eq!(FileType::from_extension("PDF"), FileType::Pdf);
        assert_eq!(FileType::from_extension(".docx"), FileType::Docx);
        assert_eq!(FileType::from_extension("md"), FileType::Markdown);
        assert_eq!(FileType::from_extension("xlsx"), FileType::Unknown);
        assert_eq!(FileType::from_name("report.final.txt"), FileType::PlainText);
        assert_eq!(FileType::from_name("noext"), FileType::Unknown);
    }

    #[test]
    fn test_table_to_markdown() {
        let mut table = Table::new().with_headers(vec!["Name".to_string(), "Age".to_string()]);
        table.add_row(vec!["Alice".to_string(), "30".to_string()]);
        table.add_row(vec!["Bob".to_string(), "25".to_string()]);

        let md = table.to_markdown();
        assert!(md.contains("| Name | Age |"));
        assert!(md.contains("| --- | --- |"));
        assert!(md.contains("| Alice | 30 |"));
    }

    #[test]
    fn test_registry_rejects_unknown_format() {
        let registry = ParserRegistry::with_defaults();
        assert!(matches!(
            registry.parse_bytes("sheet.xlsx", b"data"),
            Err(ParserError::UnsupportedFormat(ext)) if ext == "xlsx"
        ));
        assert!(!registry.supports("sheet.xlsx"));
        assert!(registry.supports("notes.MD"));
    }

    #[test]
    fn test_plain_text_parse_bytes() {
        let registry = ParserRegistry::with_defaults();
        let doc = registry
            .parse_bytes("notes.md", "# Title\n\nBody".as_bytes())
            .unwrap();

        assert_eq!(doc.name, "notes.md");
        assert_eq!(doc.file_type, FileType::Markdown);
        assert_eq!(doc.content, "# Title\n\nBody");
    }

    #[test]
    fn test_plain_text_rejects_invalid_utf8() {
        let result = PlainTextParser.parse_bytes("bad.txt", &[0xff, 0xfe, 0x00]);
        assert!(matches!(result, Err(ParserError::EncodingError(_))));
    }

    #[test]
    fn test_parse_from_path_uses_file_name() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "hello from disk").unwrap();

        let doc = ParserRegistry::with_defaults().parse(file.path()).unwrap();
        assert_eq!(doc.content, "hello from disk");
        assert!(doc.name.ends_with(".txt"));
        assert!(!doc.name.contains('/'));
    }

    #[test]
    fn test_document_section_builder() {
        let section = DocumentSection::new("Content here")
            .with_title("Introduction")
            .with_level(1)
            .with_start_page(5);

        assert_eq!(section.title, Some("Introduction".to_string()));
        assert_eq!(section.level, 1);
        assert_eq!(section.start_page, Some(5));
    }
}
