//! Character-bounded text chunking
//!
//! Sizes and offsets are counted in characters, never bytes, so a chunk
//! boundary can never land inside a multi-byte UTF-8 sequence.

use crate::ParsedDocument;
use sage_core::{ChunkRecord, Chunker, RagConfig};

/// Metadata key holding a chunk's ordinal within its document
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// Metadata key holding the page a chunk starts on
pub const PAGE_KEY: &str = "page";

/// Metadata key holding the title of the section a chunk came from
pub const SECTION_KEY: &str = "section";

/// How far back from the size limit to look for a natural break
const BREAK_SEARCH_WINDOW: usize = 100;

/// Configuration for document chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,

    /// Characters shared with the previous chunk
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl From<&RagConfig> for ChunkConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            overlap: config.chunk_overlap,
        }
    }
}

/// Splits text into overlapping chunks, preferring paragraph and sentence
/// boundaries near the size limit
#[derive(Debug, Clone, Default)]
pub struct TextChunker {
    config: ChunkConfig,
}

impl TextChunker {
    pub fn new(config: ChunkConfig) -> Self {
        // Overlap must leave room for progress
        let overlap = config.overlap.min(config.chunk_size.saturating_sub(1));
        Self {
            config: ChunkConfig {
                chunk_size: config.chunk_size.max(1),
                overlap,
            },
        }
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    /// Chunk a parsed document, section by section when it has sections
    pub fn chunk_document(&self, doc: &ParsedDocument) -> Vec<ChunkRecord> {
        let mut records = Vec::new();

        if doc.sections.is_empty() {
            for text in split_text(&doc.content, self.config) {
                records.push(ChunkRecord::new(text).with_source(doc.name.as_str()));
            }
        } else {
            for section in &doc.sections {
                for text in split_text(&section.content, self.config) {
                    let mut record = ChunkRecord::new(text).with_source(doc.name.as_str());
                    if let Some(page) = section.start_page {
                        record = record.with_metadata(PAGE_KEY, page.to_string());
                    }
                    if let Some(title) = &section.title {
                        record = record.with_metadata(SECTION_KEY, title.as_str());
                    }
                    records.push(record);
                }
            }
        }

        number(records)
    }
}

impl Chunker for TextChunker {
    fn chunk(&self, source: &str, text: &str) -> Vec<ChunkRecord> {
        let records = split_text(text, self.config)
            .into_iter()
            .map(|text| ChunkRecord::new(text).with_source(source))
            .collect();
        number(records)
    }
}

fn number(records: Vec<ChunkRecord>) -> Vec<ChunkRecord> {
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| record.with_metadata(CHUNK_INDEX_KEY, i.to_string()))
        .collect()
}

/// Split `text` into trimmed, non-empty pieces of at most `chunk_size` chars
fn split_text(text: &str, config: ChunkConfig) -> Vec<String> {
    // Byte offset of every char boundary, including the end of the string
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < char_count {
        let limit = (start + config.chunk_size).min(char_count);
        let end = if limit < char_count {
            find_break_point(text, &bounds, start, limit)
        } else {
            limit
        };

        let piece = text[bounds[start]..bounds[end]].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end >= char_count {
            break;
        }

        let next = end.saturating_sub(config.overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

/// Char index just after the best break in `(start, limit]`
///
/// Prefers a paragraph break, then a sentence end, then a line break, all
/// within the last `BREAK_SEARCH_WINDOW` chars before `limit`.
fn find_break_point(text: &str, bounds: &[usize], start: usize, limit: usize) -> usize {
    let window_start = limit.saturating_sub(BREAK_SEARCH_WINDOW).max(start + 1);
    if window_start >= limit {
        return limit;
    }

    let base = bounds[window_start];
    let window = &text[base..bounds[limit]];

    let found = window
        .rfind("\n\n")
        .map(|pos| pos + 2)
        .or_else(|| {
            [". ", "。", "! ", "? "]
                .iter()
                .filter_map(|pattern| window.rfind(pattern).map(|pos| pos + pattern.len()))
                .max()
        })
        .or_else(|| window.rfind('\n').map(|pos| pos + 1));

    found
        .and_then(|offset| bounds.binary_search(&(base + offset)).ok())
        .filter(|&idx| idx > start && idx <= limit)
        .unwrap_or(limit)
}
