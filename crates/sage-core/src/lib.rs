//! Sage Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout Sage:
//! - Chunk and retrieval models
//! - Common error types
//! - Capability traits for embedding, generation, and chunking
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, CacheConfig, ConfigError, LlmConfig, LlmProvider, LoggingConfig, RagConfig,
    ServerConfig, SnapshotConfig,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Metadata key naming the document a chunk came from
pub const SOURCE_KEY: &str = "source";

/// Rendered in place of a missing `source` metadata entry
pub const UNKNOWN_SOURCE: &str = "Unknown";

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Sage operations
#[derive(Error, Debug)]
pub enum SageError {
    /// A vector's length does not match the index dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding provider could not embed a query
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Chunk store access out of range
    #[error("Chunk not found at position {position} (store holds {len})")]
    NotFound { position: usize, len: usize },

    /// Persisted snapshot is missing a half or is inconsistent
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// The generation stream failed after producing `partial`
    #[error("Generation interrupted: {message}")]
    GenerationInterrupted { message: String, partial: String },

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SageError {
    /// Stable machine-readable code for transport layers
    pub fn code(&self) -> &'static str {
        match self {
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::EmbeddingUnavailable(_) => "EMBEDDING_UNAVAILABLE",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::CorruptSnapshot(_) => "CORRUPT_SNAPSHOT",
            Self::GenerationInterrupted { .. } => "GENERATION_INTERRUPTED",
            Self::LlmError(_) => "LLM_ERROR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Other(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SageError>;

// ============================================================================
// Chunk Models
// ============================================================================

/// A chunk-like record produced by a chunker, before it is indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Text content
    pub text: String,

    /// Source metadata (e.g. `source`, `page`, `section`)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ChunkRecord {
    /// Create a record without metadata
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: HashMap::new(),
        }
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the `source` metadata entry
    pub fn with_source(self, source: impl Into<String>) -> Self {
        self.with_metadata(SOURCE_KEY, source)
    }
}

/// An indexed chunk of document content
///
/// `position` is both the chunk's index in the chunk store and the index of
/// its vector in the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Text content
    pub text: String,

    /// Source metadata
    pub metadata: HashMap<String, String>,

    /// Position in the store and the index
    pub position: usize,
}

impl Chunk {
    /// Assign a position to a record
    pub fn from_record(record: ChunkRecord, position: usize) -> Self {
        Self {
            text: record.text,
            metadata: record.metadata,
            position,
        }
    }

    /// Source document name, or `Unknown`
    pub fn source(&self) -> &str {
        self.metadata
            .get(SOURCE_KEY)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_SOURCE)
    }
}

// ============================================================================
// Retrieval and Ingestion Types
// ============================================================================

/// A retrieved chunk paired with its L2 distance to the query (lower is closer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub distance: f32,
}

/// Summary of one ingestion call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Chunks appended by this call
    pub indexed_count: usize,

    /// Chunks whose embedding failed and were stored with a zero vector
    pub degraded_count: usize,

    /// Vectors in the index after this call
    pub total_vectors: usize,
}

impl IngestReport {
    /// True when at least one chunk was stored with a substituted vector
    pub fn is_degraded(&self) -> bool {
        self.degraded_count > 0
    }
}

/// Index statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub total_vectors: usize,
    pub embedding_dimension: usize,
}

// ============================================================================
// Traits
// ============================================================================

/// Turns text into fixed-dimension vectors
///
/// Query and document entry points are separate so providers can apply
/// task-specific instructions. Both may fail; the ingestion layer decides
/// what a document failure means.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a search query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a document chunk
    async fn embed_document(&self, text: &str) -> Result<Vec<f32>>;

    /// Embedding dimension, fixed for the provider's lifetime
    fn dimension(&self) -> usize;
}

/// Trait for LLM clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a streaming response
    ///
    /// Errors opening the stream are returned directly; errors after the
    /// stream started are yielded as items.
    async fn generate_stream(
        &self,
        prompt: &str,
    ) -> Result<futures::stream::BoxStream<'static, Result<String>>>;

    /// Client name for logging
    fn name(&self) -> &str;
}

/// Splits document text into bounded, overlapping chunk records
pub trait Chunker: Send + Sync {
    fn chunk(&self, source: &str, text: &str) -> Vec<ChunkRecord>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_source_fallback() {
        let chunk = Chunk::from_record(ChunkRecord::new("text"), 0);
        assert_eq!(chunk.source(), "Unknown");

        let chunk = Chunk::from_record(ChunkRecord::new("text").with_source("lease.pdf"), 3);
        assert_eq!(chunk.source(), "lease.pdf");
        assert_eq!(chunk.position, 3);
    }

    #[test]
    fn test_record_builder() {
        let record = ChunkRecord::new("body")
            .with_source("contract.docx")
            .with_metadata("page", "2");

        assert_eq!(record.metadata.get("source").map(String::as_str), Some("contract.docx"));
        assert_eq!(record.metadata.get("page").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_record_deserialize_without_metadata() {
        let record: ChunkRecord = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(record.text, "hello");
        assert!(record.metadata.is_empty());
    }

    #[test]
    fn test_error_codes() {
        let err = SageError::DimensionMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(err.code(), "DIMENSION_MISMATCH");
        assert_eq!(err.to_string(), "Dimension mismatch: expected 3, got 2");

        let err = SageError::GenerationInterrupted {
            message: "reset".to_string(),
            partial: "Hello".to_string(),
        };
        assert_eq!(err.code(), "GENERATION_INTERRUPTED");
    }

    #[test]
    fn test_ingest_report_degraded() {
        let report = IngestReport {
            indexed_count: 3,
            degraded_count: 1,
            total_vectors: 3,
        };
        assert!(report.is_degraded());
    }
}
