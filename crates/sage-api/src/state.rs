//! Application state management

use sage_core::AppConfig;
use sage_parser::{ChunkConfig, ParserRegistry, TextChunker};
use sage_rag::RagEngine;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Engine over the shared corpus
    pub engine: Arc<RagEngine>,
    /// Document parsers by file type
    pub parsers: ParserRegistry,
    /// Splits parsed documents into chunk records
    pub chunker: TextChunker,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
}

impl AppState {
    pub fn new(engine: Arc<RagEngine>) -> Self {
        let chunker = TextChunker::new(ChunkConfig::from(&engine.config().rag));
        Self {
            engine,
            parsers: ParserRegistry::with_defaults(),
            chunker,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AppConfig {
        self.engine.config()
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// True when `filename` has an accepted upload extension
    pub fn accepts_upload(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        self.config()
            .server
            .allowed_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_lowercase()))
    }
}
