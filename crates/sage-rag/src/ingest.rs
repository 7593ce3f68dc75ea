//! Ingestion: embed chunk records and append them to the shared corpus
//!
//! Every record is stored, even when its embedding fails. A failed record is
//! paired with a zero vector so the index and the chunk store stay aligned;
//! the substitution shows up in `IngestReport::degraded_count`.

use futures::stream::{self, StreamExt};
use sage_core::{ChunkRecord, EmbeddingProvider, IngestReport, Result};
use sage_vector::{embed_document_or_zero, SharedCorpus};
use std::sync::Arc;

/// Embeds records with bounded concurrency and appends them in one batch
#[derive(Clone)]
pub struct Ingestor {
    corpus: SharedCorpus,
    embedder: Arc<dyn EmbeddingProvider>,
    concurrency: usize,
}

impl Ingestor {
    pub fn new(
        corpus: SharedCorpus,
        embedder: Arc<dyn EmbeddingProvider>,
        concurrency: usize,
    ) -> Self {
        Self {
            corpus,
            embedder,
            concurrency: concurrency.max(1),
        }
    }

    /// Embed and index `records`, preserving their order
    pub async fn ingest(&self, records: Vec<ChunkRecord>) -> Result<IngestReport> {
        if records.is_empty() {
            return Ok(IngestReport {
                indexed_count: 0,
                degraded_count: 0,
                total_vectors: self.corpus.count().await,
            });
        }

        tracing::info!("Ingesting {} chunks", records.len());

        // Embedding runs without holding the corpus lock
        let embedder = self.embedder.as_ref();
        let pending: Vec<_> = records
            .iter()
            .map(|record| embed_document_or_zero(embedder, &record.text))
            .collect();
        let vectors: Vec<_> = stream::iter(pending)
            .buffered(self.concurrency)
            .collect()
            .await;

        let degraded_count = vectors.iter().filter(|v| v.substituted).count();
        let batch: Vec<_> = vectors
            .into_iter()
            .map(|v| v.vector)
            .zip(records)
            .collect();

        let range = self.corpus.append_batch(batch).await?;
        let report = IngestReport {
            indexed_count: range.len(),
            degraded_count,
            total_vectors: range.end,
        };

        if report.indexed_count > 0 && report.degraded_count == report.indexed_count {
            tracing::error!(
                "Embedding failed for all {} chunks; stored with zero vectors",
                report.indexed_count
            );
        } else if report.is_degraded() {
            tracing::warn!(
                "{} of {} chunks stored with zero vectors",
                report.degraded_count,
                report.indexed_count
            );
        }

        tracing::info!(
            "Indexed {} chunks ({} total)",
            report.indexed_count,
            report.total_vectors
        );
        Ok(report)
    }
}
