//! Query-time retrieval: embed, search, and resolve chunks

use sage_core::{EmbeddingProvider, Result, RetrievalResult};
use sage_vector::SharedCorpus;
use std::sync::Arc;

/// Embeds a query and returns the nearest chunks with their distances
#[derive(Clone)]
pub struct RetrievalPipeline {
    corpus: SharedCorpus,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    max_distance: Option<f32>,
}

impl RetrievalPipeline {
    pub fn new(corpus: SharedCorpus, embedder: Arc<dyn EmbeddingProvider>, top_k: usize) -> Self {
        Self {
            corpus,
            embedder,
            top_k,
            max_distance: None,
        }
    }

    /// Drop results farther than `max_distance`
    pub fn with_max_distance(mut self, max_distance: Option<f32>) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve with the configured `top_k`
    pub async fn retrieve_default(&self, query: &str) -> Result<Vec<RetrievalResult>> {
        self.retrieve(query, self.top_k).await
    }

    /// Retrieve up to `k` chunks, nearest first
    ///
    /// Fails with `EmbeddingUnavailable` if the query cannot be embedded and
    /// with `DimensionMismatch` if the embedding has the wrong length.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        let vector = self.embedder.embed_query(query).await?;

        let corpus = self.corpus.read().await;
        let hits = corpus.index().search(&vector, k)?;

        let mut results = Vec::with_capacity(hits.len());
        for (position, distance) in hits {
            if self.max_distance.is_some_and(|max| distance > max) {
                continue;
            }
            match corpus.store().get(position) {
                Ok(chunk) => results.push(RetrievalResult {
                    chunk: chunk.clone(),
                    distance,
                }),
                Err(e) => tracing::warn!("Skipping search hit: {e}"),
            }
        }

        tracing::debug!("Retrieved {} chunks for query", results.len());
        Ok(results)
    }
}
