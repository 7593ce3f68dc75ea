//! Query embedding cache
//!
//! Repeated questions skip the embedding round-trip. Only `embed_query`
//! results are cached; document embeddings pass straight through because
//! each chunk is embedded once at ingestion.
//!
//! Uses the moka crate for thread-safe, async-compatible caching with TTL
//! support.

use async_trait::async_trait;
use moka::future::Cache;
use sage_core::{CacheConfig, EmbeddingProvider, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Embedding Cache
// ============================================================================

/// Cache of query embeddings keyed by query text
#[derive(Clone)]
pub struct EmbeddingCache {
    cache: Cache<String, Vec<f32>>,
    stats: Arc<CacheStats>,
}

impl EmbeddingCache {
    /// Create a new embedding cache with default configuration
    pub fn new() -> Self {
        Self::with_config(&CacheConfig::default())
    }

    /// Create a new embedding cache with custom configuration
    pub fn with_config(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.ttl_seconds))
            .build();

        Self {
            cache,
            stats: Arc::new(CacheStats::new("query_embedding")),
        }
    }

    /// Get an embedding from cache
    pub async fn get(&self, text: &str) -> Option<Vec<f32>> {
        let result = self.cache.get(text).await;

        if result.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }

        result
    }

    /// Store an embedding in cache
    pub async fn put(&self, text: &str, embedding: Vec<f32>) {
        self.cache.insert(text.to_string(), embedding).await;
        self.stats.record_write();
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Get current cache size
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Cached Provider
// ============================================================================

/// Embedding provider wrapper that caches successful query embeddings
pub struct CachedEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
}

impl CachedEmbeddingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, config: &CacheConfig) -> Self {
        Self {
            inner,
            cache: EmbeddingCache::with_config(config),
        }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbeddingProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.cache.get(text).await {
            return Ok(vector);
        }

        let vector = self.inner.embed_query(text).await?;
        self.cache.put(text, vector.clone()).await;
        Ok(vector)
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed_document(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

// ============================================================================
// Cache Statistics
// ============================================================================

/// Statistics for cache performance monitoring
#[derive(Debug)]
pub struct CacheStats {
    name: String,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CacheStats {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Get total requests (hits + misses)
    pub fn total_requests(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Calculate hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    /// Get a summary report
    pub fn report(&self) -> CacheStatsReport {
        CacheStatsReport {
            name: self.name.clone(),
            hits: self.hits(),
            misses: self.misses(),
            writes: self.writes(),
            total_requests: self.total_requests(),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Serializable cache statistics report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub name: String,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub total_requests: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubEmbedder;

    #[tokio::test]
    async fn test_embedding_cache_basic() {
        let cache = EmbeddingCache::new();

        assert!(cache.get("hello").await.is_none());
        cache.put("hello", vec![1.0, 2.0]).await;
        assert_eq!(cache.get("hello").await, Some(vec![1.0, 2.0]));

        let stats = cache.stats();
        assert_eq!(stats.hits(), 1);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.writes(), 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_cached_provider_hits_inner_once_per_query() {
        let stub = Arc::new(StubEmbedder::new(2));
        let provider = CachedEmbeddingProvider::new(stub.clone(), &CacheConfig::default());

        let first = provider.embed_query("capital of France").await.unwrap();
        let second = provider.embed_query("capital of France").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(stub.query_calls(), 1);

        provider.embed_document("chunk").await.unwrap();
        provider.embed_document("chunk").await.unwrap();
        assert_eq!(stub.document_calls(), 2);

        assert_eq!(provider.cache().stats().report().hits, 1);
    }

    #[tokio::test]
    async fn test_cached_provider_does_not_cache_failures() {
        let stub = Arc::new(StubEmbedder::new(2).failing_queries());
        let provider = CachedEmbeddingProvider::new(stub.clone(), &CacheConfig::default());

        assert!(provider.embed_query("q").await.is_err());
        assert!(provider.embed_query("q").await.is_err());
        assert_eq!(stub.query_calls(), 2);
        assert_eq!(provider.cache().entry_count(), 0);
    }
}
