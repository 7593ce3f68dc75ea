//! Engine facade wiring the corpus, providers, and pipelines together

use crate::cache::{CacheStatsReport, CachedEmbeddingProvider, EmbeddingCache};
use crate::ingest::Ingestor;
use crate::llm::create_llm_client;
use crate::orchestrator::{AnswerStream, GenerationOrchestrator};
use crate::retrieval::RetrievalPipeline;
use sage_core::{
    AppConfig, ChunkRecord, EmbeddingProvider, IndexInfo, IngestReport, LlmClient, Result,
    RetrievalResult,
};
use sage_vector::{create_embedding_provider, snapshot, SharedCorpus, SnapshotInfo};
use std::path::Path;
use std::sync::Arc;

/// One shared corpus plus the ingestion, retrieval, and generation paths over it
pub struct RagEngine {
    config: AppConfig,
    corpus: SharedCorpus,
    cache: Option<EmbeddingCache>,
    llm: Arc<dyn LlmClient>,
    ingestor: Ingestor,
    retrieval: RetrievalPipeline,
    orchestrator: GenerationOrchestrator,
}

impl RagEngine {
    /// Build the engine from configuration
    ///
    /// Probes the embedding provider for its dimension, wraps it in the query
    /// cache when enabled, and restores the configured snapshot if present.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let provider = create_embedding_provider(&config.llm).await?;
        let (embedder, cache): (Arc<dyn EmbeddingProvider>, _) = if config.cache.enabled {
            let cached = CachedEmbeddingProvider::new(provider, &config.cache);
            let cache = cached.cache().clone();
            (Arc::new(cached), Some(cache))
        } else {
            (provider, None)
        };

        let llm = create_llm_client(&config.llm)?;

        let mut engine = Self::with_components(config, embedder, llm)?;
        engine.cache = cache;
        engine.restore().await?;
        Ok(engine)
    }

    /// Build the engine around explicit providers with an empty corpus
    pub fn with_components(
        config: AppConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmClient>,
    ) -> Result<Self> {
        config.validate()?;

        let corpus = SharedCorpus::new(embedder.dimension());
        let ingestor = Ingestor::new(
            corpus.clone(),
            embedder.clone(),
            config.rag.embedding_concurrency,
        );
        let retrieval = RetrievalPipeline::new(corpus.clone(), embedder, config.rag.top_k)
            .with_max_distance(config.rag.max_distance);
        let orchestrator = GenerationOrchestrator::from_config(
            corpus.clone(),
            retrieval.clone(),
            llm.clone(),
            &config.rag,
        )?;

        tracing::info!(
            "RAG engine ready: llm={}, dimension={}, top_k={}",
            llm.name(),
            corpus.dimension(),
            config.rag.top_k
        );

        Ok(Self {
            config,
            corpus,
            cache: None,
            llm,
            ingestor,
            retrieval,
            orchestrator,
        })
    }

    /// Load the configured snapshot if startup loading is on and it exists
    pub async fn restore(&self) -> Result<Option<SnapshotInfo>> {
        let snapshot = &self.config.snapshot;
        if !snapshot.load_on_startup || !snapshot::exists(&snapshot.dir).await {
            return Ok(None);
        }
        self.load_snapshot().await.map(Some)
    }

    /// Embed and index chunk records
    ///
    /// Saves a snapshot afterwards when `snapshot.save_after_ingest` is set.
    /// A failed save is logged; the ingested chunks stay in memory.
    pub async fn ingest(&self, records: Vec<ChunkRecord>) -> Result<IngestReport> {
        let report = self.ingestor.ingest(records).await?;

        if self.config.snapshot.save_after_ingest && report.indexed_count > 0 {
            if let Err(e) = self.save_snapshot().await {
                tracing::error!("Snapshot save after ingestion failed: {e}");
            }
        }

        Ok(report)
    }

    /// Stream an answer
    pub fn answer(&self, question: impl Into<String>) -> AnswerStream {
        self.orchestrator.answer(question)
    }

    /// Answer and collect the full text
    pub async fn answer_full(&self, question: impl Into<String>) -> Result<String> {
        self.orchestrator.answer_full(question).await
    }

    /// Retrieve up to `top_k` chunks (configured default when `None`)
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievalResult>> {
        let k = top_k.unwrap_or_else(|| self.retrieval.top_k());
        self.retrieval.retrieve(query, k).await
    }

    pub async fn info(&self) -> IndexInfo {
        self.corpus.info().await
    }

    /// Save to the configured snapshot directory
    pub async fn save_snapshot(&self) -> Result<SnapshotInfo> {
        self.save_snapshot_to(&self.config.snapshot.dir).await
    }

    pub async fn save_snapshot_to(&self, dir: impl AsRef<Path>) -> Result<SnapshotInfo> {
        snapshot::save(&self.corpus, dir).await
    }

    /// Replace the live corpus with the configured snapshot
    pub async fn load_snapshot(&self) -> Result<SnapshotInfo> {
        self.load_snapshot_from(&self.config.snapshot.dir).await
    }

    pub async fn load_snapshot_from(&self, dir: impl AsRef<Path>) -> Result<SnapshotInfo> {
        snapshot::load_into(&self.corpus, dir).await
    }

    pub fn corpus(&self) -> &SharedCorpus {
        &self.corpus
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn llm_name(&self) -> &str {
        self.llm.name()
    }

    /// Query cache statistics, when the cache is enabled
    pub fn cache_stats(&self) -> Option<CacheStatsReport> {
        self.cache.as_ref().map(|cache| cache.stats().report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubEmbedder, StubLlm};
    use sage_core::SageError;
    use tempfile::TempDir;

    const FRANCE: &str = "Paris is the capital of France.";
    const JAPAN: &str = "Tokyo is the capital of Japan.";
    const QUESTION: &str = "What is the capital of France?";

    fn embedder() -> Arc<StubEmbedder> {
        Arc::new(
            StubEmbedder::new(2)
                .with_vector(FRANCE, vec![1.0, 0.0])
                .with_vector(JAPAN, vec![0.0, 1.0])
                .with_vector(QUESTION, vec![0.9, 0.1]),
        )
    }

    fn config(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.snapshot.dir = dir.to_path_buf();
        config
    }

    fn geography() -> Vec<ChunkRecord> {
        vec![
            ChunkRecord::new(FRANCE)
                .with_source("geo.pdf")
                .with_metadata("page", "1"),
            ChunkRecord::new(JAPAN).with_source("geo.pdf"),
        ]
    }

    #[tokio::test]
    async fn test_ingest_then_answer() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(StubLlm::new(["Paris", "."]));
        let engine = RagEngine::with_components(config(dir.path()), embedder(), llm.clone()).unwrap();

        let report = engine.ingest(geography()).await.unwrap();
        assert_eq!(report.indexed_count, 2);
        assert_eq!(engine.info().await.total_vectors, 2);
        assert_eq!(engine.info().await.embedding_dimension, 2);

        assert_eq!(engine.answer_full(QUESTION).await.unwrap(), "Paris.");
        assert!(llm.prompts()[0].contains("[Source: geo.pdf]\nParis is the capital of France."));

        let results = engine.retrieve(QUESTION, Some(1)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, FRANCE);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_into_fresh_engine() {
        let dir = TempDir::new().unwrap();
        let snapshot_dir = dir.path().join("index");

        let first = RagEngine::with_components(
            config(&snapshot_dir),
            embedder(),
            Arc::new(StubLlm::new(["x"])),
        )
        .unwrap();
        first.ingest(geography()).await.unwrap();
        let saved = first.save_snapshot().await.unwrap();
        assert_eq!(saved.total_vectors, 2);

        let second = RagEngine::with_components(
            config(&snapshot_dir),
            embedder(),
            Arc::new(StubLlm::new(["x"])),
        )
        .unwrap();
        let restored = second.restore().await.unwrap();
        assert_eq!(restored, Some(saved));

        let a = first.corpus().read().await;
        let b = second.corpus().read().await;
        assert_eq!(a.count(), b.count());
        for position in 0..a.count() {
            assert_eq!(a.store().get(position).unwrap(), b.store().get(position).unwrap());
        }
        drop((a, b));

        assert_eq!(
            first.retrieve(QUESTION, None).await.unwrap(),
            second.retrieve(QUESTION, None).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_restore_without_snapshot_is_noop() {
        let dir = TempDir::new().unwrap();
        let engine = RagEngine::with_components(
            config(&dir.path().join("missing")),
            embedder(),
            Arc::new(StubLlm::new(["x"])),
        )
        .unwrap();

        assert_eq!(engine.restore().await.unwrap(), None);
        assert_eq!(engine.info().await.total_vectors, 0);
    }

    #[tokio::test]
    async fn test_load_with_wrong_dimension_keeps_corpus() {
        let dir = TempDir::new().unwrap();
        let engine = RagEngine::with_components(
            config(dir.path()),
            embedder(),
            Arc::new(StubLlm::new(["x"])),
        )
        .unwrap();
        engine.ingest(geography()).await.unwrap();
        engine.save_snapshot().await.unwrap();

        let other = RagEngine::with_components(
            config(dir.path()),
            Arc::new(StubEmbedder::new(3)),
            Arc::new(StubLlm::new(["x"])),
        )
        .unwrap();
        other
            .ingest(vec![ChunkRecord::new("kept")])
            .await
            .unwrap();

        assert!(matches!(
            other.load_snapshot().await,
            Err(SageError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert_eq!(other.info().await.total_vectors, 1);
    }

    #[tokio::test]
    async fn test_save_after_ingest() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir.path().join("auto"));
        config.snapshot.save_after_ingest = true;

        let engine =
            RagEngine::with_components(config, embedder(), Arc::new(StubLlm::new(["x"]))).unwrap();
        engine.ingest(geography()).await.unwrap();

        assert!(snapshot::exists(dir.path().join("auto")).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ingest_with_autosave_leaves_loadable_snapshot() {
        let dir = TempDir::new().unwrap();
        let snapshot_dir = dir.path().join("auto");
        let mut config = config(&snapshot_dir);
        config.snapshot.save_after_ingest = true;

        let engine = Arc::new(
            RagEngine::with_components(config, embedder(), Arc::new(StubLlm::new(["x"])))
                .unwrap(),
        );

        let mut tasks = Vec::new();
        for task in 0..8 {
            let engine = Arc::clone(&engine);
            tasks.push(tokio::spawn(async move {
                let records = (0..25)
                    .map(|i| ChunkRecord::new(format!("upload {task} chunk {i}")))
                    .collect();
                engine.ingest(records).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let loaded = snapshot::load(&snapshot_dir, 2).await.unwrap();
        assert_eq!(loaded.count(), 200);
        assert_eq!(loaded.store().len(), 200);
    }

    #[tokio::test]
    async fn test_load_keeps_query_cache() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.cache.enabled = true;

        let cached = CachedEmbeddingProvider::new(embedder(), &config.cache);
        let cache = cached.cache().clone();
        let mut engine =
            RagEngine::with_components(config, Arc::new(cached), Arc::new(StubLlm::new(["x"])))
                .unwrap();
        engine.cache = Some(cache);

        engine.ingest(geography()).await.unwrap();
        engine.save_snapshot().await.unwrap();
        engine.retrieve(QUESTION, None).await.unwrap();
        engine.retrieve(QUESTION, None).await.unwrap();

        engine.load_snapshot().await.unwrap();

        let stats = engine.cache_stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = AppConfig::default();
        config.rag.top_k = 0;

        assert!(matches!(
            RagEngine::with_components(config, embedder(), Arc::new(StubLlm::new(["x"]))),
            Err(SageError::ConfigError(_))
        ));
    }
}
