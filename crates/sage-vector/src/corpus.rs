//! Paired vector index and chunk store
//!
//! `IndexedCorpus` is the only owner of both halves and exposes them as
//! read-only views. Its single mutation appends vectors and chunks together,
//! so `index().count() == store().len()` holds for every reachable state.

use crate::index::VectorIndex;
use crate::store::ChunkStore;
use sage_core::{ChunkRecord, IndexInfo, Result, SageError};
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard};

/// Vector index and chunk store kept in lock-step
#[derive(Debug, Clone)]
pub struct IndexedCorpus {
    index: VectorIndex,
    store: ChunkStore,
}

impl IndexedCorpus {
    /// Create an empty corpus for vectors of `dimension` components
    pub fn new(dimension: usize) -> Self {
        Self {
            index: VectorIndex::new(dimension),
            store: ChunkStore::new(),
        }
    }

    /// Pair a rebuilt index and store, rejecting mismatched counts
    pub(crate) fn from_parts(index: VectorIndex, store: ChunkStore) -> Result<Self> {
        if index.count() != store.len() {
            return Err(SageError::CorruptSnapshot(format!(
                "index holds {} vectors but store holds {} chunks",
                index.count(),
                store.len()
            )));
        }
        Ok(Self { index, store })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn count(&self) -> usize {
        self.index.count()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn info(&self) -> IndexInfo {
        IndexInfo {
            total_vectors: self.count(),
            embedding_dimension: self.dimension(),
        }
    }

    /// Append `(vector, record)` pairs, returning the assigned positions
    ///
    /// All vectors are validated before either half is touched; on
    /// `DimensionMismatch` the corpus is unchanged.
    pub fn append_batch(&mut self, batch: Vec<(Vec<f32>, ChunkRecord)>) -> Result<Range<usize>> {
        for (vector, _) in &batch {
            self.index.check_dimension(vector)?;
        }

        let start = self.count();
        let (vectors, records): (Vec<_>, Vec<_>) = batch.into_iter().unzip();

        self.index.add(&vectors)?;
        for record in records {
            self.store.append(record);
        }

        debug_assert_eq!(self.index.count(), self.store.len());
        Ok(start..self.count())
    }
}

/// Shared handle to one corpus behind a reader/writer lock
///
/// Searches take the read lock and run in parallel; appends and snapshot
/// swaps take the write lock for the whole batch. Snapshot saves and loads
/// additionally hold `snapshot_lock` so only one runs at a time.
#[derive(Debug, Clone)]
pub struct SharedCorpus {
    inner: Arc<RwLock<IndexedCorpus>>,
    snapshot: Arc<Mutex<()>>,
    dimension: usize,
}

impl SharedCorpus {
    /// Create an empty shared corpus
    pub fn new(dimension: usize) -> Self {
        Self::from_corpus(IndexedCorpus::new(dimension))
    }

    /// Share an existing corpus
    pub fn from_corpus(corpus: IndexedCorpus) -> Self {
        Self {
            dimension: corpus.dimension(),
            inner: Arc::new(RwLock::new(corpus)),
            snapshot: Arc::new(Mutex::new(())),
        }
    }

    /// Dimension fixed at construction
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Acquire a read view
    pub async fn read(&self) -> RwLockReadGuard<'_, IndexedCorpus> {
        self.inner.read().await
    }

    /// Serialize snapshot I/O over this corpus
    ///
    /// Taken before the read or write lock, never while holding either.
    pub async fn snapshot_lock(&self) -> MutexGuard<'_, ()> {
        self.snapshot.lock().await
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.count()
    }

    pub async fn info(&self) -> IndexInfo {
        self.inner.read().await.info()
    }

    /// Append a batch under the write lock
    pub async fn append_batch(
        &self,
        batch: Vec<(Vec<f32>, ChunkRecord)>,
    ) -> Result<Range<usize>> {
        let mut corpus = self.inner.write().await;
        corpus.append_batch(batch)
    }

    /// Swap in a fully staged corpus
    pub async fn replace(&self, corpus: IndexedCorpus) -> Result<()> {
        if corpus.dimension() != self.dimension {
            return Err(SageError::DimensionMismatch {
                expected: self.dimension,
                actual: corpus.dimension(),
            });
        }
        *self.inner.write().await = corpus;
        Ok(())
    }
}
