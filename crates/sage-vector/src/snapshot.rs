//! Snapshot persistence for the paired index and chunk store
//!
//! A snapshot is a directory holding two files that are only meaningful
//! together: `index.bin` (bincode vector blob) and `documents.json`
//! (serialized chunk store). Loading stages both halves into a fresh corpus
//! and only swaps it in once both decoded and agree.

use crate::corpus::{IndexedCorpus, SharedCorpus};
use crate::index::VectorIndex;
use crate::store::ChunkStore;
use chrono::{DateTime, Utc};
use sage_core::{Chunk, Result, SageError};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const INDEX_FILE: &str = "index.bin";
pub const DOCUMENTS_FILE: &str = "documents.json";
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct IndexBlobRef<'a> {
    schema_version: u32,
    dimension: usize,
    count: usize,
    data: &'a [f32],
}

#[derive(Deserialize)]
struct IndexBlob {
    schema_version: u32,
    dimension: usize,
    count: usize,
    data: Vec<f32>,
}

#[derive(Serialize)]
struct DocumentsBlobRef<'a> {
    schema_version: u32,
    saved_at: DateTime<Utc>,
    chunks: &'a [Chunk],
}

#[derive(Deserialize)]
struct DocumentsBlob {
    schema_version: u32,
    #[allow(dead_code)]
    saved_at: DateTime<Utc>,
    chunks: Vec<Chunk>,
}

/// Summary of a saved or loaded snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub dir: PathBuf,
    pub total_vectors: usize,
    pub dimension: usize,
}

/// Encode both halves of a corpus
pub fn encode(corpus: &IndexedCorpus) -> Result<(Vec<u8>, Vec<u8>)> {
    let index = IndexBlobRef {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        dimension: corpus.dimension(),
        count: corpus.count(),
        data: corpus.index().raw(),
    };
    let index_bytes = bincode::serialize(&index)
        .map_err(|e| SageError::Other(anyhow::anyhow!("Failed to encode index: {e}")))?;

    let documents = DocumentsBlobRef {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        saved_at: Utc::now(),
        chunks: corpus.store().as_slice(),
    };
    let documents_bytes = serde_json::to_vec(&documents)?;

    Ok((index_bytes, documents_bytes))
}

/// Decode both halves into a fresh corpus
pub fn decode(index_bytes: &[u8], documents_bytes: &[u8]) -> Result<IndexedCorpus> {
    let index: IndexBlob = bincode::deserialize(index_bytes)
        .map_err(|e| SageError::CorruptSnapshot(format!("{INDEX_FILE}: {e}")))?;
    if index.schema_version != SNAPSHOT_SCHEMA_VERSION {
        return Err(SageError::CorruptSnapshot(format!(
            "{INDEX_FILE}: unsupported schema_version {} (expected {SNAPSHOT_SCHEMA_VERSION})",
            index.schema_version
        )));
    }

    let documents: DocumentsBlob = serde_json::from_slice(documents_bytes)
        .map_err(|e| SageError::CorruptSnapshot(format!("{DOCUMENTS_FILE}: {e}")))?;
    if documents.schema_version != SNAPSHOT_SCHEMA_VERSION {
        return Err(SageError::CorruptSnapshot(format!(
            "{DOCUMENTS_FILE}: unsupported schema_version {} (expected {SNAPSHOT_SCHEMA_VERSION})",
            documents.schema_version
        )));
    }

    let vector_index = VectorIndex::from_raw(index.dimension, index.count, index.data)
        .ok_or_else(|| {
            SageError::CorruptSnapshot(format!(
                "{INDEX_FILE}: data length does not match {} vectors of dimension {}",
                index.count, index.dimension
            ))
        })?;
    let store = ChunkStore::from_chunks(documents.chunks).ok_or_else(|| {
        SageError::CorruptSnapshot(format!("{DOCUMENTS_FILE}: chunk positions out of order"))
    })?;

    IndexedCorpus::from_parts(vector_index, store)
}

/// Write a snapshot of `corpus` into `dir`
///
/// The snapshot lock is held from encoding until both files are in place, so
/// concurrent saves never leave halves from different generations.
pub async fn save(corpus: &SharedCorpus, dir: impl AsRef<Path>) -> Result<SnapshotInfo> {
    let dir = dir.as_ref();
    let _saving = corpus.snapshot_lock().await;

    let (index_bytes, documents_bytes, info) = {
        let guard = corpus.read().await;
        let (index_bytes, documents_bytes) = encode(&guard)?;
        (index_bytes, documents_bytes, guard.info())
    };

    let target = dir.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        std::fs::create_dir_all(&target)?;
        write_atomic(&target, INDEX_FILE, &index_bytes)?;
        write_atomic(&target, DOCUMENTS_FILE, &documents_bytes)
    })
    .await
    .map_err(|e| SageError::Other(anyhow::anyhow!("Snapshot write task failed: {e}")))??;

    tracing::info!(
        "Snapshot saved to {} ({} vectors)",
        dir.display(),
        info.total_vectors
    );

    Ok(SnapshotInfo {
        dir: dir.to_path_buf(),
        total_vectors: info.total_vectors,
        dimension: info.embedding_dimension,
    })
}

/// Read a snapshot from `dir` into a fresh corpus
///
/// Fails with `CorruptSnapshot` when either file is missing or the halves
/// disagree, and with `DimensionMismatch` when the stored dimension differs
/// from `expected_dimension`.
pub async fn load(dir: impl AsRef<Path>, expected_dimension: usize) -> Result<IndexedCorpus> {
    let dir = dir.as_ref();

    let index_bytes = read_half(&dir.join(INDEX_FILE)).await?;
    let documents_bytes = read_half(&dir.join(DOCUMENTS_FILE)).await?;

    let corpus = decode(&index_bytes, &documents_bytes)?;
    if corpus.dimension() != expected_dimension {
        return Err(SageError::DimensionMismatch {
            expected: expected_dimension,
            actual: corpus.dimension(),
        });
    }

    Ok(corpus)
}

/// Load a snapshot and swap it into `corpus`
///
/// The live corpus is untouched unless the whole load succeeds.
pub async fn load_into(corpus: &SharedCorpus, dir: impl AsRef<Path>) -> Result<SnapshotInfo> {
    let dir = dir.as_ref();
    let _loading = corpus.snapshot_lock().await;
    let staged = load(dir, corpus.dimension()).await?;
    let info = staged.info();

    corpus.replace(staged).await?;

    tracing::info!(
        "Snapshot loaded from {} ({} vectors)",
        dir.display(),
        info.total_vectors
    );

    Ok(SnapshotInfo {
        dir: dir.to_path_buf(),
        total_vectors: info.total_vectors,
        dimension: info.embedding_dimension,
    })
}

/// True when `dir` holds at least one half of a snapshot
pub async fn exists(dir: impl AsRef<Path>) -> bool {
    let dir = dir.as_ref();
    for name in [INDEX_FILE, DOCUMENTS_FILE] {
        if tokio::fs::try_exists(dir.join(name)).await.unwrap_or(false) {
            return true;
        }
    }
    false
}

async fn read_half(path: &Path) -> Result<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SageError::CorruptSnapshot(
            format!("missing {}", path.display()),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Write through a uniquely named sibling, then rename over `name`
fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(name)).map_err(|e| SageError::Io(e.error))?;
    Ok(())
}
