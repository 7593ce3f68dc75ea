//! Sage Vector - In-memory vector index and chunk store
//!
//! The index and the chunk store are positionally aligned: the vector at
//! position `i` embeds the chunk at position `i`. Both halves live inside a
//! single [`IndexedCorpus`] whose only mutation appends to both at once, and
//! [`SharedCorpus`] puts that pair behind one reader/writer lock.

pub mod corpus;
pub mod embedding;
pub mod index;
pub mod snapshot;
pub mod store;

pub use corpus::{IndexedCorpus, SharedCorpus};
pub use embedding::{
    create_embedding_provider, embed_document_or_zero, DocumentVector, OllamaEmbedding,
    OpenAiEmbedding,
};
pub use index::{l2_distance, VectorIndex};
pub use snapshot::SnapshotInfo;
pub use store::ChunkStore;
