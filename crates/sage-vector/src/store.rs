//! Append-only chunk store, positionally aligned with the vector index

use sage_core::{Chunk, ChunkRecord, Result, SageError};

/// Ordered sequence of indexed chunks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkStore {
    chunks: Vec<Chunk>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted chunks
    ///
    /// Returns `None` unless every chunk's position equals its index.
    pub(crate) fn from_chunks(chunks: Vec<Chunk>) -> Option<Self> {
        chunks
            .iter()
            .enumerate()
            .all(|(i, chunk)| chunk.position == i)
            .then_some(Self { chunks })
    }

    /// Append a record, returning its position
    pub fn append(&mut self, record: ChunkRecord) -> usize {
        let position = self.chunks.len();
        self.chunks.push(Chunk::from_record(record, position));
        position
    }

    /// Chunk at `position`, or `NotFound`
    pub fn get(&self, position: usize) -> Result<&Chunk> {
        self.chunks.get(position).ok_or(SageError::NotFound {
            position,
            len: self.chunks.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    pub(crate) fn as_slice(&self) -> &[Chunk] {
        &self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_assigns_positions() {
        let mut store = ChunkStore::new();
        assert_eq!(store.append(ChunkRecord::new("a")), 0);
        assert_eq!(store.append(ChunkRecord::new("b")), 1);

        let chunk = store.get(1).unwrap();
        assert_eq!(chunk.text, "b");
        assert_eq!(chunk.position, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_get_out_of_range() {
        let mut store = ChunkStore::new();
        store.append(ChunkRecord::new("a"));

        assert!(matches!(
            store.get(5),
            Err(SageError::NotFound {
                position: 5,
                len: 1
            })
        ));
    }

    #[test]
    fn test_from_chunks_validates_positions() {
        let good = vec![
            Chunk::from_record(ChunkRecord::new("a"), 0),
            Chunk::from_record(ChunkRecord::new("b"), 1),
        ];
        assert!(ChunkStore::from_chunks(good).is_some());

        let shuffled = vec![
            Chunk::from_record(ChunkRecord::new("b"), 1),
            Chunk::from_record(ChunkRecord::new("a"), 0),
        ];
        assert!(ChunkStore::from_chunks(shuffled).is_none());
    }
}
