//! Exact nearest-neighbour index over Euclidean (L2) distance
//!
//! Vectors are stored contiguously in insertion order; a vector's position
//! is its insertion index and never changes.

use sage_core::{Result, SageError};
use std::cmp::Ordering;

/// Flat L2 vector index
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    count: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimension` components
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            count: 0,
            data: Vec::new(),
        }
    }

    /// Rebuild an index from its flat representation
    pub(crate) fn from_raw(dimension: usize, count: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != dimension.checked_mul(count)? {
            return None;
        }
        Some(Self {
            dimension,
            count,
            data,
        })
    }

    /// Configured vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed vectors
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Flat vector data in position order
    pub(crate) fn raw(&self) -> &[f32] {
        &self.data
    }

    /// Vector stored at `position`
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.count {
            return None;
        }
        let start = position * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// Fail with `DimensionMismatch` unless `vector` has the index dimension
    pub fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(SageError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Append vectors in order
    ///
    /// Every vector is checked before anything is appended, so a mismatch
    /// leaves the index unchanged.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for vector in vectors {
            self.check_dimension(vector)?;
        }

        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        self.count += vectors.len();
        Ok(())
    }

    /// Find the `k` nearest vectors to `query`
    ///
    /// Returns `(position, distance)` pairs sorted by ascending distance, ties
    /// broken by ascending position. Vectors whose distance is not finite are
    /// treated as "no match" and never returned.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        self.check_dimension(query)?;

        if k == 0 || self.count == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<(usize, f32)> = (0..self.count)
            .filter_map(|position| {
                let start = position * self.dimension;
                let distance = l2_distance(query, &self.data[start..start + self.dimension]);
                distance.is_finite().then_some((position, distance))
            })
            .collect();

        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, compare_hits);
            hits.truncate(k);
        }
        hits.sort_unstable_by(compare_hits);

        Ok(hits)
    }
}

fn compare_hits(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0))
}

/// Euclidean distance between two equal-length vectors
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}
