//! Exhaustive (flat) nearest-neighbour index over unit-normalized vectors.
//!
//! Every stored vector and every query is scaled to unit length, so the squared
//! Euclidean distance used for ranking equals `2 - 2 * cosine_similarity` and
//! ascending distance is descending similarity.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use docrag_core::error::{Error, Result};
use docrag_core::types::EmbeddingVector;

/// Euclidean length of `v`.
pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length in place. Returns `false` (leaving `v` untouched)
/// when the norm is zero or not finite.
pub fn l2_normalize(v: &mut [f32]) -> bool {
    let norm = magnitude(v);
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}

pub fn euclidean_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// A search hit: row position in the index and its squared distance to the query.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

// Heap order: larger distance first, then larger position, so the heap top is
// the worst of the current best-k and equal distances keep the earlier row.
impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.position.cmp(&other.position))
    }
}

/// Normalized vectors stored row-major in one contiguous buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn empty(dim: usize) -> Self {
        Self { dim, data: Vec::new() }
    }

    /// Normalize and store `vectors`. Every vector must have length `dim`
    /// and a non-zero norm.
    pub fn build(dim: usize, vectors: Vec<EmbeddingVector>) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidArgument("index dimension must be positive".into()));
        }
        let mut data = Vec::with_capacity(vectors.len() * dim);
        for (position, mut v) in vectors.into_iter().enumerate() {
            if v.len() != dim {
                return Err(Error::DimensionMismatch { expected: dim, actual: v.len() });
            }
            if !l2_normalize(&mut v) {
                return Err(Error::DegenerateVector { position });
            }
            data.extend_from_slice(&v);
        }
        Ok(Self { dim, data })
    }

    /// Wrap rows that are already normalized, as read back from disk.
    pub(crate) fn from_raw(dim: usize, data: Vec<f32>) -> Self {
        debug_assert!(dim > 0 && data.len() % dim == 0);
        Self { dim, data }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 { 0 } else { self.data.len() / self.dim }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dim)?;
        self.data.get(start..start.checked_add(self.dim)?)
    }

    pub(crate) fn raw(&self) -> &[f32] {
        &self.data
    }

    /// The `k` nearest rows by squared Euclidean distance, ascending; ties go to
    /// the lower position. An empty index or `k == 0` yields no hits.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query.len() });
        }
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let mut q = query.to_vec();
        if !l2_normalize(&mut q) {
            // the query is reported as position 0 of a one-vector batch
            return Err(Error::DegenerateVector { position: 0 });
        }

        let k = k.min(self.len());
        let mut heap: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(k + 1);
        for (position, row) in self.data.chunks_exact(self.dim).enumerate() {
            let candidate = Neighbor { position, distance: euclidean_distance_squared(&q, row) };
            if heap.len() < k {
                heap.push(candidate);
            } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                heap.pop();
                heap.push(candidate);
            }
        }
        Ok(heap.into_sorted_vec())
    }
}
