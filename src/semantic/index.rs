//! In-memory vector index with inner-product search.
//!
//! Stores book embeddings in row order and answers top-k nearest neighbor
//! queries. Rows are assigned in insertion order and never move, so a row
//! index stays valid for the lifetime of the index.

use std::collections::HashMap;

/// In-memory vector index over book embeddings.
///
/// Supports:
/// - Append-only inserts keyed by book ID
/// - Book ID -> row lookups
/// - Exact top-k search by inner product
pub struct VectorIndex {
    /// Book ID per row
    ids: Vec<u64>,
    /// Embedding per row
    rows: Vec<Vec<f32>>,
    /// Book ID -> row
    positions: HashMap<u64, usize>,
    /// Expected embedding dimensions
    dimensions: usize,
}

/// A single nearest-neighbor hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row in the index
    pub row: usize,
    /// Inner product with the query
    pub score: f32,
}

impl VectorIndex {
    /// Create a new empty vector index with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self::with_capacity(dimensions, 0)
    }

    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            rows: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
            dimensions,
        }
    }

    /// Get the expected embedding dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Get the number of rows in the index.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append an embedding for a book.
    ///
    /// Returns the row the embedding was stored at. A book may only be
    /// inserted once; the ID -> row mapping is injective.
    pub fn insert(&mut self, id: u64, embedding: Vec<f32>) -> Result<usize, IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        if self.positions.contains_key(&id) {
            return Err(IndexError::DuplicateId(id));
        }

        let row = self.rows.len();
        self.ids.push(id);
        self.rows.push(embedding);
        self.positions.insert(id, row);

        Ok(row)
    }

    /// Row of a book, if it is indexed.
    pub fn row_of(&self, id: u64) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Book ID stored at `row`.
    pub fn id_at(&self, row: usize) -> Option<u64> {
        self.ids.get(row).copied()
    }

    /// Embedding stored at `row`.
    pub fn embedding(&self, row: usize) -> Option<&[f32]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    /// Check if an entry exists for the given book ID.
    pub fn contains(&self, id: u64) -> bool {
        self.positions.contains_key(&id)
    }

    /// Iterate over all (book ID, embedding) pairs in row order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[f32])> {
        self.ids
            .iter()
            .copied()
            .zip(self.rows.iter().map(Vec::as_slice))
    }

    /// Search for the `k` rows with the highest inner product to `query`.
    ///
    /// The query is used as given; callers normalize it. Results are sorted
    /// by score descending, equal scores keep row order. When `k` exceeds the
    /// number of rows every row is returned.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut results: Vec<Neighbor> = self
            .rows
            .iter()
            .enumerate()
            .map(|(row, embedding)| Neighbor {
                row,
                score: dot(query, embedding),
            })
            .collect();

        // sort_by is stable, ties stay in row order
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);

        Ok(results)
    }
}

/// Inner product of two equally sized vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm < f32::EPSILON {
        return;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Book {0} is already indexed")]
    DuplicateId(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_index() {
        let index = VectorIndex::new(384);
        assert_eq!(index.dimensions(), 384);
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_insert_assigns_rows_in_order() {
        let mut index = VectorIndex::new(3);

        assert_eq!(index.insert(10, vec![1.0, 0.0, 0.0]).unwrap(), 0);
        assert_eq!(index.insert(7, vec![0.0, 1.0, 0.0]).unwrap(), 1);

        assert_eq!(index.row_of(10), Some(0));
        assert_eq!(index.row_of(7), Some(1));
        assert_eq!(index.id_at(1), Some(7));
        assert_eq!(index.embedding(0), Some(&[1.0, 0.0, 0.0][..]));
        assert_eq!(index.row_of(99), None);
    }

    #[test]
    fn test_insert_dimension_mismatch() {
        let mut index = VectorIndex::new(3);
        let wrong_dims = vec![1.0, 0.0, 0.0, 0.0];

        let result = index.insert(1, wrong_dims);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let mut index = VectorIndex::new(3);
        index.insert(1, vec![1.0, 0.0, 0.0]).unwrap();

        let result = index.insert(1, vec![0.0, 1.0, 0.0]);
        assert!(matches!(result, Err(IndexError::DuplicateId(1))));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_search_orders_by_inner_product() {
        let mut index = VectorIndex::new(3);
        index.insert(1, vec![0.0, 1.0, 0.0]).unwrap();
        index.insert(2, vec![1.0, 0.0, 0.0]).unwrap();
        index.insert(3, vec![-1.0, 0.0, 0.0]).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 10).unwrap();

        let rows: Vec<usize> = results.iter().map(|n| n.row).collect();
        assert_eq!(rows, vec![1, 0, 2]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!((results[2].score + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_ties_keep_insertion_order() {
        let mut index = VectorIndex::new(2);
        for id in [5, 3, 9, 1] {
            index.insert(id, vec![1.0, 0.0]).unwrap();
        }

        let results = index.search(&[1.0, 0.0], 4).unwrap();
        let rows: Vec<usize> = results.iter().map(|n| n.row).collect();
        assert_eq!(rows, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_search_with_limit() {
        let mut index = VectorIndex::new(3);

        for i in 0..10 {
            index.insert(i, vec![1.0, i as f32 * 0.1, 0.0]).unwrap();
        }

        let results = index.search(&[1.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_search_k_larger_than_index_returns_all() {
        let mut index = VectorIndex::new(2);
        index.insert(1, vec![1.0, 0.0]).unwrap();
        index.insert(2, vec![0.0, 1.0]).unwrap();

        let results = index.search(&[1.0, 0.0], 2000).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_search_does_not_normalize_query() {
        let mut index = VectorIndex::new(2);
        index.insert(1, vec![1.0, 0.0]).unwrap();

        let results = index.search(&[3.0, 0.0], 1).unwrap();
        assert!((results[0].score - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let index = VectorIndex::new(3);
        let result = index.search(&[1.0, 0.0], 5);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
