use crate::semantic::{IndexError, VectorIndex};

/// A retrieved book, before filtering and scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub book_id: u64,
    pub row: usize,
    pub similarity: f32,
}

/// Fetch the `width` nearest neighbors of `profile`.
///
/// Order is the index's order: similarity descending, ties by row.
pub fn retrieve(
    index: &VectorIndex,
    profile: &[f32],
    width: usize,
) -> Result<Vec<Candidate>, IndexError> {
    let neighbors = index.search(profile, width)?;

    Ok(neighbors
        .into_iter()
        .filter_map(|n| {
            index.id_at(n.row).map(|book_id| Candidate {
                book_id,
                row: n.row,
                similarity: n.score,
            })
        })
        .collect())
}
