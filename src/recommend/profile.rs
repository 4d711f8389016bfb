use rand::Rng;

use crate::interactions::{Action, Interaction};
use crate::recommend::RecommendError;
use crate::semantic::{normalize, VectorIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    /// Mean of this many resolvable liked books
    Warm { liked: usize },
    /// Random stored embedding, the user has no usable likes
    Cold { row: usize },
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub vector: Vec<f32>,
    pub source: ProfileSource,
}

/// Derive the query vector for a user from their history.
///
/// Liked books missing from the embedding table are dropped. With at least
/// one resolvable like the profile is the normalized mean of the liked
/// embeddings, otherwise a uniformly random stored embedding is used as is.
pub fn build_profile<R: Rng + ?Sized>(
    index: &VectorIndex,
    history: &[Interaction],
    rng: &mut R,
) -> Result<Profile, RecommendError> {
    let liked_rows: Vec<usize> = history
        .iter()
        .filter(|i| i.action == Action::Like)
        .filter_map(|i| {
            let row = index.row_of(i.book_id);
            if row.is_none() {
                log::debug!("liked book {} has no embedding, skipping", i.book_id);
            }
            row
        })
        .collect();

    if !liked_rows.is_empty() {
        let mut vector = vec![0.0f32; index.dimensions()];
        for &row in &liked_rows {
            if let Some(embedding) = index.embedding(row) {
                for (acc, x) in vector.iter_mut().zip(embedding) {
                    *acc += x;
                }
            }
        }

        let n = liked_rows.len() as f32;
        for x in vector.iter_mut() {
            *x /= n;
        }
        normalize(&mut vector);

        return Ok(Profile {
            vector,
            source: ProfileSource::Warm {
                liked: liked_rows.len(),
            },
        });
    }

    if index.is_empty() {
        return Err(RecommendError::Unavailable(
            "embedding table is empty".to_string(),
        ));
    }

    let row = rng.random_range(0..index.len());
    let vector = index
        .embedding(row)
        .map(<[f32]>::to_vec)
        .ok_or_else(|| RecommendError::Unavailable(format!("embedding row {row} is missing")))?;

    Ok(Profile {
        vector,
        source: ProfileSource::Cold { row },
    })
}
