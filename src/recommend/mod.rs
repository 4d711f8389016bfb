//! Recommendation pipeline.
//!
//! profile -> retrieve -> filter -> score, run synchronously per request
//! against a shared read-only [`RecommenderContext`].

mod context;
mod filter;
mod profile;
mod retrieve;
mod scorer;

use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;

use crate::catalog::Book;
use crate::interactions::InteractionStore;
use crate::semantic::IndexError;

pub use context::{RecommenderContext, Serving};
pub use filter::{CandidateFilter, GenreFilter};
pub use profile::{build_profile, ProfileSource};
pub use retrieve::{retrieve, Candidate};
pub use scorer::{GatedScorer, Scorer, ScorerError};

#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("recommendations unavailable: {0}")]
    Unavailable(String),

    #[error("interaction store error: {0:?}")]
    Interactions(anyhow::Error),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone)]
pub struct RecommendRequest<'a> {
    pub user_id: &'a str,
    pub count: usize,
    /// Comma-separated genres, matched case-insensitively
    pub genres: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    #[serde(flatten)]
    pub book: Book,
    pub score: f32,
}

/// Produce up to `request.count` ranked recommendations.
///
/// An empty list is a valid outcome when filtering leaves nothing.
pub fn recommend<R: Rng + ?Sized>(
    context: &RecommenderContext,
    store: &dyn InteractionStore,
    request: &RecommendRequest<'_>,
    rng: &mut R,
) -> Result<Vec<Recommendation>, RecommendError> {
    let history = store
        .list(request.user_id)
        .map_err(RecommendError::Interactions)?;

    let profile = build_profile(context.index(), &history, rng)?;
    match profile.source {
        ProfileSource::Warm { liked } => {
            log::debug!("user {} profile from {liked} liked books", request.user_id)
        }
        ProfileSource::Cold { row } => log::debug!(
            "user {} has no usable likes, seeding from book {:?}",
            request.user_id,
            context.index().id_at(row)
        ),
    }

    let candidates = retrieve(context.index(), &profile.vector, context.retrieval_width())?;

    let seen: HashSet<u64> = history.iter().map(|i| i.book_id).collect();
    let genres = GenreFilter::parse(request.genres);
    let filter = CandidateFilter {
        catalog: context.catalog(),
        index: context.index(),
        seen: &seen,
        genres: &genres,
    };
    let survivors = filter.run(candidates, &profile.vector, request.count, rng);

    if survivors.is_empty() {
        log::info!("no candidates left for user {}", request.user_id);
        return Ok(vec![]);
    }

    Ok(rank(context, &profile.vector, &survivors, request.count))
}

/// Score survivors, sort by score (ties keep retrieval order) and keep the
/// first `count` that have metadata.
pub fn rank(
    context: &RecommenderContext,
    profile: &[f32],
    survivors: &[Candidate],
    count: usize,
) -> Vec<Recommendation> {
    let scorable: Vec<(&Candidate, &[f32])> = survivors
        .iter()
        .filter_map(|c| context.index().embedding(c.row).map(|e| (c, e)))
        .collect();
    let embeddings: Vec<&[f32]> = scorable.iter().map(|(_, e)| *e).collect();

    let (scores, origin) = context.scorer().score(profile, &embeddings);
    log::debug!("scored {} candidates with {origin:?}", scores.len());

    let mut ranked: Vec<(&Candidate, f32)> = scorable
        .iter()
        .map(|(c, _)| *c)
        .zip(scores)
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    ranked
        .into_iter()
        .filter_map(|(candidate, score)| {
            let book = context.catalog().get(candidate.book_id);
            if book.is_none() {
                log::debug!("book {} has no metadata, dropping", candidate.book_id);
            }
            book.map(|book| Recommendation {
                book: book.clone(),
                score,
            })
        })
        .take(count)
        .collect()
}
