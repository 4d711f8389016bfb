use rand::{seq::SliceRandom, Rng};
use std::{collections::HashSet, fmt::Display};

use crate::catalog::Catalog;
use crate::recommend::retrieve::Candidate;
use crate::semantic::{dot, VectorIndex};

/// Requested genres, lowercased. Empty means no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenreFilter {
    tokens: Vec<String>,
}

impl GenreFilter {
    /// Parse a comma-separated genre list such as `"Fantasy, sci"`.
    pub fn parse(genres: Option<&str>) -> Self {
        let tokens = genres
            .unwrap_or_default()
            .split(',')
            .map(|g| g.trim().to_lowercase())
            .filter(|g| !g.is_empty())
            .collect();

        GenreFilter { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// True when `genres` contains any requested token, ignoring case.
    pub fn matches(&self, genres: &str) -> bool {
        let genres = genres.to_lowercase();
        self.tokens.iter().any(|token| genres.contains(token.as_str()))
    }
}

impl Display for GenreFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tokens.join(","))
    }
}

/// Seen-exclusion and genre constraint over retrieved candidates.
pub struct CandidateFilter<'a> {
    pub catalog: &'a Catalog,
    pub index: &'a VectorIndex,
    /// Every book the user liked or passed
    pub seen: &'a HashSet<u64>,
    pub genres: &'a GenreFilter,
}

impl CandidateFilter<'_> {
    /// Filter retrieved candidates, broadening to a catalog scan when a genre
    /// constraint leaves nothing.
    pub fn run<R: Rng + ?Sized>(
        &self,
        candidates: Vec<Candidate>,
        profile: &[f32],
        count: usize,
        rng: &mut R,
    ) -> Vec<Candidate> {
        let survivors = self.apply(candidates);

        if !survivors.is_empty() || self.genres.is_empty() {
            return survivors;
        }

        log::info!(
            "vector search yielded no candidates for genres {:?}, scanning catalog",
            self.genres.to_string()
        );
        self.broaden(profile, count, rng)
    }

    /// Drop seen books and, under a genre constraint, books whose genres do
    /// not match. Books without metadata never match a constraint.
    pub fn apply(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates
            .into_iter()
            .filter(|c| !self.seen.contains(&c.book_id))
            .filter(|c| self.genre_allows(c.book_id))
            .collect()
    }

    /// Scan the whole catalog in random order for up to `count` unseen books
    /// matching the genre constraint that also have an embedding.
    pub fn broaden<R: Rng + ?Sized>(
        &self,
        profile: &[f32],
        count: usize,
        rng: &mut R,
    ) -> Vec<Candidate> {
        let mut ids = self.catalog.ids().to_vec();
        ids.shuffle(rng);

        let mut found = Vec::with_capacity(count);
        for book_id in ids {
            if found.len() >= count {
                break;
            }

            if self.seen.contains(&book_id) || !self.genre_allows(book_id) {
                continue;
            }

            let Some(row) = self.index.row_of(book_id) else {
                log::debug!("book {book_id} matches but has no embedding, skipping");
                continue;
            };

            let similarity = self
                .index
                .embedding(row)
                .map(|embedding| dot(profile, embedding))
                .unwrap_or_default();

            found.push(Candidate {
                book_id,
                row,
                similarity,
            });
        }

        found
    }

    fn genre_allows(&self, book_id: u64) -> bool {
        if self.genres.is_empty() {
            return true;
        }

        self.catalog
            .get(book_id)
            .is_some_and(|book| self.genres.matches(&book.genres))
    }
}
