//! Offline index build: catalog text -> normalized embedding table.

use indicatif::ProgressBar;

use crate::catalog::Catalog;
use crate::semantic::embeddings::{EmbeddingError, EmbeddingModel};
use crate::semantic::index::{normalize, IndexError, VectorIndex};
use crate::semantic::preprocess::book_text;

/// Anything that can turn a batch of texts into vectors.
pub trait Embedder {
    fn dimensions(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

impl Embedder for EmbeddingModel {
    fn dimensions(&self) -> usize {
        EmbeddingModel::dimensions(self)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        EmbeddingModel::embed_batch(self, texts)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("model returned {got} embeddings for a batch of {expected}")]
    BatchSizeMismatch { expected: usize, got: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub embedded: usize,
    pub skipped: usize,
}

/// Embed every catalog book with non-empty text, in catalog order.
///
/// Vectors are L2-normalized before they are stored so inner product equals
/// cosine similarity at query time.
pub fn build_index(
    catalog: &Catalog,
    embedder: &dyn Embedder,
    batch_size: usize,
    progress: &ProgressBar,
) -> Result<(VectorIndex, BuildReport), BuildError> {
    let mut report = BuildReport::default();
    let mut inputs: Vec<(u64, String)> = Vec::with_capacity(catalog.len());

    for book in catalog.iter() {
        match book_text(book) {
            Some(text) => inputs.push((book.book_id, text)),
            None => {
                log::debug!("book {} has no text, skipping", book.book_id);
                report.skipped += 1;
            }
        }
    }

    let mut index = VectorIndex::with_capacity(embedder.dimensions(), inputs.len());
    progress.set_length(inputs.len() as u64);

    for chunk in inputs.chunks(batch_size.max(1)) {
        let texts: Vec<String> = chunk.iter().map(|(_, text)| text.clone()).collect();
        let embeddings = embedder.embed_batch(&texts)?;

        if embeddings.len() != chunk.len() {
            return Err(BuildError::BatchSizeMismatch {
                expected: chunk.len(),
                got: embeddings.len(),
            });
        }

        for ((book_id, _), mut embedding) in chunk.iter().zip(embeddings) {
            normalize(&mut embedding);
            index.insert(*book_id, embedding)?;
            report.embedded += 1;
        }

        progress.inc(chunk.len() as u64);
    }

    progress.finish_and_clear();

    Ok((index, report))
}
