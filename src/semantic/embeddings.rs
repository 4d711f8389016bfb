//! Sentence encoder used by `build-index` to turn book text into vectors.
//!
//! Weights are fetched by fastembed into `<base>/models` the first time a
//! model is used and reused from there afterwards.

use fastembed::{InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Mutex;

/// Catalog encoders `build-index` accepts, by configured name.
const SUPPORTED_MODELS: [&str; 6] = [
    "all-MiniLM-L6-v2",
    "all-MiniLM-L6-v2-q",
    "bge-small-en-v1.5",
    "bge-small-en-v1.5-q",
    "bge-base-en-v1.5",
    "bge-base-en-v1.5-q",
];

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("unknown embedding model {0:?}, expected one of: {list}", list = SUPPORTED_MODELS.join(", "))]
    UnknownModel(String),

    #[error("could not prepare model cache: {0}")]
    Cache(#[from] std::io::Error),

    #[error("could not load {model}: {reason}")]
    Load { model: String, reason: String },

    #[error("encoding failed: {0}")]
    Encode(String),
}

/// A loaded fastembed encoder. `embed` needs `&mut`, hence the mutex.
pub struct EmbeddingModel {
    encoder: Mutex<TextEmbedding>,
    name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    /// Load `name`, downloading into `<base_dir>/models` when not cached.
    pub fn new(name: &str, base_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let variant =
            resolve_model(name).ok_or_else(|| EmbeddingError::UnknownModel(name.to_string()))?;

        let cache = base_dir.join("models");
        std::fs::create_dir_all(&cache)?;

        let options = InitOptions::new(variant)
            .with_cache_dir(cache)
            .with_show_download_progress(true);
        let mut encoder = TextEmbedding::try_new(options).map_err(|e| EmbeddingError::Load {
            model: name.to_string(),
            reason: e.to_string(),
        })?;

        // fastembed does not expose the output width, so encode a title once
        let dimensions = encoder
            .embed(vec!["Moby Dick"], None)
            .map_err(|e| EmbeddingError::Encode(e.to_string()))?
            .first()
            .map(Vec::len)
            .filter(|len| *len > 0)
            .ok_or_else(|| EmbeddingError::Load {
                model: name.to_string(),
                reason: "model produced an empty vector".to_string(),
            })?;

        log::debug!("{name} loaded, {dimensions} dimensions");

        Ok(Self {
            encoder: Mutex::new(encoder),
            name: name.to_string(),
            dimensions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Encode a batch of book texts, one vector per text in input order.
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut encoder = self
            .encoder
            .lock()
            .map_err(|_| EmbeddingError::Encode("encoder lock poisoned".to_string()))?;

        encoder
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::Encode(e.to_string()))
    }

    /// Identifier written into vectors.bin for this model.
    pub fn model_id_hash(&self) -> [u8; 32] {
        model_id_hash(&self.name)
    }
}

/// Map a configured name onto fastembed's variant, ignoring case.
fn resolve_model(name: &str) -> Option<fastembed::EmbeddingModel> {
    use fastembed::EmbeddingModel as Variant;

    let variant = match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" => Variant::AllMiniLML6V2,
        "all-minilm-l6-v2-q" => Variant::AllMiniLML6V2Q,
        "bge-small-en-v1.5" => Variant::BGESmallENV15,
        "bge-small-en-v1.5-q" => Variant::BGESmallENV15Q,
        "bge-base-en-v1.5" => Variant::BGEBaseENV15,
        "bge-base-en-v1.5-q" => Variant::BGEBaseENV15Q,
        _ => return None,
    };

    Some(variant)
}

/// SHA256 of a model name. The serving side checks vectors.bin against the
/// configured model without loading it.
pub fn model_id_hash(model_name: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(model_name.to_lowercase().as_bytes());
    hasher.finalize().into()
}
