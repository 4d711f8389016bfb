//! Vector infrastructure for book embeddings.
//!
//! # Architecture
//!
//! - `embeddings`: Wraps fastembed for embedding generation (offline build)
//! - `index`: In-memory embedding table with inner-product search
//! - `storage`: Binary file I/O for vectors.bin persistence
//! - `preprocess`: Text composed from catalog fields for embedding input
//! - `build`: Offline catalog -> vectors.bin pipeline

mod build;
mod embeddings;
mod index;
mod preprocess;
mod storage;

pub use build::build_index;
pub use embeddings::{model_id_hash, EmbeddingModel};
pub use index::{dot, l2_norm, normalize, IndexError, VectorIndex};
pub use storage::VectorStorage;

/// Default embedding model name
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
