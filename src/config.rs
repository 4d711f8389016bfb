use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::semantic::DEFAULT_MODEL;

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_CATALOG_FILE: &str = "books.csv";
const DEFAULT_VECTORS_FILE: &str = "vectors.bin";
const DEFAULT_INTERACTIONS_FILE: &str = "interactions.csv";

/// Candidates pulled from the index before filtering
const DEFAULT_RETRIEVAL_WIDTH: usize = 2000;
/// Recommendations returned when the caller does not ask for a count
const DEFAULT_COUNT: usize = 10;
/// Learned scores with a smaller standard deviation are treated as untrained
const DEFAULT_MIN_SCORE_SPREAD: f32 = 0.01;
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 64;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecommendConfig {
    /// Number of nearest neighbors fetched per request
    #[serde(default = "default_retrieval_width")]
    pub retrieval_width: usize,

    /// Default number of recommendations
    #[serde(default = "default_count")]
    pub default_count: usize,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            retrieval_width: DEFAULT_RETRIEVAL_WIDTH,
            default_count: DEFAULT_COUNT,
        }
    }
}

fn default_retrieval_width() -> usize {
    DEFAULT_RETRIEVAL_WIDTH
}

fn default_count() -> usize {
    DEFAULT_COUNT
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Path to learned ranker weights (JSON). Relative paths resolve against
    /// the base directory. Cosine scoring only when unset.
    #[serde(default)]
    pub learned_model: Option<String>,

    /// Minimum standard deviation of a learned score batch
    #[serde(default = "default_min_score_spread")]
    pub min_score_spread: f32,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            learned_model: None,
            min_score_spread: DEFAULT_MIN_SCORE_SPREAD,
        }
    }
}

fn default_min_score_spread() -> f32 {
    DEFAULT_MIN_SCORE_SPREAD
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Texts per embedding call during index build
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        }
    }
}

fn default_embedding_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_embedding_batch_size() -> usize {
    DEFAULT_EMBEDDING_BATCH_SIZE
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_catalog_file")]
    pub catalog_file: String,
    #[serde(default = "default_vectors_file")]
    pub vectors_file: String,
    #[serde(default = "default_interactions_file")]
    pub interactions_file: String,

    #[serde(default)]
    pub recommend: RecommendConfig,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            catalog_file: default_catalog_file(),
            vectors_file: default_vectors_file(),
            interactions_file: default_interactions_file(),
            recommend: RecommendConfig::default(),
            scorer: ScorerConfig::default(),
            embedding: EmbeddingConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_catalog_file() -> String {
    DEFAULT_CATALOG_FILE.to_string()
}

fn default_vectors_file() -> String {
    DEFAULT_VECTORS_FILE.to_string()
}

fn default_interactions_file() -> String {
    DEFAULT_INTERACTIONS_FILE.to_string()
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.recommend.retrieval_width == 0 {
            bail!("recommend.retrieval_width must be greater than 0");
        }

        if self.recommend.default_count == 0 {
            bail!("recommend.default_count must be greater than 0");
        }

        let spread = self.scorer.min_score_spread;
        if spread.is_nan() || spread < 0.0 {
            bail!(
                "scorer.min_score_spread must be a non-negative number, got {}",
                self.scorer.min_score_spread
            );
        }

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be greater than 0");
        }

        Ok(())
    }

    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("failed to create {}", base_path.display()))?;

        let config_path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !config_path.exists() {
            let config = Self {
                base_path: base_path.to_path_buf(),
                ..Default::default()
            };
            config.save()?;
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_str = serde_yml::to_string(&self)?;
        let config_path = self.base_path.join(CONFIG_FILE);
        let temp_path = self.base_path.join(format!("{CONFIG_FILE}-tmp"));

        std::fs::write(&temp_path, config_str.as_bytes())?;
        std::fs::rename(&temp_path, &config_path)?;

        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a configured file name against the base directory.
    pub fn resolve(&self, file: &str) -> PathBuf {
        self.base_path.join(file)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.resolve(&self.catalog_file)
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.resolve(&self.vectors_file)
    }

    pub fn interactions_path(&self) -> PathBuf {
        self.resolve(&self.interactions_file)
    }
}
