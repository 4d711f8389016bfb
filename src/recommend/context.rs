use anyhow::Context;
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::recommend::scorer::{GatedScorer, MlpScorer};
use crate::recommend::RecommendError;
use crate::semantic::{model_id_hash, VectorIndex, VectorStorage};

/// Read-only state every recommendation request shares.
///
/// Built once at startup and never mutated afterwards.
pub struct RecommenderContext {
    index: VectorIndex,
    catalog: Catalog,
    scorer: GatedScorer,
    retrieval_width: usize,
}

impl RecommenderContext {
    pub fn new(
        index: VectorIndex,
        catalog: Catalog,
        scorer: GatedScorer,
        retrieval_width: usize,
    ) -> Result<Self, RecommendError> {
        if index.is_empty() {
            return Err(RecommendError::Unavailable(
                "embedding table is empty".to_string(),
            ));
        }

        if catalog.is_empty() {
            return Err(RecommendError::Unavailable("catalog is empty".to_string()));
        }

        let unembedded = catalog.ids().iter().filter(|id| !index.contains(**id)).count();
        if unembedded > 0 {
            log::warn!("{unembedded} catalog books have no embedding and can only be skipped");
        }

        Ok(RecommenderContext {
            index,
            catalog,
            scorer,
            retrieval_width,
        })
    }

    /// Load vectors, catalog and the optional learned ranker named in `config`.
    pub fn load(config: &Config) -> anyhow::Result<Self> {
        let vectors_path = config.vectors_path();
        let storage = VectorStorage::new(vectors_path.clone());
        if !storage.exists() {
            anyhow::bail!(
                "{} not found, run `bookswipe build-index` first",
                storage.path().display()
            );
        }
        let index = storage
            .load(&model_id_hash(&config.embedding.model))
            .with_context(|| format!("failed to load {}", vectors_path.display()))?;
        log::info!("Loaded {} vectors from {}", index.len(), vectors_path.display());

        let catalog_path = config.catalog_path();
        let catalog = Catalog::load(&catalog_path)
            .with_context(|| format!("failed to load {}", catalog_path.display()))?;
        log::info!("Loaded {} books from {}", catalog.len(), catalog_path.display());

        let scorer = match &config.scorer.learned_model {
            None => GatedScorer::cosine(),
            Some(file) => {
                let path = config.resolve(file);
                match MlpScorer::load(&path, index.dimensions()) {
                    Ok(mlp) => {
                        log::info!("Loaded learned ranker from {}", path.display());
                        GatedScorer::with_learned(Box::new(mlp), config.scorer.min_score_spread)
                    }
                    Err(err) => {
                        log::warn!(
                            "Learned ranker at {} unusable ({err}), scoring by cosine only",
                            path.display()
                        );
                        GatedScorer::cosine()
                    }
                }
            }
        };

        Ok(Self::new(index, catalog, scorer, config.recommend.retrieval_width)?)
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn scorer(&self) -> &GatedScorer {
        &self.scorer
    }

    pub fn retrieval_width(&self) -> usize {
        self.retrieval_width
    }
}

/// Whether recommendation dependencies loaded.
///
/// There is no partial mode: any load failure makes every request fail with
/// `RecommendError::Unavailable`.
#[derive(Clone)]
pub enum Serving {
    Ready(Arc<RecommenderContext>),
    Unavailable(String),
}

impl Serving {
    pub fn from_config(config: &Config) -> Self {
        match RecommenderContext::load(config) {
            Ok(context) => Serving::Ready(Arc::new(context)),
            Err(err) => {
                log::error!("recommendations unavailable: {err:#}");
                Serving::Unavailable(format!("{err:#}"))
            }
        }
    }

    pub fn context(&self) -> Result<&Arc<RecommenderContext>, RecommendError> {
        match self {
            Serving::Ready(context) => Ok(context),
            Serving::Unavailable(reason) => Err(RecommendError::Unavailable(reason.clone())),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Serving::Ready(_))
    }
}
