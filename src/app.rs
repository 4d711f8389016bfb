use crate::{
    config::Config,
    interactions::{self, Action, Interaction, InteractionStore},
    recommend::{self, RecommendError, RecommendRequest, Recommendation, Serving},
};
use anyhow::Context;
use homedir::my_home;
use std::{path::PathBuf, sync::Arc};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl From<RecommendError> for AppError {
    fn from(err: RecommendError) -> Self {
        match err {
            RecommendError::Unavailable(reason) => AppError::Unavailable(reason),
            RecommendError::Interactions(err) => AppError::Other(err),
            other => AppError::Other(other.into()),
        }
    }
}

/// Resolve the data directory: `BOOKSWIPE_BASE_PATH` or
/// `~/.local/share/bookswipe`.
pub fn base_path() -> anyhow::Result<PathBuf> {
    if let Ok(base_path) = std::env::var("BOOKSWIPE_BASE_PATH") {
        return Ok(PathBuf::from(base_path));
    }

    let home = my_home()
        .context("could not determine home directory")?
        .context("home directory path is empty")?;

    Ok(home.join(".local/share/bookswipe"))
}

/// Interaction log plus the recommendation pipeline, shared by the CLI and
/// the daemon.
#[derive(Clone)]
pub struct App {
    config: Arc<Config>,
    interactions: Arc<dyn InteractionStore>,
    serving: Serving,
}

impl App {
    pub fn new(config: Config, interactions: Arc<dyn InteractionStore>, serving: Serving) -> Self {
        App {
            config: Arc::new(config),
            interactions,
            serving,
        }
    }

    /// Open the interaction log and load recommendation artifacts.
    ///
    /// Artifact failures leave the app running in the unavailable state; an
    /// unreadable interaction log is an error.
    pub fn load(config: Config) -> anyhow::Result<Self> {
        let interactions_path = config.interactions_path();
        let interactions = interactions::BackendCsv::load(&interactions_path.to_string_lossy())
            .with_context(|| format!("failed to open {}", interactions_path.display()))?;

        let serving = Serving::from_config(&config);

        Ok(Self::new(config, Arc::new(interactions), serving))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.serving.is_ready()
    }

    pub fn recommend(
        &self,
        user_id: &str,
        count: Option<usize>,
        genres: Option<&str>,
    ) -> Result<Vec<Recommendation>, AppError> {
        let context = self.serving.context()?;

        let request = RecommendRequest {
            user_id,
            count: count.unwrap_or(self.config.recommend.default_count),
            genres,
        };

        log::info!(
            "recommend for user {user_id}, count {}, genres {genres:?}",
            request.count
        );

        let mut rng = rand::rng();
        Ok(recommend::recommend(
            context,
            self.interactions.as_ref(),
            &request,
            &mut rng,
        )?)
    }

    pub fn record(&self, user_id: &str, book_id: u64, action: Action) -> Result<Interaction, AppError> {
        log::debug!("user {user_id} {action}s book {book_id}");
        Ok(self.interactions.record(user_id, book_id, action)?)
    }

    pub fn history(&self, user_id: &str) -> Result<Vec<Interaction>, AppError> {
        Ok(self.interactions.list(user_id)?)
    }
}
