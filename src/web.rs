use crate::{
    app::{App, AppError},
    interactions::{Action, Interaction},
    recommend::Recommendation,
};
use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
pub struct SharedState {
    app: App,
}

pub fn router(app: App) -> Router {
    let shared_state = Arc::new(SharedState { app });

    Router::new()
        .route("/health", get(health))
        .route("/user/:user_id/like", post(like))
        .route("/user/:user_id/pass", post(pass))
        .route("/user/:user_id/history", get(history))
        .route("/recommend", get(recommend))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

async fn start_app(app: App) -> anyhow::Result<()> {
    let addr = app.config().listen_addr.clone();

    if !app.is_ready() {
        log::warn!("starting without recommendations, /recommend will answer 503");
    }

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("listening on {addr}");

    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(app: App) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(app))
}

#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Other(_) => {
                log::error!("{self:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub book_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

async fn like(
    State(state): State<Arc<SharedState>>,
    Path(user_id): Path<String>,
    Json(payload): Json<InteractionRequest>,
) -> Result<Json<StatusResponse>, HttpError> {
    tokio::task::block_in_place(move || {
        state.app.record(&user_id, payload.book_id, Action::Like)?;
        Ok(Json(StatusResponse {
            status: "liked".to_string(),
        }))
    })
}

async fn pass(
    State(state): State<Arc<SharedState>>,
    Path(user_id): Path<String>,
    Json(payload): Json<InteractionRequest>,
) -> Result<Json<StatusResponse>, HttpError> {
    tokio::task::block_in_place(move || {
        state.app.record(&user_id, payload.book_id, Action::Pass)?;
        Ok(Json(StatusResponse {
            status: "passed".to_string(),
        }))
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub book_id: u64,
    pub action: Action,
}

impl From<Interaction> for HistoryEntry {
    fn from(interaction: Interaction) -> Self {
        HistoryEntry {
            book_id: interaction.book_id,
            action: interaction.action,
        }
    }
}

async fn history(
    State(state): State<Arc<SharedState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>, HttpError> {
    tokio::task::block_in_place(move || {
        let history = state.app.history(&user_id)?;
        Ok(Json(history.into_iter().map(HistoryEntry::from).collect()))
    })
}

#[derive(Debug, Deserialize)]
pub struct RecommendQuery {
    pub user_id: String,
    pub n: Option<usize>,
    pub genres: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookResponse {
    pub book_id: u64,
    pub title: String,
    pub author: String,
    pub description: String,
    pub genres: String,
    pub avg_rating: f32,
    pub score: f32,
}

impl From<Recommendation> for BookResponse {
    fn from(rec: Recommendation) -> Self {
        BookResponse {
            book_id: rec.book.book_id,
            title: rec.book.title,
            author: rec.book.author,
            description: rec.book.description,
            genres: rec.book.genres,
            avg_rating: rec.book.avg_rating,
            score: rec.score,
        }
    }
}

async fn recommend(
    State(state): State<Arc<SharedState>>,
    Query(query): Query<RecommendQuery>,
) -> Result<Json<Vec<BookResponse>>, HttpError> {
    log::debug!("query: {query:?}");

    tokio::task::block_in_place(move || {
        let recs = state
            .app
            .recommend(&query.user_id, query.n, query.genres.as_deref())?;
        Ok(Json(recs.into_iter().map(BookResponse::from).collect()))
    })
}
