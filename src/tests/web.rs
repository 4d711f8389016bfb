use axum::{
    body::{Body, Bytes},
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use crate::{
    app::App,
    catalog::{Book, Catalog},
    config::Config,
    interactions::BackendCsv,
    recommend::{GatedScorer, RecommenderContext, Serving},
    semantic::VectorIndex,
    web::{self, BookResponse, HistoryEntry, StatusResponse},
};

fn ready_serving() -> Serving {
    let catalog = Catalog::from_books(vec![
        Book {
            book_id: 1,
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            genres: "Science Fiction".to_string(),
            avg_rating: 4.3,
            ..Default::default()
        },
        Book {
            book_id: 2,
            title: "Emma".to_string(),
            genres: "Romance, Classics".to_string(),
            ..Default::default()
        },
        Book {
            book_id: 3,
            title: "Hyperion".to_string(),
            genres: "Science Fiction".to_string(),
            ..Default::default()
        },
    ])
    .unwrap();

    let mut index = VectorIndex::new(2);
    index.insert(1, vec![1.0, 0.0]).unwrap();
    index.insert(2, vec![-1.0, 0.0]).unwrap();
    index.insert(3, vec![0.8, 0.6]).unwrap();

    let context = RecommenderContext::new(index, catalog, GatedScorer::cosine(), 2000).unwrap();
    Serving::Ready(Arc::new(context))
}

fn test_router(serving: Serving) -> (Router, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::load_with(tmp.path()).unwrap();
    let store = BackendCsv::load(config.interactions_path().to_str().unwrap()).unwrap();
    let app = App::new(config, Arc::new(store), serving);
    (web::router(app), tmp)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Bytes) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn health_is_ok() {
    let (router, _tmp) = test_router(ready_serving());

    let (status, body) = send(&router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test(flavor = "multi_thread")]
async fn like_and_pass_show_up_in_history() {
    let (router, _tmp) = test_router(ready_serving());

    let (status, body) = send(&router, post_json("/user/alice/like", r#"{"book_id":1}"#)).await;
    assert_eq!(status, StatusCode::OK);
    let body: StatusResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(body.status, "liked");

    let (status, body) = send(&router, post_json("/user/alice/pass", r#"{"book_id":2}"#)).await;
    assert_eq!(status, StatusCode::OK);
    let body: StatusResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(body.status, "passed");

    // liking twice does not duplicate
    send(&router, post_json("/user/alice/like", r#"{"book_id":1}"#)).await;

    let (status, body) = send(&router, get("/user/alice/history")).await;
    assert_eq!(status, StatusCode::OK);
    let history: Vec<HistoryEntry> = serde_json::from_slice(&body).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].book_id, 1);
    assert_eq!(history[1].book_id, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn recommend_excludes_seen_books() {
    let (router, _tmp) = test_router(ready_serving());
    send(&router, post_json("/user/alice/like", r#"{"book_id":1}"#)).await;

    let (status, body) = send(&router, get("/recommend?user_id=alice&n=5")).await;

    assert_eq!(status, StatusCode::OK);
    let recs: Vec<BookResponse> = serde_json::from_slice(&body).unwrap();
    let ids: Vec<u64> = recs.iter().map(|r| r.book_id).collect();
    assert_eq!(ids, vec![3, 2]);
    assert!(recs[0].score > recs[1].score);
    assert_eq!(recs[0].title, "Hyperion");
}

#[tokio::test(flavor = "multi_thread")]
async fn recommend_with_genres() {
    let (router, _tmp) = test_router(ready_serving());

    let (status, body) = send(&router, get("/recommend?user_id=bob&n=5&genres=romance")).await;

    assert_eq!(status, StatusCode::OK);
    let recs: Vec<BookResponse> = serde_json::from_slice(&body).unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].title, "Emma");
}

#[tokio::test(flavor = "multi_thread")]
async fn recommend_uses_default_count() {
    let (router, _tmp) = test_router(ready_serving());

    let (status, body) = send(&router, get("/recommend?user_id=carol")).await;

    assert_eq!(status, StatusCode::OK);
    let recs: Vec<BookResponse> = serde_json::from_slice(&body).unwrap();
    assert_eq!(recs.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn unavailable_recommender_answers_503() {
    let (router, _tmp) = test_router(Serving::Unavailable("vectors.bin missing".to_string()));

    let (status, body) = send(&router, get("/recommend?user_id=alice")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(body["error"].as_str().unwrap().contains("vectors.bin missing"));

    // interactions keep working
    let (status, _) = send(&router, post_json("/user/alice/like", r#"{"book_id":1}"#)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn recommend_requires_user_id() {
    let (router, _tmp) = test_router(ready_serving());

    let (status, _) = send(&router, get("/recommend?n=5")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
