//! End-to-end `/index` then `/query` against the real router, in-memory
//! vector store, and stub embedding provider.

mod test_utils;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use codetriever_api::routes::create_router;
use serde_json::{Value, json};
use tower::ServiceExt;

const SCOPE: &str = "demo-scope";

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn index_then_query_round_trip() {
    let app = test_utils::build_test_app();
    test_utils::write_fixture_files(&app.workspace_path());
    let router = create_router(app.state.clone());

    let index_request = Request::builder()
        .method("POST")
        .uri("/index")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "scopeId": SCOPE }).to_string()))
        .unwrap();
    let index_response = router.clone().oneshot(index_request).await.unwrap();
    assert_eq!(index_response.status(), StatusCode::OK);

    let index_body = body_json(index_response).await;
    assert_eq!(index_body["filesDiscovered"], 2);
    assert!(index_body["chunksStored"].as_u64().unwrap() > 0);
    assert_eq!(index_body["errorCount"], 0);

    let status_request = Request::builder()
        .method("GET")
        .uri(format!("/status/{SCOPE}"))
        .body(Body::empty())
        .unwrap();
    let status_response = router.clone().oneshot(status_request).await.unwrap();
    assert_eq!(status_response.status(), StatusCode::OK);
    let status_body = body_json(status_response).await;
    let index_revision = status_body["indexRevision"].as_str().unwrap().to_string();
    let engine_config_hash = status_body["engineConfigHash"].as_str().unwrap().to_string();

    let query_request = Request::builder()
        .method("POST")
        .uri("/query")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "scopeId": SCOPE,
                "query": "what does the add function do?",
                "mode": "instant",
                "indexRevision": index_revision,
                "engineConfigHash": engine_config_hash,
            })
            .to_string(),
        ))
        .unwrap();
    let query_response = router.clone().oneshot(query_request).await.unwrap();
    assert_eq!(query_response.status(), StatusCode::OK);

    let query_body = body_json(query_response).await;
    assert_eq!(query_body["meta"]["schemaVersion"], "agent-response-v1");
    assert_eq!(query_body["meta"]["indexVersion"], index_revision);
    assert!(query_body["confidence"].as_f64().unwrap() >= 0.0);
    assert!(!query_body["answer"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn repeated_identical_query_is_served_from_cache() {
    let app = test_utils::build_test_app();
    test_utils::write_fixture_files(&app.workspace_path());
    let router = create_router(app.state.clone());

    let index_request = Request::builder()
        .method("POST")
        .uri("/index")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "scopeId": SCOPE }).to_string()))
        .unwrap();
    router.clone().oneshot(index_request).await.unwrap();

    let status_request = Request::builder()
        .method("GET")
        .uri(format!("/status/{SCOPE}"))
        .body(Body::empty())
        .unwrap();
    let status_response = router.clone().oneshot(status_request).await.unwrap();
    let status_body = body_json(status_response).await;
    let index_revision = status_body["indexRevision"].as_str().unwrap().to_string();
    let engine_config_hash = status_body["engineConfigHash"].as_str().unwrap().to_string();

    let make_query_request = || {
        Request::builder()
            .method("POST")
            .uri("/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({
                    "scopeId": SCOPE,
                    "query": "what does the add function do?",
                    "mode": "instant",
                    "indexRevision": index_revision,
                    "engineConfigHash": engine_config_hash,
                })
                .to_string(),
            ))
            .unwrap()
    };

    let first = router.clone().oneshot(make_query_request()).await.unwrap();
    let first_body = body_json(first).await;
    assert_eq!(first_body["meta"]["cached"], false);

    let second = router.oneshot(make_query_request()).await.unwrap();
    let second_body = body_json(second).await;
    assert_eq!(second_body["meta"]["cached"], true);
    assert_eq!(first_body["answer"], second_body["answer"]);
}

#[tokio::test]
async fn status_for_unindexed_scope_is_not_found() {
    let app = test_utils::build_test_app();
    let router = create_router(app.state.clone());

    let request = Request::builder()
        .method("GET")
        .uri("/status/never-indexed")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn query_rejects_unknown_mode() {
    let app = test_utils::build_test_app();
    let router = create_router(app.state.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/query")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "scopeId": SCOPE,
                "query": "anything",
                "mode": "bogus",
                "indexRevision": "rev",
                "engineConfigHash": "hash",
            })
            .to_string(),
        ))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
