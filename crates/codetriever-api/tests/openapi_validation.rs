mod test_utils;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use codetriever_api::routes::create_router;
use tower::ServiceExt;

#[tokio::test]
async fn openapi_document_lists_every_route() {
    let app = test_utils::build_test_app();
    let router = create_router(app.state);

    let request = Request::builder().uri("/api-docs/openapi.json").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let document: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    let paths = document["paths"].as_object().expect("paths object");
    for path in ["/query", "/index", "/status/{scope_id}"] {
        assert!(paths.contains_key(path), "missing path: {path}");
    }

    let schemas = document["components"]["schemas"].as_object().expect("schemas object");
    for schema in ["AgentResponse", "IndexResponse", "StatusResponse", "AgentErrorResponse"] {
        assert!(schemas.contains_key(schema), "missing schema: {schema}");
    }
}
