mod test_utils;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use codetriever_api::routes::create_router;
use tower::ServiceExt;

#[tokio::test]
async fn health_check_reports_healthy() {
    let app = test_utils::build_test_app();
    let router = create_router(app.state);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "codetriever-api");
}
