mod common;

use axum::{
    http::{Method, StatusCode},
    response::IntoResponse,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use teamdesk::error::AppError;

use common::{register, send, test_app};

#[test]
fn test_app_error_display() {
    assert_eq!(AppError::NotFound("Project".to_string()).to_string(), "Project not found");
    assert_eq!(
        AppError::Forbidden("limit reached".to_string()).to_string(),
        "Forbidden: limit reached"
    );
    assert_eq!(
        AppError::InvalidRequestDetails { error: "Bad".to_string(), details: "why".to_string() }.to_string(),
        "Bad: why"
    );
}

#[tokio::test]
async fn test_internal_errors_are_not_leaked() {
    let response = AppError::DatabaseError("UNIQUE constraint failed: users.email".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({ "error": "Internal server error" }));

    let response = AppError::UpstreamError("LLM returned error status: 500".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_requests_without_valid_token_are_rejected() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, Method::GET, "/api/workforce", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing bearer token");

    let (status, body) = send(&app, Method::GET, "/api/projects", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/batch-upload",
        None,
        Some(json!({ "type": "consultants" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_resources_are_not_found() {
    let (app, _) = test_app().await;
    let token = register(&app, "missing@acme.test").await;
    let unknown = uuid::Uuid::new_v4();

    let (status, body) = send(&app, Method::GET, &format!("/api/workforce/{}", unknown), Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Consultant not found");

    let (status, body) = send(&app, Method::GET, &format!("/api/projects/{}", unknown), Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Project not found");

    let (status, _) = send(&app, Method::GET, "/api/recruitment/jobs/public/no-such-job", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_organizations_are_isolated() {
    let (app, _) = test_app().await;
    let first = register(&app, "first@acme.test").await;
    let second = register(&app, "second@globex.test").await;

    let (_, consultant) = send(
        &app,
        Method::POST,
        "/api/workforce",
        Some(&first),
        Some(json!({ "name": "Ada" })),
    )
    .await;
    let id = consultant["id"].as_str().unwrap();

    let (status, _) = send(&app, Method::GET, &format!("/api/workforce/{}", id), Some(&second), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::DELETE, &format!("/api/workforce/{}", id), Some(&second), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, list) = send(&app, Method::GET, "/api/workforce", Some(&second), None).await;
    assert!(list.as_array().unwrap().is_empty());

    // Same name is fine in another organization.
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/workforce",
        Some(&second),
        Some(json!({ "name": "Ada" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_malformed_query_parameters() {
    let (app, _) = test_app().await;
    let token = register(&app, "query@acme.test").await;

    let (status, _) = send(&app, Method::GET, "/api/metrics/forecast?months=30", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, Method::GET, "/api/metrics/utilization?target=120", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, Method::GET, "/api/bench?horizonDays=-1", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_out_of_range_dates_are_rejected() {
    let (app, _) = test_app().await;
    let token = register(&app, "far-dates@acme.test").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/projects",
        Some(&token),
        Some(json!({
            "name": "Forever",
            "client": "Globex",
            "startDate": "2025-01-01",
            "endDate": "+262142-12-31",
            "status": "Started"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Project dates must fall between"));

    let (status, _) = send(&app, Method::GET, "/api/bench?asOf=%2B262142-12-31", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, "/api/bench?asOf=2025-05-01", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["asOf"], "2025-05-01");
}
