#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use teamdesk::{config::Config, create_app, db, AppState};

/// Config for tests: in-memory SQLite, no rate limiting, fast retries.
pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        rate_limit_per_minute: 0,
        retry_max_elapsed_secs: 1,
        http_timeout_secs: 5,
        ..Config::default()
    }
}

pub async fn test_app_with(config: Config) -> (Router, AppState) {
    let db = db::connect(&config.database_url).await.unwrap();
    let state = AppState::new(db, config);
    (create_app(state.clone()), state)
}

pub async fn test_app() -> (Router, AppState) {
    test_app_with(test_config()).await
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    read(app.clone().oneshot(request).await.unwrap()).await
}

pub async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

/// Registers a fresh organization and returns the admin's token.
pub async fn register(app: &Router, email: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "organizationName": "Acme Consulting", "name": "Admin", "email": email })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    body["token"].as_str().unwrap().to_string()
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_fake(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// An OpenAI-compatible chat endpoint that always answers `reply`.
pub fn fake_llm(reply: &'static str) -> Router {
    Router::new().route(
        "/chat/completions",
        axum::routing::post(move || async move {
            axum::Json(json!({ "choices": [{ "message": { "content": reply } }] }))
        }),
    )
}
