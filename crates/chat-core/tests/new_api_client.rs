//! New API client against a local JSON backend.

mod common;

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use chat_core::new_api::NEW_API_ERROR_REPLY;
use chat_core::{AuthScheme, NewApiClient};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

type Seen = Arc<Mutex<Option<(HeaderMap, Value)>>>;

async fn json_backend(status: StatusCode, body: &'static str) -> (String, Seen) {
    let seen: Seen = Arc::new(Mutex::new(None));
    let captured = seen.clone();

    let app = Router::new().route(
        "/v1/generate",
        post(move |headers: HeaderMap, req: Bytes| {
            let captured = captured.clone();
            async move {
                let json: Value = serde_json::from_slice(&req).unwrap_or(Value::Null);
                *captured.lock() = Some((headers, json));
                (status, body)
            }
        }),
    );

    let addr = common::serve(app).await;
    (format!("http://{}/v1/generate", addr), seen)
}

#[tokio::test]
async fn bearer_auth_sends_header() {
    let (url, seen) = json_backend(StatusCode::OK, r#"{"response":"pong"}"#).await;
    let client = NewApiClient::new(url, "secret", "m1");

    assert_eq!(client.send("ping").await, "pong");

    let (headers, body) = seen.lock().clone().unwrap();
    assert_eq!(
        headers.get("authorization").and_then(|v| v.to_str().ok()),
        Some("Bearer secret")
    );
    assert_eq!(body, serde_json::json!({"model": "m1", "prompt": "ping"}));
}

#[tokio::test]
async fn body_auth_sends_key_field() {
    let (url, seen) = json_backend(StatusCode::OK, r#"{"response":"pong"}"#).await;
    let client = NewApiClient::new(url, "secret", "m1").with_auth(AuthScheme::Body);

    assert_eq!(client.send("ping").await, "pong");

    let (headers, body) = seen.lock().clone().unwrap();
    assert!(headers.get("authorization").is_none());
    assert_eq!(body["api_key"], "secret");
}

#[tokio::test]
async fn custom_response_field() {
    let (url, _) = json_backend(StatusCode::OK, r#"{"output":"line one\nline two"}"#).await;
    let client = NewApiClient::new(url, "k", "m").with_response_field("output");

    assert_eq!(client.send("x").await, "line one\nline two");
}

#[tokio::test]
async fn missing_field_becomes_error_reply() {
    let (url, _) = json_backend(StatusCode::OK, r#"{"choices":[]}"#).await;
    let client = NewApiClient::new(url, "k", "m");

    assert_eq!(client.send("x").await, NEW_API_ERROR_REPLY);
}

#[tokio::test]
async fn error_status_becomes_error_reply() {
    let (url, _) = json_backend(StatusCode::UNAUTHORIZED, r#"{"response":"denied"}"#).await;
    let client = NewApiClient::new(url, "k", "m");

    assert_eq!(client.send("x").await, NEW_API_ERROR_REPLY);
}

#[tokio::test]
async fn unreachable_backend_becomes_error_reply() {
    let addr = common::closed_addr();
    let client = NewApiClient::new(format!("http://{}/v1/generate", addr), "k", "m");

    assert_eq!(client.send("x").await, NEW_API_ERROR_REPLY);
}
