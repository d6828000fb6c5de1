//! Shared helpers for integration tests: app construction over wiremock
//! stand-ins for the auth backend and training API.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use botdesk::config::AppConfig;
use botdesk::server::{AppState, create_app};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_TOKEN: &str = "tok-test";
pub const TEST_EMAIL: &str = "user@example.com";

/// Config wired to the given mock services, test profile.
pub fn test_config(auth_base: &str, training_base: &str) -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        auth_base_url: auth_base.to_string(),
        training_base_url: training_base.to_string(),
        oauth_state_secret: Some(vec![9u8; 32]),
        ..Default::default()
    }
}

pub fn build_state(config: AppConfig) -> AppState {
    AppState::new(Arc::new(config)).expect("app state builds")
}

pub fn build_app(config: AppConfig) -> (Router, AppState) {
    let state = build_state(config);
    (create_app(state.clone()), state)
}

/// Mounts the session-retrieval endpoint answering for `TEST_TOKEN`.
pub async fn mount_session(server: &MockServer, user_id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", format!("Bearer {}", TEST_TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": TEST_TOKEN,
            "seq": 1,
            "user": { "id": user_id, "email": TEST_EMAIL },
        })))
        .mount(server)
        .await;
}

/// Mounts the chatbot listing endpoint returning one chatbot.
pub async fn mount_chatbots(server: &MockServer, chatbot_id: Uuid, owner_id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/chatbots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "id": chatbot_id,
                "owner_id": owner_id,
                "settings": {
                    "model": { "instruction": "Answer support questions", "persona": "friendly" },
                    "public": {},
                },
            }
        ])))
        .mount(server)
        .await;
}

pub fn cookie_header() -> String {
    format!("botdesk_session={}", TEST_TOKEN)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

pub fn get_authed(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("cookie", cookie_header())
        .body(Body::empty())
        .expect("request builds")
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("cookie", cookie_header())
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is json")
}

/// Builds a multipart body with one part per (filename, content) pair.
pub fn multipart_body(boundary: &str, files: &[(&str, &str)]) -> (String, String) {
    let mut body = String::new();
    for (name, content) in files {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: application/pdf\r\n\r\n{content}\r\n",
        ));
    }
    body.push_str(&format!("--{boundary}--\r\n"));
    (
        format!("multipart/form-data; boundary={}", boundary),
        body,
    )
}

/// Selects the chatbot through the API, as the UI would.
pub async fn select_chatbot(app: &Router, chatbot_id: Uuid) {
    use tower::ServiceExt;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/chatbots/{}/select", chatbot_id),
            serde_json::json!({}),
        ))
        .await
        .expect("request succeeds");
    assert_eq!(response.status(), axum::http::StatusCode::OK);
}

/// Loads the chatbot list through the API so selection can resolve.
pub async fn load_chatbots(app: &Router) {
    use tower::ServiceExt;

    let response = app
        .clone()
        .oneshot(get_authed("/api/chatbots"))
        .await
        .expect("request succeeds");
    assert_eq!(response.status(), axum::http::StatusCode::OK);
}
