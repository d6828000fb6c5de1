//! Integration tests for the account surfaces: API tokens with a one-time
//! secret, the Shopify connect/disconnect flow, and the widget snippet.

use axum::http::StatusCode;
use tower::ServiceExt;
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{
    body_json, build_app, get_authed, json_request, load_chatbots, mount_chatbots, mount_session,
    select_chatbot, test_config,
};

#[tokio::test]
async fn token_lifecycle_shows_the_secret_exactly_once() {
    let auth = MockServer::start().await;
    let user_id = Uuid::new_v4();
    let token_id = Uuid::new_v4();
    mount_session(&auth, user_id).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/api_tokens"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": token_id,
            "name": "ci-deploy",
            "created_at": "2026-08-01T12:00:00Z",
            "secret": "sk-one-time-secret",
        })))
        .mount(&auth)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/api_tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "id": token_id, "name": "ci-deploy", "created_at": "2026-08-01T12:00:00Z" }
        ])))
        .mount(&auth)
        .await;
    Mock::given(method("DELETE"))
        .and(path_regex(r"^/rest/v1/api_tokens/.+$"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&auth)
        .await;

    let (app, _state) = build_app(test_config(&auth.uri(), "http://localhost:1"));

    // Create: the secret appears here and only here
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/tokens",
            serde_json::json!({ "name": "ci-deploy" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["secret"], "sk-one-time-secret");

    // List: no secret field
    let response = app.clone().oneshot(get_authed("/api/tokens")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert!(listed[0].get("secret").is_none());

    // Delete
    let response = app
        .oneshot(json_request(
            "DELETE",
            &format!("/api/tokens/{}", token_id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn blank_token_name_rejected_without_backend_call() {
    let auth = MockServer::start().await;
    let user_id = Uuid::new_v4();
    mount_session(&auth, user_id).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/api_tokens"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&auth)
        .await;

    let (app, _state) = build_app(test_config(&auth.uri(), "http://localhost:1"));
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/tokens",
            serde_json::json!({ "name": "   " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn shopify_flow_connects_trains_and_disconnects() {
    let auth = MockServer::start().await;
    let training = MockServer::start().await;
    let user_id = Uuid::new_v4();
    let chatbot_id = Uuid::new_v4();
    mount_session(&auth, user_id).await;
    mount_chatbots(&auth, chatbot_id, user_id).await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/shopify/.+/authorize$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": "https://accounts.shopify.example/authorize?client_id=botdesk",
        })))
        .mount(&training)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/shopify/.+/connect$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "store_name": "acme-supplies",
            "last_trained_at": null,
        })))
        .mount(&training)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/shopify/.+/train$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "last_trained_at": "2026-08-02T09:30:00Z",
        })))
        .mount(&training)
        .await;
    Mock::given(method("DELETE"))
        .and(path_regex(r"^/shopify/[0-9a-f-]+$"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&training)
        .await;

    let (app, _state) = build_app(test_config(&auth.uri(), &training.uri()));
    load_chatbots(&app).await;
    select_chatbot(&app, chatbot_id).await;

    // Authorize: the URL carries our signed state
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/chatbots/{}/shopify/authorize", chatbot_id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let authorize_url =
        Url::parse(body_json(response).await["authorize_url"].as_str().unwrap()).unwrap();
    let state_param = authorize_url
        .query_pairs()
        .find(|(name, _)| name == "state")
        .map(|(_, value)| value.to_string())
        .expect("state parameter bound");

    let response = app
        .clone()
        .oneshot(get_authed(&format!("/api/chatbots/{}/shopify", chatbot_id)))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["phase"], "authorizing");

    // OAuth callback re-entry lands on the knowledge overview
    let response = app
        .clone()
        .oneshot(get_authed(&format!(
            "/shopify/callback?code=auth-code&state={}",
            state_param
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok()),
        Some("/knowledge")
    );

    let response = app
        .clone()
        .oneshot(get_authed(&format!("/api/chatbots/{}/shopify", chatbot_id)))
        .await
        .unwrap();
    let phase = body_json(response).await;
    assert_eq!(phase["phase"], "connected");
    assert_eq!(phase["store_name"], "acme-supplies");

    // Train on product data records the timestamp
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/chatbots/{}/shopify/train", chatbot_id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Disconnect is direct and synchronous
    let response = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            &format!("/api/chatbots/{}/shopify", chatbot_id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(get_authed(&format!("/api/chatbots/{}/shopify", chatbot_id)))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["phase"], "disconnected");
}

#[tokio::test]
async fn tampered_oauth_state_is_rejected() {
    let auth = MockServer::start().await;
    let training = MockServer::start().await;
    let user_id = Uuid::new_v4();
    let chatbot_id = Uuid::new_v4();
    mount_session(&auth, user_id).await;
    mount_chatbots(&auth, chatbot_id, user_id).await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/shopify/.+/connect$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&training)
        .await;

    let (app, _state) = build_app(test_config(&auth.uri(), &training.uri()));

    let response = app
        .oneshot(get_authed(
            "/shopify/callback?code=auth-code&state=forged-state",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn widget_snippet_targets_the_configured_domain() {
    let auth = MockServer::start().await;
    let user_id = Uuid::new_v4();
    let chatbot_id = Uuid::new_v4();
    mount_session(&auth, user_id).await;
    mount_chatbots(&auth, chatbot_id, user_id).await;

    let (app, _state) = build_app(test_config(&auth.uri(), "http://localhost:1"));
    load_chatbots(&app).await;

    let response = app
        .oneshot(get_authed(&format!(
            "/api/chatbots/{}/widget-snippet",
            chatbot_id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["domain"], "localhost:3001");
    let snippet = body["snippet"].as_str().unwrap();
    assert!(snippet.contains(&chatbot_id.to_string()));
    assert!(snippet.contains(&user_id.to_string()));
    assert!(snippet.contains("http://localhost:3001/widget.js"));
}
