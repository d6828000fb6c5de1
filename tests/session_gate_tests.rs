//! Integration tests for the edge session gate: public allowlist, exempt
//! paths, redirect policy, the JWT fast path, and fail-open behavior.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::{Router, middleware};
use botdesk::gate::session_gate;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{build_app, build_state, cookie_header, get, get_authed, test_config};

fn location(response: &axum::http::Response<Body>) -> Option<&str> {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn protected_paths_redirect_without_session() {
    let (app, _state) = build_app(test_config("http://localhost:1", "http://localhost:1"));

    for path in ["/", "/knowledge"] {
        let response = app.clone().oneshot(get(path)).await.unwrap();
        assert_eq!(
            response.status(),
            StatusCode::TEMPORARY_REDIRECT,
            "{} should redirect",
            path
        );
        assert_eq!(location(&response), Some("/login"));
    }
}

#[tokio::test]
async fn public_paths_never_redirect() {
    let (app, _state) = build_app(test_config("http://localhost:1", "http://localhost:1"));

    for path in ["/login", "/signup", "/signup-form", "/forgot-password"] {
        // Without a session
        let response = app.clone().oneshot(get(path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{} without session", path);

        // And with one
        let response = app.clone().oneshot(get_authed(path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{} with session", path);
    }
}

#[tokio::test]
async fn api_routes_and_favicon_are_exempt_from_the_gate() {
    let (app, _state) = build_app(test_config("http://localhost:1", "http://localhost:1"));

    // The service-info route is unauthenticated and must not redirect
    let response = app.clone().oneshot(get("/api/service-info")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // An API route with a guard rejects with 401, not a redirect
    let response = app.clone().oneshot(get("/api/chatbots")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The favicon is simply not found; the gate stays out of the way
    let response = app.clone().oneshot(get("/favicon.ico")).await.unwrap();
    assert_ne!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn valid_jwt_passes_the_gate_without_backend_calls() {
    let auth = MockServer::start().await;
    let mut config = test_config(&auth.uri(), "http://localhost:1");
    config.auth_jwt_secret = Some("test-jwt-secret".to_string());
    let (app, _state) = build_app(config);

    let exp = chrono::Utc::now().timestamp() as u64 + 3600;
    let claims = serde_json::json!({
        "sub": Uuid::new_v4(),
        "email": "user@example.com",
        "exp": exp,
    });
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"test-jwt-secret"),
    )
    .unwrap();

    let request = Request::builder()
        .uri("/")
        .header("cookie", format!("botdesk_session={}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The session came from local verification, not the backend
    assert!(auth.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn expired_jwt_redirects() {
    let mut config = test_config("http://localhost:1", "http://localhost:1");
    config.auth_jwt_secret = Some("test-jwt-secret".to_string());
    let (app, _state) = build_app(config);

    let exp = chrono::Utc::now().timestamp() as u64 - 3600;
    let claims = serde_json::json!({
        "sub": Uuid::new_v4(),
        "email": "user@example.com",
        "exp": exp,
    });
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"test-jwt-secret"),
    )
    .unwrap();

    let request = Request::builder()
        .uri("/")
        .header("cookie", format!("botdesk_session={}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), Some("/login"));
}

#[tokio::test]
async fn gate_fails_open_when_the_session_check_errors() {
    // Backend answers 500 on session retrieval: the check itself fails
    let auth = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&auth)
        .await;

    // Probe router: the gate alone, no render guard behind it
    let state = build_state(test_config(&auth.uri(), "http://localhost:1"));
    let probe = Router::new()
        .route("/probe", axum::routing::get(|| async { "OK" }))
        .layer(middleware::from_fn_with_state(state.clone(), session_gate))
        .with_state(state);

    let request = Request::builder()
        .uri("/probe")
        .header("cookie", cookie_header())
        .body(Body::empty())
        .unwrap();
    let response = probe.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A clean "no session" answer still redirects
    let auth_no_session = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&auth_no_session)
        .await;

    let state = build_state(test_config(&auth_no_session.uri(), "http://localhost:1"));
    let probe = Router::new()
        .route("/probe", axum::routing::get(|| async { "OK" }))
        .layer(middleware::from_fn_with_state(state.clone(), session_gate))
        .with_state(state);

    let request = Request::builder()
        .uri("/probe")
        .header("cookie", cookie_header())
        .body(Body::empty())
        .unwrap();
    let response = probe.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn render_guard_fails_closed_on_check_failure() {
    // Same failing backend, but the real app: the page guard behind the
    // gate redirects rather than letting the render proceed
    let auth = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&auth)
        .await;

    let (app, _state) = build_app(test_config(&auth.uri(), "http://localhost:1"));
    let response = app.oneshot(get_authed("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), Some("/login"));
}
