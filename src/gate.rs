//! # Edge Session Gate
//!
//! Middleware that runs before any page render: requests without a valid
//! session are redirected to `/login`. A fixed set of public paths is
//! allowlisted, API routes and static assets are exempt, and the gate fails
//! open (request proceeds, failure logged) if the session check itself
//! errors, so a backend outage cannot lock users out at the edge.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::server::AppState;
use crate::session::{Session, verify_session_token};

/// Cookie carrying the backend-issued access token.
pub const SESSION_COOKIE: &str = "botdesk_session";

/// Paths reachable without a session.
pub const PUBLIC_PATHS: &[&str] = &["/login", "/signup", "/signup-form", "/forgot-password"];

/// Whether a path is on the public allowlist.
pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
}

/// Whether the gate skips a path entirely: API routes, static assets, the
/// favicon, and the service documentation surface.
pub fn is_exempt_path(path: &str) -> bool {
    path.starts_with("/api/")
        || path.starts_with("/assets/")
        || path.starts_with("/docs")
        || path == "/openapi.json"
        || path == "/favicon.ico"
        || path == "/shopify/callback"
}

/// Extract the session token from the request's cookies.
pub fn session_token_from_headers(headers: &HeaderMap) -> Option<String> {
    for value in headers.get_all(axum::http::header::COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        for pair in raw.split(';') {
            let pair = pair.trim();
            if let Some((name, token)) = pair.split_once('=')
                && name == SESSION_COOKIE
                && !token.is_empty()
            {
                return Some(token.to_string());
            }
        }
    }
    None
}

/// The per-request session gate.
pub async fn session_gate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if is_exempt_path(path) || is_public_path(path) {
        return next.run(request).await;
    }

    let Some(token) = session_token_from_headers(request.headers()) else {
        return Redirect::temporary("/login").into_response();
    };

    match check_session(&state, &token).await {
        Ok(Some(_)) => next.run(request).await,
        Ok(None) => Redirect::temporary("/login").into_response(),
        Err(err) => {
            // Fail open: availability wins at the edge; the render guard
            // stays fail-closed behind it.
            tracing::warn!(error = %err, path = %request.uri().path(), "edge session check failed, failing open");
            next.run(request).await
        }
    }
}

/// Resolve a token to a session for gating purposes.
///
/// Fast path: a locally verified token signature when the JWT secret is
/// configured. Slow path: the backend session lookup. `Ok(None)` means a
/// clean "no session"; `Err` means the check itself failed.
async fn check_session(
    state: &AppState,
    token: &str,
) -> Result<Option<Session>, crate::session::SessionError> {
    if let Some(session) = state.sessions.cached(token) {
        return Ok(Some(session));
    }

    if let Some(secret) = &state.config.auth_jwt_secret {
        return match verify_session_token(token, secret) {
            Ok(claims) => {
                let session = claims.into_session(token);
                state.sessions.cache_session(session.clone());
                Ok(Some(session))
            }
            // Bad signature or expired token is a clean "no session"
            Err(_) => Ok(None),
        };
    }

    state.sessions.resolve(token).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn public_allowlist_is_exact() {
        for path in ["/login", "/signup", "/signup-form", "/forgot-password"] {
            assert!(is_public_path(path), "{} should be public", path);
        }
        assert!(!is_public_path("/"));
        assert!(!is_public_path("/knowledge"));
        assert!(!is_public_path("/login/extra"));
    }

    #[test]
    fn api_assets_and_favicon_are_exempt() {
        assert!(is_exempt_path("/api/chatbots"));
        assert!(is_exempt_path("/assets/app.css"));
        assert!(is_exempt_path("/favicon.ico"));
        assert!(is_exempt_path("/docs"));
        assert!(!is_exempt_path("/knowledge"));
        assert!(!is_exempt_path("/"));
    }

    #[test]
    fn cookie_parsing_finds_session_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("theme=dark; botdesk_session=tok-123; lang=en"),
        );
        assert_eq!(
            session_token_from_headers(&headers).as_deref(),
            Some("tok-123")
        );
    }

    #[test]
    fn missing_or_empty_cookie_yields_none() {
        let headers = HeaderMap::new();
        assert!(session_token_from_headers(&headers).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("botdesk_session="),
        );
        assert!(session_token_from_headers(&headers).is_none());
    }
}
