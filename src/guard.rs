//! # Route Guards
//!
//! Render-time and API-time session extractors, the second enforcement
//! point behind the edge gate. Unlike the gate, guards fail closed: when the
//! store has no cached session they re-query the backend directly, and only
//! an affirmative session lets the request through.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};

use crate::error::ApiError;
use crate::gate::session_token_from_headers;
use crate::server::AppState;
use crate::session::Session;

/// Session extractor for protected page views; rejection redirects to the
/// login view.
#[derive(Debug, Clone)]
pub struct PageSession(pub Session);

/// Rejection that sends the visitor to `/login`.
#[derive(Debug)]
pub struct LoginRedirect;

impl IntoResponse for LoginRedirect {
    fn into_response(self) -> Response {
        Redirect::temporary("/login").into_response()
    }
}

/// Session extractor for API routes; rejection is a 401.
#[derive(Debug, Clone)]
pub struct ApiSession(pub Session);

/// Resolve the request's session, failing closed.
///
/// Cached sessions win; otherwise the backend is queried directly so a slow
/// session hydration does not produce a spurious redirect. Any failure of
/// the check itself counts as "no session".
async fn resolve_session(state: &AppState, parts: &Parts) -> Option<Session> {
    let token = session_token_from_headers(&parts.headers)?;

    if let Some(session) = state.sessions.cached(&token) {
        return Some(session);
    }

    match state.sessions.resolve(&token).await {
        Ok(found) => found,
        Err(err) => {
            tracing::warn!(error = %err, "session re-check failed, failing closed");
            None
        }
    }
}

impl<S> FromRequestParts<S> for PageSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = LoginRedirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        resolve_session(&state, parts)
            .await
            .map(PageSession)
            .ok_or(LoginRedirect)
    }
}

impl<S> FromRequestParts<S> for ApiSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        resolve_session(&state, parts)
            .await
            .map(ApiSession)
            .ok_or_else(|| crate::error::unauthorized(None))
    }
}
