//! # Auth Handlers
//!
//! Sign-in, sign-up, sign-out, and password endpoints. Validation failures
//! are caught locally; backend rejections surface as a generic user-facing
//! notice while the detail goes to the logs.

use axum::{
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use crate::clients::ClientError;
use crate::error::ApiError;
use crate::gate::SESSION_COOKIE;
use crate::guard::ApiSession;
use crate::server::AppState;
use crate::session::{Credentials, SessionError, UserProfile};

/// Response for a successful credential exchange.
#[derive(Debug, Serialize, ToSchema)]
pub struct SignedInResponse {
    pub user: UserProfile,
    /// Where the UI navigates after the session is set
    pub navigate_to: String,
}

/// Generic notice response.
#[derive(Debug, Serialize, ToSchema)]
pub struct NoticeResponse {
    pub notice: String,
}

/// Authorization URL response for federated sign-in.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorizeUrlResponse {
    #[schema(value_type = String)]
    pub authorize_url: Url,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePasswordRequest {
    pub new_password: String,
}

fn session_cookie(token: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, token)
}

fn cleared_session_cookie() -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        SESSION_COOKIE
    )
}

/// Map credential-exchange failures: backend rejections become a generic
/// "check your credentials" notice; everything else keeps its mapping.
fn credential_error(error: SessionError) -> ApiError {
    match error {
        SessionError::Backend(ClientError::Rejected {
            service,
            status,
            message,
        }) => {
            tracing::warn!(service, status, %message, "credential exchange rejected");
            ApiError::new(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Please check your credentials and try again",
            )
        }
        other => other.into(),
    }
}

/// Sign in with email and password
#[utoipa::path(
    post,
    path = "/api/auth/sign-in",
    request_body = Credentials,
    responses(
        (status = 200, description = "Session established", body = SignedInResponse),
        (status = 400, description = "Invalid email or missing password", body = ApiError),
        (status = 401, description = "Credentials rejected", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Response, ApiError> {
    let session = state
        .sessions
        .sign_in(&credentials)
        .await
        .map_err(credential_error)?;

    let body = SignedInResponse {
        user: session.user.clone(),
        navigate_to: "/".to_string(),
    };
    Ok((
        AppendHeaders([(SET_COOKIE, session_cookie(&session.access_token))]),
        Json(body),
    )
        .into_response())
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/api/auth/sign-up",
    request_body = Credentials,
    responses(
        (status = 201, description = "Account created and signed in", body = SignedInResponse),
        (status = 400, description = "Invalid email or weak password", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Response, ApiError> {
    let session = state
        .sessions
        .sign_up(&credentials)
        .await
        .map_err(credential_error)?;

    let body = SignedInResponse {
        user: session.user.clone(),
        navigate_to: "/".to_string(),
    };
    Ok((
        StatusCode::CREATED,
        AppendHeaders([(SET_COOKIE, session_cookie(&session.access_token))]),
        Json(body),
    )
        .into_response())
}

/// Start a Google sign-in
#[utoipa::path(
    post,
    path = "/api/auth/google",
    responses(
        (status = 200, description = "Provider authorization URL", body = AuthorizeUrlResponse),
        (status = 502, description = "Auth backend failure", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn sign_in_with_google(
    State(state): State<AppState>,
) -> Result<Json<AuthorizeUrlResponse>, ApiError> {
    let authorize_url = state.sessions.sign_in_with_google().await?;
    Ok(Json(AuthorizeUrlResponse { authorize_url }))
}

/// Sign the current session out
#[utoipa::path(
    post,
    path = "/api/auth/sign-out",
    responses(
        (status = 200, description = "Session cleared", body = NoticeResponse),
        (status = 401, description = "No session", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn sign_out(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
) -> Result<Response, ApiError> {
    let token = session.access_token;

    let is_store_session = state
        .sessions
        .current()
        .is_some_and(|current| current.access_token == token);
    if is_store_session {
        state.sessions.sign_out().await?;
    } else {
        // A session from another tab of this account: revoke and evict it
        // without touching the store's current session.
        state
            .sessions
            .backend()
            .sign_out(&token)
            .await
            .map_err(SessionError::from)?;
        state.sessions.evict(&token);
    }

    Ok((
        AppendHeaders([(SET_COOKIE, cleared_session_cookie())]),
        Json(NoticeResponse {
            notice: "Signed out".to_string(),
        }),
    )
        .into_response())
}

/// Trigger a password-recovery email
#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Recovery email requested", body = NoticeResponse),
        (status = 400, description = "Invalid email", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<NoticeResponse>, ApiError> {
    state.sessions.reset_password(&request.email).await?;
    Ok(Json(NoticeResponse {
        notice: "Check your inbox for a recovery link".to_string(),
    }))
}

/// Update the signed-in account's password
#[utoipa::path(
    put,
    path = "/api/auth/password",
    request_body = UpdatePasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = NoticeResponse),
        (status = 400, description = "Password too short", body = ApiError),
        (status = 401, description = "No session", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn update_password(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Json(request): Json<UpdatePasswordRequest>,
) -> Result<Json<NoticeResponse>, ApiError> {
    state
        .sessions
        .update_password(&session.access_token, &request.new_password)
        .await?;
    Ok(Json(NoticeResponse {
        notice: "Password updated".to_string(),
    }))
}
