//! # API Token Handlers
//!
//! Create, list, and delete account API tokens. The secret appears exactly
//! once, in the creation response.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::guard::ApiSession;
use crate::server::AppState;
use crate::tokens::{ApiTokenInfo, CreatedToken};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTokenRequest {
    pub name: String,
}

/// Create an API token
#[utoipa::path(
    post,
    path = "/api/tokens",
    request_body = CreateTokenRequest,
    responses(
        (status = 201, description = "Token created; the secret is shown only here", body = CreatedToken),
        (status = 400, description = "Invalid name", body = ApiError)
    ),
    tag = "tokens"
)]
pub async fn create_token(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Json(request): Json<CreateTokenRequest>,
) -> Result<(StatusCode, Json<CreatedToken>), ApiError> {
    let created = state
        .tokens
        .create(&session.access_token, &request.name)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// List API tokens (secrets omitted)
#[utoipa::path(
    get,
    path = "/api/tokens",
    responses(
        (status = 200, description = "Account tokens", body = [ApiTokenInfo])
    ),
    tag = "tokens"
)]
pub async fn list_tokens(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
) -> Result<Json<Vec<ApiTokenInfo>>, ApiError> {
    let tokens = state.tokens.list(&session.access_token).await?;
    Ok(Json(tokens))
}

/// Delete an API token
#[utoipa::path(
    delete,
    path = "/api/tokens/{token_id}",
    params(("token_id" = Uuid, Path, description = "Token to delete")),
    responses(
        (status = 204, description = "Token deleted"),
        (status = 502, description = "Backend failure", body = ApiError)
    ),
    tag = "tokens"
)]
pub async fn delete_token(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Path(token_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .tokens
        .delete(&session.access_token, token_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
