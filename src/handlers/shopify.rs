//! # Shopify Handlers
//!
//! Per-chatbot Shopify integration: authorization-URL issuance, the OAuth
//! callback re-entry, product training, and disconnect.

use axum::{
    extract::{Path, Query, State},
    response::{Json, Redirect},
};
use serde::Deserialize;
use url::Url;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::guard::{ApiSession, PageSession};
use crate::server::AppState;
use crate::shopify::{ShopifyConnection, ShopifyPhase};

use super::auth::AuthorizeUrlResponse;

/// Shopify training response.
#[derive(Debug, serde::Serialize, ToSchema)]
pub struct ShopifyTrained {
    pub last_trained_at: chrono::DateTime<chrono::Utc>,
}

/// OAuth callback query parameters.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ShopifyCallbackQuery {
    pub code: String,
    pub state: String,
}

/// Connection phase for a chatbot
#[utoipa::path(
    get,
    path = "/api/chatbots/{chatbot_id}/shopify",
    params(("chatbot_id" = Uuid, Path, description = "Target chatbot")),
    responses(
        (status = 200, description = "Connection phase", body = ShopifyPhase)
    ),
    tag = "shopify"
)]
pub async fn shopify_phase(
    State(state): State<AppState>,
    _session: ApiSession,
    Path(chatbot_id): Path<Uuid>,
) -> Json<ShopifyPhase> {
    Json(state.shopify.phase(chatbot_id))
}

/// Start the OAuth flow for the selected chatbot
#[utoipa::path(
    post,
    path = "/api/chatbots/{chatbot_id}/shopify/authorize",
    params(("chatbot_id" = Uuid, Path, description = "Target chatbot")),
    responses(
        (status = 200, description = "Authorization URL with bound state", body = AuthorizeUrlResponse),
        (status = 400, description = "No selection", body = ApiError)
    ),
    tag = "shopify"
)]
pub async fn shopify_authorize(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Path(chatbot_id): Path<Uuid>,
) -> Result<Json<AuthorizeUrlResponse>, ApiError> {
    // The connect flow, like every ingestion surface, runs against the
    // current selection.
    state.chatbots.require_selected(chatbot_id)?;

    let authorize_url: Url = state
        .shopify
        .auth_url(&session.access_token, chatbot_id)
        .await?;
    Ok(Json(AuthorizeUrlResponse { authorize_url }))
}

/// OAuth callback re-entry: exchanges the code and lands on the knowledge
/// overview.
pub async fn shopify_callback(
    State(state): State<AppState>,
    PageSession(session): PageSession,
    Query(query): Query<ShopifyCallbackQuery>,
) -> Result<Redirect, ApiError> {
    let (chatbot_id, connection): (Uuid, ShopifyConnection) = state
        .shopify
        .handle_callback(&session.access_token, &query.state, &query.code)
        .await?;

    tracing::info!(
        chatbot_id = %chatbot_id,
        store = %connection.store_name,
        "shopify store connected"
    );
    Ok(Redirect::to("/knowledge"))
}

/// Train on the connected store's product data
#[utoipa::path(
    post,
    path = "/api/chatbots/{chatbot_id}/shopify/train",
    params(("chatbot_id" = Uuid, Path, description = "Target chatbot")),
    responses(
        (status = 200, description = "Training triggered", body = ShopifyTrained),
        (status = 400, description = "Not connected", body = ApiError)
    ),
    tag = "shopify"
)]
pub async fn shopify_train(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Path(chatbot_id): Path<Uuid>,
) -> Result<Json<ShopifyTrained>, ApiError> {
    let last_trained_at = state
        .shopify
        .sync(&session.access_token, chatbot_id)
        .await?;
    Ok(Json(ShopifyTrained { last_trained_at }))
}

/// Disconnect the store
#[utoipa::path(
    delete,
    path = "/api/chatbots/{chatbot_id}/shopify",
    params(("chatbot_id" = Uuid, Path, description = "Target chatbot")),
    responses(
        (status = 204, description = "Disconnected"),
        (status = 502, description = "Training API failure", body = ApiError)
    ),
    tag = "shopify"
)]
pub async fn shopify_disconnect(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Path(chatbot_id): Path<Uuid>,
) -> Result<axum::http::StatusCode, ApiError> {
    state
        .shopify
        .disconnect(&session.access_token, chatbot_id)
        .await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
