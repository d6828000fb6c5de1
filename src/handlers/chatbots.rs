//! # Chatbot Handlers
//!
//! Listing and selection. The list is fetched from the backend and replaces
//! local state wholesale; selection is a purely local weak reference.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::chatbots::Chatbot;
use crate::error::ApiError;
use crate::guard::ApiSession;
use crate::server::AppState;

/// Current selection response.
#[derive(Debug, Serialize, ToSchema)]
pub struct SelectionResponse {
    pub selected: Option<Uuid>,
}

/// List the account's chatbots
#[utoipa::path(
    get,
    path = "/api/chatbots",
    responses(
        (status = 200, description = "Chatbots owned by the account", body = [Chatbot]),
        (status = 401, description = "No session", body = ApiError)
    ),
    tag = "chatbots"
)]
pub async fn list_chatbots(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
) -> Result<Json<Vec<Chatbot>>, ApiError> {
    let chatbots = state
        .chatbots
        .get_chatbots(&session.access_token)
        .await?;
    Ok(Json(chatbots))
}

/// Select a chatbot; all ingestion operations run against the selection
#[utoipa::path(
    post,
    path = "/api/chatbots/{chatbot_id}/select",
    params(("chatbot_id" = Uuid, Path, description = "Chatbot to select")),
    responses(
        (status = 200, description = "Selection updated", body = SelectionResponse),
        (status = 404, description = "Chatbot not in the loaded list", body = ApiError)
    ),
    tag = "chatbots"
)]
pub async fn select_chatbot(
    State(state): State<AppState>,
    _session: ApiSession,
    Path(chatbot_id): Path<Uuid>,
) -> Result<Json<SelectionResponse>, ApiError> {
    state.chatbots.select(chatbot_id)?;
    Ok(Json(SelectionResponse {
        selected: state.chatbots.selected(),
    }))
}

/// The current selection
#[utoipa::path(
    get,
    path = "/api/chatbots/selected",
    responses(
        (status = 200, description = "Currently selected chatbot id", body = SelectionResponse)
    ),
    tag = "chatbots"
)]
pub async fn selected_chatbot(
    State(state): State<AppState>,
    _session: ApiSession,
) -> Json<SelectionResponse> {
    Json(SelectionResponse {
        selected: state.chatbots.selected(),
    })
}
