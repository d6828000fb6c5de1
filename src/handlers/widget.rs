//! # Widget Handler
//!
//! Generates the embeddable script/iframe snippet for a chatbot, pointed at
//! the configured widget domain.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::guard::ApiSession;
use crate::server::AppState;
use crate::widget::embed_snippet;

#[derive(Debug, Serialize, ToSchema)]
pub struct SnippetResponse {
    pub snippet: String,
    pub domain: String,
}

/// Embed snippet for a chatbot
#[utoipa::path(
    get,
    path = "/api/chatbots/{chatbot_id}/widget-snippet",
    params(("chatbot_id" = Uuid, Path, description = "Target chatbot")),
    responses(
        (status = 200, description = "Embeddable snippet", body = SnippetResponse),
        (status = 404, description = "Chatbot not in the loaded list", body = ApiError)
    ),
    tag = "widget"
)]
pub async fn widget_snippet(
    State(state): State<AppState>,
    _session: ApiSession,
    Path(chatbot_id): Path<Uuid>,
) -> Result<Json<SnippetResponse>, ApiError> {
    let chatbot = state.chatbots.chatbot(chatbot_id).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("chatbot {} not found", chatbot_id),
        )
    })?;

    let domain = chatbot
        .settings
        .public
        .widget_domain
        .unwrap_or_else(|| state.config.widget_domain.clone());

    Ok(Json(SnippetResponse {
        snippet: embed_snippet(chatbot.id, chatbot.owner_id, &domain),
        domain,
    }))
}
