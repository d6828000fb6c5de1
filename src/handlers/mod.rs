//! # API Handlers
//!
//! HTTP endpoint handlers for the dashboard: auth, chatbots, ingestion,
//! Shopify, API tokens, the widget snippet, and the server-rendered page
//! shells the edge gate protects.

use axum::response::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod auth;
pub mod chatbots;
pub mod ingestion;
pub mod pages;
pub mod shopify;
pub mod tokens;
pub mod widget;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "botdesk".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Service information handler
#[utoipa::path(
    get,
    path = "/api/service-info",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "service"
)]
pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}
