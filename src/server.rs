//! # Server Configuration
//!
//! Application state wiring, the router, and the serve loop. Every store is
//! an explicit state object constructed here and injected through
//! [`AppState`]; the session provider and scrape watchers are torn down on
//! shutdown.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::chatbots::ChatbotStore;
use crate::clients::{BackendClient, Timeouts, TrainingClient, build_http_client};
use crate::config::AppConfig;
use crate::gate::session_gate;
use crate::handlers;
use crate::session::{SessionProvider, SessionStore};
use crate::shopify::ShopifyStore;
use crate::telemetry::trace_context_middleware;
use crate::tokens::TokenStore;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionStore>,
    pub chatbots: Arc<ChatbotStore>,
    pub shopify: Arc<ShopifyStore>,
    pub tokens: Arc<TokenStore>,
}

impl axum::extract::FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

impl AppState {
    /// Builds the service clients and stores from configuration.
    pub fn new(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let timeouts = Timeouts::from(&config.timeouts);
        let http = build_http_client(&timeouts).context("building http client")?;

        let backend = BackendClient::new(
            http.clone(),
            &config.auth_base_url,
            config.auth_anon_key.clone(),
            timeouts,
        )
        .context("parsing auth backend base url")?;
        let training = TrainingClient::new(
            http,
            &config.training_base_url,
            config.training_api_key.clone(),
            timeouts,
        )
        .context("parsing training api base url")?;

        let sessions = Arc::new(SessionStore::new(
            backend.clone(),
            config.session_cache_capacity,
        ));
        let chatbots = Arc::new(ChatbotStore::new(backend.clone(), training.clone()));
        let shopify = Arc::new(ShopifyStore::new(
            training,
            config.oauth_state_secret.clone(),
        ));
        let tokens = Arc::new(TokenStore::new(backend));

        Ok(Self {
            config,
            sessions,
            chatbots,
            shopify,
            tokens,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        // Page shells behind the edge gate
        .route("/", get(handlers::pages::dashboard))
        .route("/knowledge", get(handlers::pages::knowledge))
        .route("/login", get(handlers::pages::login))
        .route("/signup", get(handlers::pages::signup))
        .route("/signup-form", get(handlers::pages::signup_form))
        .route("/forgot-password", get(handlers::pages::forgot_password))
        .route("/shopify/callback", get(handlers::shopify::shopify_callback))
        // Service surface
        .route("/api/service-info", get(handlers::service_info))
        // Auth
        .route("/api/auth/sign-in", post(handlers::auth::sign_in))
        .route("/api/auth/sign-up", post(handlers::auth::sign_up))
        .route("/api/auth/google", post(handlers::auth::sign_in_with_google))
        .route("/api/auth/sign-out", post(handlers::auth::sign_out))
        .route(
            "/api/auth/reset-password",
            post(handlers::auth::reset_password),
        )
        .route("/api/auth/password", put(handlers::auth::update_password))
        // Chatbots
        .route("/api/chatbots", get(handlers::chatbots::list_chatbots))
        .route(
            "/api/chatbots/selected",
            get(handlers::chatbots::selected_chatbot),
        )
        .route(
            "/api/chatbots/{chatbot_id}/select",
            post(handlers::chatbots::select_chatbot),
        )
        // Ingestion
        .route(
            "/api/chatbots/{chatbot_id}/train",
            post(handlers::ingestion::train_chatbot),
        )
        .route(
            "/api/chatbots/{chatbot_id}/scrape",
            post(handlers::ingestion::scrape_url),
        )
        .route("/api/scrape/{job_id}", get(handlers::ingestion::scrape_status))
        .route(
            "/api/scanned-urls",
            get(handlers::ingestion::scanned_urls)
                .delete(handlers::ingestion::remove_scanned_url),
        )
        .route(
            "/api/transcripts/audio",
            post(handlers::ingestion::transcribe_audio),
        )
        .route(
            "/api/transcripts/youtube",
            post(handlers::ingestion::transcribe_youtube),
        )
        .route(
            "/api/chatbots/{chatbot_id}/wizard/{kind}",
            post(handlers::ingestion::submit_wizard),
        )
        .route(
            "/api/chatbots/{chatbot_id}/wizard-upload/{kind}",
            post(handlers::ingestion::submit_upload_wizard),
        )
        // Shopify
        .route(
            "/api/chatbots/{chatbot_id}/shopify",
            get(handlers::shopify::shopify_phase).delete(handlers::shopify::shopify_disconnect),
        )
        .route(
            "/api/chatbots/{chatbot_id}/shopify/authorize",
            post(handlers::shopify::shopify_authorize),
        )
        .route(
            "/api/chatbots/{chatbot_id}/shopify/train",
            post(handlers::shopify::shopify_train),
        )
        // API tokens
        .route(
            "/api/tokens",
            post(handlers::tokens::create_token).get(handlers::tokens::list_tokens),
        )
        .route(
            "/api/tokens/{token_id}",
            delete(handlers::tokens::delete_token),
        )
        // Widget
        .route(
            "/api/chatbots/{chatbot_id}/widget-snippet",
            get(handlers::widget::widget_snippet),
        )
        .layer(middleware::from_fn_with_state(state.clone(), session_gate))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);
    let state = AppState::new(Arc::clone(&config))?;

    // Bootstrap session state and keep it tracking backend-pushed changes
    let provider = SessionProvider::start(Arc::clone(&state.sessions));

    let app = create_app(state.clone());

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %config.profile, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Release the long-lived listener and any in-flight progress watchers
    state.chatbots.shutdown();
    provider.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install shutdown handler");
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::service_info,
        crate::handlers::auth::sign_in,
        crate::handlers::auth::sign_up,
        crate::handlers::auth::sign_in_with_google,
        crate::handlers::auth::sign_out,
        crate::handlers::auth::reset_password,
        crate::handlers::auth::update_password,
        crate::handlers::chatbots::list_chatbots,
        crate::handlers::chatbots::select_chatbot,
        crate::handlers::chatbots::selected_chatbot,
        crate::handlers::ingestion::train_chatbot,
        crate::handlers::ingestion::scrape_url,
        crate::handlers::ingestion::scrape_status,
        crate::handlers::ingestion::scanned_urls,
        crate::handlers::ingestion::remove_scanned_url,
        crate::handlers::ingestion::transcribe_audio,
        crate::handlers::ingestion::transcribe_youtube,
        crate::handlers::ingestion::submit_wizard,
        crate::handlers::ingestion::submit_upload_wizard,
        crate::handlers::shopify::shopify_phase,
        crate::handlers::shopify::shopify_authorize,
        crate::handlers::shopify::shopify_train,
        crate::handlers::shopify::shopify_disconnect,
        crate::handlers::tokens::create_token,
        crate::handlers::tokens::list_tokens,
        crate::handlers::tokens::delete_token,
        crate::handlers::widget::widget_snippet,
    ),
    components(
        schemas(
            crate::handlers::ServiceInfo,
            crate::error::ApiError,
            crate::error::UpstreamError,
            crate::session::Credentials,
            crate::session::UserProfile,
            crate::handlers::auth::SignedInResponse,
            crate::handlers::auth::NoticeResponse,
            crate::handlers::auth::AuthorizeUrlResponse,
            crate::handlers::auth::ResetPasswordRequest,
            crate::handlers::auth::UpdatePasswordRequest,
            crate::chatbots::Chatbot,
            crate::chatbots::ChatbotSettings,
            crate::chatbots::ModelSettings,
            crate::chatbots::PublicSettings,
            crate::handlers::chatbots::SelectionResponse,
            crate::handlers::ingestion::TextPayload,
            crate::handlers::ingestion::TrainRequest,
            crate::handlers::ingestion::ScrapeRequest,
            crate::handlers::ingestion::ScrapeStarted,
            crate::handlers::ingestion::RemovedResponse,
            crate::handlers::ingestion::TranscriptResponse,
            crate::handlers::ingestion::YoutubeTranscriptRequest,
            crate::handlers::ingestion::WizardSubmitRequest,
            crate::chatbots::ingestion::TrainAck,
            crate::chatbots::ingestion::BatchOutcome,
            crate::chatbots::ingestion::BatchFailure,
            crate::chatbots::scrape::ScrapeJob,
            crate::chatbots::scrape::ScannedUrl,
            crate::wizards::WizardOutcome,
            crate::wizards::WizardState,
            crate::wizards::source::SourceKind,
            crate::shopify::ShopifyPhase,
            crate::shopify::ShopifyConnection,
            crate::handlers::shopify::ShopifyTrained,
            crate::handlers::tokens::CreateTokenRequest,
            crate::tokens::CreatedToken,
            crate::tokens::ApiTokenInfo,
            crate::handlers::widget::SnippetResponse,
        )
    ),
    info(
        title = "Botdesk Dashboard API",
        description = "Chatbot dashboard orchestration layer",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
