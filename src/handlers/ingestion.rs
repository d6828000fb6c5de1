//! # Ingestion Handlers
//!
//! Training submission, URL scraping with progress polling, the scanned-URL
//! set, transcription, and the generic wizard endpoints. Upload routes
//! accept multipart form-data; everything else is JSON.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::chatbots::ingestion::{TrainAck, TrainingFile, TrainingPayload};
use crate::chatbots::{IngestError, ScannedUrl, ScrapeJob};
use crate::error::{ApiError, validation_error};
use crate::guard::ApiSession;
use crate::server::AppState;
use crate::wizards::{IngestionWizard, KnowledgeSource, SourceKind, WizardContext, WizardOutcome};

/// Title/content text payload.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TextPayload {
    pub title: String,
    pub content: String,
}

/// Training request: exactly one of a prior scrape job or a text payload.
/// File payloads go through the multipart wizard route.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TrainRequest {
    #[serde(default)]
    pub scrape_job_id: Option<String>,
    #[serde(default)]
    pub text: Option<TextPayload>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ScrapeRequest {
    pub url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScrapeStarted {
    pub job_id: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RemoveUrlQuery {
    /// URL to retract from the scanned set
    pub url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RemovedResponse {
    pub removed: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TranscriptResponse {
    pub transcript: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct YoutubeTranscriptRequest {
    pub url: String,
}

/// JSON wizard submission: URLs for link-style wizards, text for the text
/// wizard, nothing for the Shopify wizard.
#[derive(Debug, Deserialize, ToSchema)]
pub struct WizardSubmitRequest {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub text: Option<TextPayload>,
}

/// Surface transcription failures verbatim, as the endpoint reported them.
fn transcript_error(error: IngestError) -> ApiError {
    match error {
        IngestError::Backend(client_error) => {
            if let Some(message) = client_error.upstream_message()
                && !message.is_empty()
            {
                let message = message.to_string();
                tracing::warn!(service = client_error.service(), %message, "transcription failed");
                return ApiError::new(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", &message);
            }
            client_error.into()
        }
        other => other.into(),
    }
}

async fn collect_files(mut multipart: Multipart) -> Result<Vec<TrainingFile>, ApiError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| validation_error(&format!("Invalid upload: {}", e), serde_json::Value::Null))?
    {
        let name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "upload".to_string());
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| {
                validation_error(
                    &format!("Upload aborted: {}", e),
                    serde_json::Value::Null,
                )
            })?
            .to_vec();
        files.push(TrainingFile {
            name,
            content_type,
            bytes,
        });
    }
    Ok(files)
}

/// Submit one training payload for a chatbot
#[utoipa::path(
    post,
    path = "/api/chatbots/{chatbot_id}/train",
    params(("chatbot_id" = Uuid, Path, description = "Target chatbot")),
    request_body = TrainRequest,
    responses(
        (status = 200, description = "Training accepted", body = TrainAck),
        (status = 400, description = "No selection or empty payload", body = ApiError),
        (status = 502, description = "Training API failure", body = ApiError)
    ),
    tag = "ingestion"
)]
pub async fn train_chatbot(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Path(chatbot_id): Path<Uuid>,
    Json(request): Json<TrainRequest>,
) -> Result<Json<TrainAck>, ApiError> {
    let payload = TrainingPayload::from_parts(
        request.scrape_job_id,
        None,
        request.text.map(|t| (t.title, t.content)),
    )?;

    let ack = state
        .chatbots
        .train_chatbot(&session.access_token, chatbot_id, payload)
        .await?;
    Ok(Json(ack))
}

/// Start scraping a URL for a chatbot
#[utoipa::path(
    post,
    path = "/api/chatbots/{chatbot_id}/scrape",
    params(("chatbot_id" = Uuid, Path, description = "Target chatbot")),
    request_body = ScrapeRequest,
    responses(
        (status = 200, description = "Scrape job started", body = ScrapeStarted),
        (status = 400, description = "Invalid URL scheme or no selection", body = ApiError)
    ),
    tag = "ingestion"
)]
pub async fn scrape_url(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Path(chatbot_id): Path<Uuid>,
    Json(request): Json<ScrapeRequest>,
) -> Result<Json<ScrapeStarted>, ApiError> {
    let job_id = state
        .chatbots
        .scrape_url(&session.access_token, chatbot_id, &request.url)
        .await?;
    Ok(Json(ScrapeStarted { job_id }))
}

/// Progress and status for a scrape job
#[utoipa::path(
    get,
    path = "/api/scrape/{job_id}",
    params(("job_id" = String, Path, description = "Scrape job id")),
    responses(
        (status = 200, description = "Tracked job state", body = ScrapeJob),
        (status = 404, description = "Unknown job", body = ApiError)
    ),
    tag = "ingestion"
)]
pub async fn scrape_status(
    State(state): State<AppState>,
    _session: ApiSession,
    Path(job_id): Path<String>,
) -> Result<Json<ScrapeJob>, ApiError> {
    state
        .chatbots
        .scrape_job(&job_id)
        .map(Json)
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("scrape job '{}' is not tracked", job_id),
            )
        })
}

/// The locally tracked scanned-URL set
#[utoipa::path(
    get,
    path = "/api/scanned-urls",
    responses(
        (status = 200, description = "Scanned URLs awaiting training", body = [ScannedUrl])
    ),
    tag = "ingestion"
)]
pub async fn scanned_urls(
    State(state): State<AppState>,
    _session: ApiSession,
) -> Json<Vec<ScannedUrl>> {
    Json(state.chatbots.scanned_urls())
}

/// Retract a URL from the scanned set (purely local, no backend call)
#[utoipa::path(
    delete,
    path = "/api/scanned-urls",
    params(RemoveUrlQuery),
    responses(
        (status = 200, description = "Removal outcome", body = RemovedResponse)
    ),
    tag = "ingestion"
)]
pub async fn remove_scanned_url(
    State(state): State<AppState>,
    _session: ApiSession,
    Query(query): Query<RemoveUrlQuery>,
) -> Json<RemovedResponse> {
    Json(RemovedResponse {
        removed: state.chatbots.remove_url(&query.url),
    })
}

/// Transcribe an uploaded audio file
#[utoipa::path(
    post,
    path = "/api/transcripts/audio",
    responses(
        (status = 200, description = "Transcript text", body = TranscriptResponse),
        (status = 400, description = "Missing, empty, or oversized file", body = ApiError),
        (status = 502, description = "Transcription failure (endpoint message verbatim)", body = ApiError)
    ),
    tag = "ingestion"
)]
pub async fn transcribe_audio(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    multipart: Multipart,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let mut files = collect_files(multipart).await?;
    let Some(file) = files.pop() else {
        return Err(validation_error(
            "Attach an audio file",
            serde_json::Value::Null,
        ));
    };

    let transcript = state
        .chatbots
        .generate_transcript(&session.access_token, file)
        .await
        .map_err(transcript_error)?;
    Ok(Json(TranscriptResponse { transcript }))
}

/// Transcribe a YouTube video
#[utoipa::path(
    post,
    path = "/api/transcripts/youtube",
    request_body = YoutubeTranscriptRequest,
    responses(
        (status = 200, description = "Transcript text", body = TranscriptResponse),
        (status = 400, description = "Invalid URL", body = ApiError),
        (status = 502, description = "Transcription failure (endpoint message verbatim)", body = ApiError)
    ),
    tag = "ingestion"
)]
pub async fn transcribe_youtube(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Json(request): Json<YoutubeTranscriptRequest>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let transcript = state
        .chatbots
        .generate_youtube_transcript(&session.access_token, &request.url)
        .await
        .map_err(transcript_error)?;
    Ok(Json(TranscriptResponse { transcript }))
}

fn parse_kind(kind: &str) -> Result<SourceKind, ApiError> {
    kind.parse::<SourceKind>()
        .map_err(|message| validation_error(&message, serde_json::Value::Null))
}

/// Submit a JSON-bodied ingestion wizard (links, text, youtube,
/// custom-website, shopify)
#[utoipa::path(
    post,
    path = "/api/chatbots/{chatbot_id}/wizard/{kind}",
    params(
        ("chatbot_id" = Uuid, Path, description = "Target chatbot"),
        ("kind" = String, Path, description = "Source type (links, text, youtube, custom-website, shopify)")
    ),
    request_body = WizardSubmitRequest,
    responses(
        (status = 200, description = "Wizard outcome with redirect hint", body = WizardOutcome),
        (status = 400, description = "Invalid input or nothing collected", body = ApiError)
    ),
    tag = "ingestion"
)]
pub async fn submit_wizard(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Path((chatbot_id, kind)): Path<(Uuid, String)>,
    Json(request): Json<WizardSubmitRequest>,
) -> Result<Json<WizardOutcome>, ApiError> {
    let kind = parse_kind(&kind)?;
    if matches!(kind, SourceKind::Files | SourceKind::Audio) {
        return Err(validation_error(
            "File wizards submit through the upload route",
            serde_json::Value::Null,
        ));
    }

    let mut wizard = IngestionWizard::new(kind);
    for url in request.urls {
        wizard.add(KnowledgeSource::Url(url))?;
    }
    if let Some(text) = request.text {
        wizard.add(KnowledgeSource::Text {
            title: text.title,
            content: text.content,
        })?;
    }

    let outcome = wizard
        .submit(WizardContext {
            chatbots: &state.chatbots,
            shopify: &state.shopify,
            access_token: &session.access_token,
            chatbot_id,
        })
        .await?;
    Ok(Json(outcome))
}

/// Submit an upload-bodied ingestion wizard (files, audio)
#[utoipa::path(
    post,
    path = "/api/chatbots/{chatbot_id}/wizard-upload/{kind}",
    params(
        ("chatbot_id" = Uuid, Path, description = "Target chatbot"),
        ("kind" = String, Path, description = "Source type (files, audio)")
    ),
    responses(
        (status = 200, description = "Wizard outcome with redirect hint", body = WizardOutcome),
        (status = 400, description = "Invalid upload", body = ApiError)
    ),
    tag = "ingestion"
)]
pub async fn submit_upload_wizard(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Path((chatbot_id, kind)): Path<(Uuid, String)>,
    multipart: Multipart,
) -> Result<Json<WizardOutcome>, ApiError> {
    let kind = parse_kind(&kind)?;
    if !matches!(kind, SourceKind::Files | SourceKind::Audio) {
        return Err(validation_error(
            "This wizard submits through the JSON route",
            serde_json::Value::Null,
        ));
    }

    let mut wizard = IngestionWizard::new(kind);
    for file in collect_files(multipart).await? {
        wizard.add(KnowledgeSource::File(file))?;
    }

    let outcome = wizard
        .submit(WizardContext {
            chatbots: &state.chatbots,
            shopify: &state.shopify,
            access_token: &session.access_token,
            chatbot_id,
        })
        .await?;
    Ok(Json(outcome))
}
