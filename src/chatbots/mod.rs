//! # Chatbot Store
//!
//! Single source of truth for the account's chatbot list, the current
//! selection, and knowledge-ingestion orchestration. The store is injected
//! through `AppState` and mutated only through its own operations; every
//! ingestion operation requires a selected chatbot and rejects otherwise.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::clients::{BackendClient, ClientError, TrainingClient};
use crate::error::ApiError;

pub mod ingestion;
pub mod scrape;

pub use ingestion::{BatchOutcome, TrainAck, TrainingFile, TrainingPayload};
pub use scrape::{ScannedUrl, ScrapeJob};

/// Model behavior settings for a chatbot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ModelSettings {
    /// Instruction text steering responses
    #[serde(default)]
    pub instruction: String,
    /// Persona text shaping tone
    #[serde(default)]
    pub persona: String,
}

/// Settings for the embeddable public widget.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PublicSettings {
    /// Domain the widget is served from, when overridden per chatbot
    #[serde(default)]
    pub widget_domain: Option<String>,
}

/// Nested chatbot settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ChatbotSettings {
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub public: PublicSettings,
}

/// A configured conversational agent owned by an account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Chatbot {
    pub id: Uuid,
    pub owner_id: Uuid,
    #[serde(default)]
    pub settings: ChatbotSettings,
}

/// Errors surfaced by chatbot and ingestion operations.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Every ingestion operation requires a selected chatbot.
    #[error("No chatbot is selected; choose a chatbot before adding knowledge")]
    NoChatbotSelected,
    #[error("chatbot {0} is not in the loaded chatbot list")]
    UnknownChatbot(Uuid),
    /// Caught locally before any network call; store state is untouched.
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Backend(#[from] ClientError),
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::NoChatbotSelected => crate::error::validation_error(
                "No chatbot is selected; choose a chatbot before adding knowledge",
                serde_json::Value::Null,
            ),
            IngestError::UnknownChatbot(id) => ApiError::new(
                axum::http::StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("chatbot {} not found", id),
            ),
            IngestError::Validation(message) => {
                crate::error::validation_error(&message, serde_json::Value::Null)
            }
            IngestError::Backend(client_error) => client_error.into(),
        }
    }
}

/// Per-operation loading flags, one per ingestion concern.
#[derive(Debug, Default)]
pub struct OpFlags {
    pub fetching: AtomicBool,
    pub training: AtomicBool,
    pub scraping: AtomicBool,
    pub transcribing: AtomicBool,
}

/// Application-state object owning chatbot and ingestion state.
pub struct ChatbotStore {
    backend: BackendClient,
    training: TrainingClient,
    chatbots: RwLock<Vec<Chatbot>>,
    selected: RwLock<Option<Uuid>>,
    scanned: RwLock<Vec<ScannedUrl>>,
    jobs: RwLock<HashMap<String, ScrapeJob>>,
    flags: OpFlags,
    batch_percent: AtomicU8,
    watchers: CancellationToken,
}

impl ChatbotStore {
    /// Creates an empty store over the two service clients.
    pub fn new(backend: BackendClient, training: TrainingClient) -> Self {
        Self {
            backend,
            training,
            chatbots: RwLock::new(Vec::new()),
            selected: RwLock::new(None),
            scanned: RwLock::new(Vec::new()),
            jobs: RwLock::new(HashMap::new()),
            flags: OpFlags::default(),
            batch_percent: AtomicU8::new(0),
            watchers: CancellationToken::new(),
        }
    }

    pub(crate) fn training(&self) -> &TrainingClient {
        &self.training
    }

    pub(crate) fn watcher_token(&self) -> CancellationToken {
        self.watchers.child_token()
    }

    /// Per-operation loading flags.
    pub fn flags(&self) -> &OpFlags {
        &self.flags
    }

    /// Progress through the current multi-file training batch, 0-100.
    pub fn batch_percent(&self) -> u8 {
        self.batch_percent.load(Ordering::SeqCst)
    }

    pub(crate) fn set_batch_percent(&self, percent: u8) {
        self.batch_percent.store(percent, Ordering::SeqCst);
    }

    /// Fetches and replaces the chatbot list. Idempotent; safe to call after
    /// every successful training action to refresh derived state.
    pub async fn get_chatbots(&self, access_token: &str) -> Result<Vec<Chatbot>, IngestError> {
        self.flags.fetching.store(true, Ordering::SeqCst);
        let _reset = scopeguard::guard(&self.flags.fetching, |flag| {
            flag.store(false, Ordering::SeqCst)
        });

        let fetched = self.backend.list_chatbots(access_token).await?;
        *self.chatbots.write().unwrap() = fetched.clone();

        // Drop a selection that no longer resolves to a listed chatbot
        let mut selected = self.selected.write().unwrap();
        if let Some(id) = *selected
            && !fetched.iter().any(|c| c.id == id)
        {
            *selected = None;
        }

        Ok(fetched)
    }

    /// Snapshot of the loaded chatbot list.
    pub fn list(&self) -> Vec<Chatbot> {
        self.chatbots.read().unwrap().clone()
    }

    /// Look up one chatbot by id.
    pub fn chatbot(&self, id: Uuid) -> Option<Chatbot> {
        self.chatbots
            .read()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// Select a chatbot; at most one is selected at a time.
    pub fn select(&self, id: Uuid) -> Result<(), IngestError> {
        if !self.chatbots.read().unwrap().iter().any(|c| c.id == id) {
            return Err(IngestError::UnknownChatbot(id));
        }
        *self.selected.write().unwrap() = Some(id);
        Ok(())
    }

    /// Clear the selection.
    pub fn clear_selection(&self) {
        *self.selected.write().unwrap() = None;
    }

    /// The currently selected chatbot id, if any.
    pub fn selected(&self) -> Option<Uuid> {
        *self.selected.read().unwrap()
    }

    /// Resolve the selection an ingestion operation runs against, verifying
    /// the caller-supplied id matches it. Fails fast before any network call.
    pub(crate) fn require_selected(&self, chatbot_id: Uuid) -> Result<Uuid, IngestError> {
        let selected = self.selected().ok_or(IngestError::NoChatbotSelected)?;
        if selected != chatbot_id {
            return Err(IngestError::Validation(format!(
                "chatbot {} is not the selected chatbot",
                chatbot_id
            )));
        }
        Ok(selected)
    }

    /// Cancels all progress watchers; called on server shutdown.
    pub fn shutdown(&self) {
        self.watchers.cancel();
    }
}
