//! # Ingestion Wizard
//!
//! One generic wizard state machine serves every knowledge-source type,
//! parameterized by a [`SourceDescriptor`]. States move forward on user
//! action and backward only through explicit removal. Collected sources are
//! wizard-local and discarded after submission.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::chatbots::ingestion::{BatchOutcome, TrainingFile, TrainingPayload};
use crate::chatbots::{ChatbotStore, IngestError};
use crate::error::ApiError;
use crate::shopify::{ShopifyError, ShopifyStore};

pub mod source;

pub use source::{SourceDescriptor, SourceKind, descriptor_for};

/// Where the UI lands after a successful submission.
pub const KNOWLEDGE_OVERVIEW_PATH: &str = "/knowledge";
/// Fixed delay before navigating there, giving the backend time to begin
/// processing before the overview is rendered.
pub const REDIRECT_DELAY_MS: u64 = 1_500;

/// One unit of training input collected by a wizard.
#[derive(Debug, Clone)]
pub enum KnowledgeSource {
    File(TrainingFile),
    Url(String),
    Text { title: String, content: String },
}

/// Wizard lifecycle states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WizardState {
    Empty,
    Collected,
    Submitting,
    Done,
    Failed,
}

/// Terminal result handed back to the UI layer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WizardOutcome {
    /// Confirmation notice to show the user
    pub notice: String,
    /// Navigation target after the delay; absent when the submission failed
    #[schema(value_type = Option<String>)]
    pub redirect_to: Option<&'static str>,
    pub redirect_after_ms: u64,
    /// Batch detail for multi-file submissions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchOutcome>,
}

/// Errors surfaced by wizard transitions and submissions.
#[derive(Debug, Error)]
pub enum WizardError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("add at least one {0} before submitting")]
    NothingCollected(&'static str),
    #[error("only {max} {label}(s) can be added")]
    TooManyItems { label: &'static str, max: usize },
    #[error("a submission is already in progress")]
    AlreadySubmitting,
    #[error("this wizard already finished")]
    Finished,
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Shopify(#[from] ShopifyError),
}

impl From<WizardError> for ApiError {
    fn from(error: WizardError) -> Self {
        match error {
            WizardError::InvalidInput(message) => {
                crate::error::validation_error(&message, serde_json::Value::Null)
            }
            WizardError::NothingCollected(_)
            | WizardError::TooManyItems { .. } => {
                crate::error::validation_error(&error.to_string(), serde_json::Value::Null)
            }
            WizardError::AlreadySubmitting | WizardError::Finished => ApiError::new(
                axum::http::StatusCode::CONFLICT,
                "CONFLICT",
                &error.to_string(),
            ),
            WizardError::Ingest(ingest) => ingest.into(),
            WizardError::Shopify(shopify) => shopify.into(),
        }
    }
}

/// Stores and identity a wizard submission runs against.
pub struct WizardContext<'a> {
    pub chatbots: &'a Arc<ChatbotStore>,
    pub shopify: &'a ShopifyStore,
    pub access_token: &'a str,
    pub chatbot_id: Uuid,
}

/// The generic ingestion wizard.
pub struct IngestionWizard {
    descriptor: &'static SourceDescriptor,
    state: WizardState,
    sources: Vec<KnowledgeSource>,
}

impl IngestionWizard {
    /// Creates an empty wizard for the given source type.
    pub fn new(kind: SourceKind) -> Self {
        Self {
            descriptor: descriptor_for(kind),
            state: WizardState::Empty,
            sources: Vec::new(),
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.descriptor.kind
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn sources(&self) -> &[KnowledgeSource] {
        &self.sources
    }

    /// Collect one input, moving Empty → Collected.
    pub fn add(&mut self, source: KnowledgeSource) -> Result<(), WizardError> {
        match self.state {
            WizardState::Empty | WizardState::Collected => {}
            WizardState::Submitting => return Err(WizardError::AlreadySubmitting),
            WizardState::Done | WizardState::Failed => return Err(WizardError::Finished),
        }

        if self.sources.len() >= self.descriptor.max_items {
            return Err(WizardError::TooManyItems {
                label: self.descriptor.label,
                max: self.descriptor.max_items,
            });
        }

        self.descriptor.validate(&source)?;
        self.sources.push(source);
        self.state = WizardState::Collected;
        Ok(())
    }

    /// Remove one collected input; the only backward transition.
    pub fn remove(&mut self, index: usize) -> Result<KnowledgeSource, WizardError> {
        match self.state {
            WizardState::Empty | WizardState::Collected => {}
            WizardState::Submitting => return Err(WizardError::AlreadySubmitting),
            WizardState::Done | WizardState::Failed => return Err(WizardError::Finished),
        }

        if index >= self.sources.len() {
            return Err(WizardError::InvalidInput(format!(
                "no collected {} at position {}",
                self.descriptor.label, index
            )));
        }

        let removed = self.sources.remove(index);
        if self.sources.is_empty() {
            self.state = WizardState::Empty;
        }
        Ok(removed)
    }

    /// Submit the collected sources for training.
    ///
    /// On success the outcome carries the confirmation notice and the
    /// delayed navigation target; the collected sources are discarded either
    /// way.
    pub async fn submit(&mut self, ctx: WizardContext<'_>) -> Result<WizardOutcome, WizardError> {
        self.ensure_submittable()?;

        self.state = WizardState::Submitting;
        let sources = std::mem::take(&mut self.sources);

        let result = self.run_submission(&ctx, sources).await;
        match result {
            Ok(outcome) => {
                self.state = if outcome.redirect_to.is_some() {
                    WizardState::Done
                } else {
                    WizardState::Failed
                };
                Ok(outcome)
            }
            Err(err) => {
                self.state = WizardState::Failed;
                Err(err)
            }
        }
    }

    fn ensure_submittable(&self) -> Result<(), WizardError> {
        match self.state {
            WizardState::Submitting => Err(WizardError::AlreadySubmitting),
            WizardState::Done | WizardState::Failed => Err(WizardError::Finished),
            WizardState::Empty if self.descriptor.kind != SourceKind::Shopify => {
                Err(WizardError::NothingCollected(self.descriptor.label))
            }
            _ => Ok(()),
        }
    }

    async fn run_submission(
        &self,
        ctx: &WizardContext<'_>,
        sources: Vec<KnowledgeSource>,
    ) -> Result<WizardOutcome, WizardError> {
        match self.descriptor.kind {
            SourceKind::Files => {
                let files: Vec<TrainingFile> = sources
                    .into_iter()
                    .filter_map(|s| match s {
                        KnowledgeSource::File(file) => Some(file),
                        _ => None,
                    })
                    .collect();

                let outcome = ctx
                    .chatbots
                    .train_files(ctx.access_token, ctx.chatbot_id, files)
                    .await?;

                if let Some(failure) = &outcome.failure {
                    let notice = format!(
                        "Trained {} of {} files before '{}' failed",
                        outcome.trained, outcome.total, failure.file_name
                    );
                    return Ok(WizardOutcome {
                        notice,
                        redirect_to: None,
                        redirect_after_ms: 0,
                        batch: Some(outcome),
                    });
                }

                Ok(success_outcome(
                    format!("Training started for {} file(s)", outcome.total),
                    Some(outcome),
                ))
            }
            SourceKind::Links => {
                let mut trained = 0usize;
                for source in &sources {
                    let KnowledgeSource::Url(url) = source else {
                        continue;
                    };
                    // Scanned entries hold the parsed, normalized form
                    let normalized = url::Url::parse(url)
                        .map(|u| u.to_string())
                        .unwrap_or_else(|_| url.clone());
                    let entry = ctx
                        .chatbots
                        .scanned_urls()
                        .into_iter()
                        .find(|entry| entry.url == normalized)
                        .ok_or_else(|| {
                            WizardError::InvalidInput(format!(
                                "'{}' has not been scanned yet",
                                url
                            ))
                        })?;

                    ctx.chatbots
                        .train_chatbot(
                            ctx.access_token,
                            ctx.chatbot_id,
                            TrainingPayload::ScrapeJob {
                                job_id: entry.job_id,
                            },
                        )
                        .await?;
                    ctx.chatbots.remove_url(&normalized);
                    trained += 1;
                }

                Ok(success_outcome(
                    format!("Training started for {} link(s)", trained),
                    None,
                ))
            }
            SourceKind::Text => {
                for source in sources {
                    if let KnowledgeSource::Text { title, content } = source {
                        ctx.chatbots
                            .train_chatbot(
                                ctx.access_token,
                                ctx.chatbot_id,
                                TrainingPayload::Text { title, content },
                            )
                            .await?;
                    }
                }
                Ok(success_outcome("Training started".to_string(), None))
            }
            SourceKind::Audio => {
                for source in sources {
                    if let KnowledgeSource::File(file) = source {
                        let title = file.name.clone();
                        let transcript = ctx
                            .chatbots
                            .generate_transcript(ctx.access_token, file)
                            .await?;
                        ctx.chatbots
                            .train_chatbot(
                                ctx.access_token,
                                ctx.chatbot_id,
                                TrainingPayload::Text {
                                    title,
                                    content: transcript,
                                },
                            )
                            .await?;
                    }
                }
                Ok(success_outcome(
                    "Transcript generated and training started".to_string(),
                    None,
                ))
            }
            SourceKind::Youtube => {
                for source in sources {
                    if let KnowledgeSource::Url(url) = source {
                        let transcript = ctx
                            .chatbots
                            .generate_youtube_transcript(ctx.access_token, &url)
                            .await?;
                        ctx.chatbots
                            .train_chatbot(
                                ctx.access_token,
                                ctx.chatbot_id,
                                TrainingPayload::Text {
                                    title: url,
                                    content: transcript,
                                },
                            )
                            .await?;
                    }
                }
                Ok(success_outcome(
                    "Transcript generated and training started".to_string(),
                    None,
                ))
            }
            SourceKind::CustomWebsite => {
                for source in sources {
                    if let KnowledgeSource::Url(url) = source {
                        let job_id = ctx
                            .chatbots
                            .scrape_url(ctx.access_token, ctx.chatbot_id, &url)
                            .await?;
                        ctx.chatbots
                            .train_chatbot(
                                ctx.access_token,
                                ctx.chatbot_id,
                                TrainingPayload::ScrapeJob { job_id },
                            )
                            .await?;
                    }
                }
                Ok(success_outcome("Website scan started".to_string(), None))
            }
            SourceKind::Shopify => {
                let last_trained = ctx
                    .shopify
                    .sync(ctx.access_token, ctx.chatbot_id)
                    .await?;
                Ok(success_outcome(
                    format!(
                        "Product catalog training started at {}",
                        last_trained.to_rfc3339()
                    ),
                    None,
                ))
            }
        }
    }
}

fn success_outcome(notice: String, batch: Option<BatchOutcome>) -> WizardOutcome {
    WizardOutcome {
        notice,
        redirect_to: Some(KNOWLEDGE_OVERVIEW_PATH),
        redirect_after_ms: REDIRECT_DELAY_MS,
        batch,
    }
}
