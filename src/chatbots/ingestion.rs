//! # Ingestion Orchestration
//!
//! Training submission paths: a completed scrape job, a single file, a
//! title/content text payload, and the strictly sequential multi-file batch.
//! Client-side caps here are UX guards only; the training API enforces the
//! authoritative limits server-side.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{ChatbotStore, IngestError};

/// Maximum number of documents accepted per training batch.
pub const MAX_TRAINING_FILES: usize = 10;
/// Maximum accepted audio upload size.
pub const MAX_AUDIO_BYTES: u64 = 100 * 1024 * 1024;

/// One file captured by an ingestion wizard, held only for the duration of
/// the submission.
#[derive(Debug, Clone)]
pub struct TrainingFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl TrainingFile {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Exactly one training input per submission.
#[derive(Debug, Clone)]
pub enum TrainingPayload {
    /// Reference to a previously completed scrape job
    ScrapeJob { job_id: String },
    /// A single uploaded document
    File(TrainingFile),
    /// Freeform text or transcript
    Text { title: String, content: String },
}

impl TrainingPayload {
    /// Assemble a payload from optional parts, requiring exactly one of them
    /// to be meaningful.
    pub fn from_parts(
        scrape_job_id: Option<String>,
        file: Option<TrainingFile>,
        text: Option<(String, String)>,
    ) -> Result<Self, IngestError> {
        let provided = usize::from(scrape_job_id.is_some())
            + usize::from(file.is_some())
            + usize::from(text.is_some());
        if provided != 1 {
            return Err(IngestError::Validation(
                "Provide exactly one of a scrape job, a file, or a text payload".to_string(),
            ));
        }

        let payload = if let Some(job_id) = scrape_job_id {
            TrainingPayload::ScrapeJob { job_id }
        } else if let Some(file) = file {
            TrainingPayload::File(file)
        } else {
            let (title, content) = text.expect("one part is present");
            TrainingPayload::Text { title, content }
        };

        payload.validate()?;
        Ok(payload)
    }

    /// Reject payloads that are present but empty, before any network call.
    pub fn validate(&self) -> Result<(), IngestError> {
        match self {
            TrainingPayload::ScrapeJob { job_id } if job_id.trim().is_empty() => Err(
                IngestError::Validation("A scrape job reference is required".to_string()),
            ),
            TrainingPayload::File(file) if file.bytes.is_empty() => Err(IngestError::Validation(
                format!("File '{}' is empty", file.name),
            )),
            TrainingPayload::Text { title, content }
                if title.trim().is_empty() || content.trim().is_empty() =>
            {
                Err(IngestError::Validation(
                    "Both a title and content are required".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Acknowledgement that the training API accepted a submission. Training
/// itself runs asynchronously server-side; nothing here polls for completion.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrainAck {
    pub accepted: bool,
    /// Server-side reference for the queued work, when issued
    #[serde(default)]
    pub job_ref: Option<String>,
}

/// Failure record for a sequential batch that stopped mid-way.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchFailure {
    /// Zero-based index of the file that failed
    pub index: usize,
    pub file_name: String,
    pub message: String,
}

/// Outcome of a sequential multi-file training batch.
///
/// A mid-batch failure stops the batch, so `trained` is always the exact
/// count of files the training API accepted before the failure.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchOutcome {
    pub total: usize,
    pub trained: usize,
    /// Progress percentage after the last completed file
    pub percent: u8,
    #[serde(default)]
    pub failure: Option<BatchFailure>,
}

impl ChatbotStore {
    /// Submit one training payload for the selected chatbot.
    ///
    /// Fails fast, without any network call, when no chatbot is selected or
    /// the payload is empty. Returns once the training API acknowledges
    /// receipt.
    pub async fn train_chatbot(
        &self,
        access_token: &str,
        chatbot_id: Uuid,
        payload: TrainingPayload,
    ) -> Result<TrainAck, IngestError> {
        let chatbot_id = self.require_selected(chatbot_id)?;
        payload.validate()?;

        self.flags().training.store(true, Ordering::SeqCst);
        let _reset = scopeguard::guard(&self.flags().training, |flag| {
            flag.store(false, Ordering::SeqCst)
        });

        let ack = match &payload {
            TrainingPayload::ScrapeJob { job_id } => {
                self.training()
                    .train_with_scrape_job(access_token, chatbot_id, job_id)
                    .await?
            }
            TrainingPayload::File(file) => {
                self.training()
                    .train_with_file(access_token, chatbot_id, file)
                    .await?
            }
            TrainingPayload::Text { title, content } => {
                self.training()
                    .train_with_text(access_token, chatbot_id, title, content)
                    .await?
            }
        };

        counter!("training_submissions_total").increment(1);
        Ok(ack)
    }

    /// Train a batch of documents strictly sequentially, one file in flight
    /// at a time, updating the batch progress after each file completes.
    pub async fn train_files(
        &self,
        access_token: &str,
        chatbot_id: Uuid,
        files: Vec<TrainingFile>,
    ) -> Result<BatchOutcome, IngestError> {
        let chatbot_id = self.require_selected(chatbot_id)?;

        if files.is_empty() {
            return Err(IngestError::Validation(
                "Select at least one file".to_string(),
            ));
        }
        if files.len() > MAX_TRAINING_FILES {
            return Err(IngestError::Validation(format!(
                "You can upload at most {} files at a time",
                MAX_TRAINING_FILES
            )));
        }

        self.flags().training.store(true, Ordering::SeqCst);
        let _reset = scopeguard::guard(&self.flags().training, |flag| {
            flag.store(false, Ordering::SeqCst)
        });

        let total = files.len();
        self.set_batch_percent(0);

        for (index, file) in files.into_iter().enumerate() {
            let result = if file.bytes.is_empty() {
                Err(IngestError::Validation(format!(
                    "File '{}' is empty",
                    file.name
                )))
            } else {
                self.training()
                    .train_with_file(access_token, chatbot_id, &file)
                    .await
                    .map_err(IngestError::from)
            };

            match result {
                Ok(_) => {
                    let percent = (((index + 1) * 100) / total) as u8;
                    self.set_batch_percent(percent);
                    counter!("training_files_trained_total").increment(1);
                }
                Err(err) => {
                    // Stop here: files after the failing one are never attempted,
                    // so the caller gets an exact count of what was trained.
                    tracing::warn!(
                        chatbot_id = %chatbot_id,
                        index,
                        file = %file.name,
                        error = %err,
                        "training batch stopped on failure"
                    );
                    counter!("training_batch_failures_total").increment(1);
                    return Ok(BatchOutcome {
                        total,
                        trained: index,
                        percent: self.batch_percent(),
                        failure: Some(BatchFailure {
                            index,
                            file_name: file.name,
                            message: err.to_string(),
                        }),
                    });
                }
            }
        }

        counter!("training_submissions_total").increment(1);
        Ok(BatchOutcome {
            total,
            trained: total,
            percent: 100,
            failure: None,
        })
    }

    /// Submit audio for transcription; returns the transcript text. Failures
    /// carry the transcription endpoint's message verbatim.
    pub async fn generate_transcript(
        &self,
        access_token: &str,
        file: TrainingFile,
    ) -> Result<String, IngestError> {
        if file.size() > MAX_AUDIO_BYTES {
            return Err(IngestError::Validation(
                "Audio files are capped at 100MB".to_string(),
            ));
        }
        if file.bytes.is_empty() {
            return Err(IngestError::Validation(format!(
                "File '{}' is empty",
                file.name
            )));
        }

        self.flags().transcribing.store(true, Ordering::SeqCst);
        let _reset = scopeguard::guard(&self.flags().transcribing, |flag| {
            flag.store(false, Ordering::SeqCst)
        });

        Ok(self
            .training()
            .transcribe_audio(access_token, &file)
            .await?)
    }

    /// Submit a YouTube URL for transcription; returns the transcript text.
    pub async fn generate_youtube_transcript(
        &self,
        access_token: &str,
        raw_url: &str,
    ) -> Result<String, IngestError> {
        let url = Url::parse(raw_url)
            .map_err(|_| IngestError::Validation("Enter a valid URL".to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(IngestError::Validation(
                "Only http and https URLs are supported".to_string(),
            ));
        }

        self.flags().transcribing.store(true, Ordering::SeqCst);
        let _reset = scopeguard::guard(&self.flags().transcribing, |flag| {
            flag.store(false, Ordering::SeqCst)
        });

        Ok(self
            .training()
            .transcribe_youtube(access_token, &url)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{seed_chatbot, test_store, test_store_with};
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn file(name: &str, bytes: &[u8]) -> TrainingFile {
        TrainingFile {
            name: name.to_string(),
            content_type: "application/pdf".to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn payload_requires_exactly_one_part() {
        assert!(matches!(
            TrainingPayload::from_parts(None, None, None),
            Err(IngestError::Validation(_))
        ));

        assert!(matches!(
            TrainingPayload::from_parts(
                Some("job-1".to_string()),
                None,
                Some(("t".to_string(), "c".to_string()))
            ),
            Err(IngestError::Validation(_))
        ));

        assert!(
            TrainingPayload::from_parts(Some("job-1".to_string()), None, None).is_ok()
        );
    }

    #[test]
    fn empty_payload_parts_rejected() {
        assert!(matches!(
            TrainingPayload::from_parts(Some("  ".to_string()), None, None),
            Err(IngestError::Validation(_))
        ));
        assert!(matches!(
            TrainingPayload::from_parts(None, Some(file("empty.pdf", b"")), None),
            Err(IngestError::Validation(_))
        ));
        assert!(matches!(
            TrainingPayload::from_parts(None, None, Some(("title".to_string(), " ".to_string()))),
            Err(IngestError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn train_without_selection_makes_no_network_call() {
        // Backend URLs point at a closed port; any network call would error
        // with a transport failure rather than the expected validation error.
        let store = test_store();
        let chatbot_id = seed_chatbot(&store);

        let err = store
            .train_chatbot(
                "token",
                chatbot_id,
                TrainingPayload::Text {
                    title: "Returns".to_string(),
                    content: "30 days".to_string(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::NoChatbotSelected));
        assert!(err.to_string().contains("No chatbot is selected"));
    }

    #[tokio::test]
    async fn batch_over_cap_rejected() {
        let store = test_store();
        let chatbot_id = seed_chatbot(&store);
        store.select(chatbot_id).unwrap();

        let files: Vec<TrainingFile> = (0..MAX_TRAINING_FILES + 1)
            .map(|i| file(&format!("doc-{}.pdf", i), b"content"))
            .collect();

        let err = store
            .train_files("token", chatbot_id, files)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[tokio::test]
    async fn batch_stops_at_first_failure() {
        let server = MockServer::start().await;

        // First two submissions are accepted, the third fails
        Mock::given(method("POST"))
            .and(path_regex(r"^/train/.+$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "accepted": true })),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/train/.+$"))
            .respond_with(ResponseTemplate::new(500).set_body_string("ingestion worker crashed"))
            .mount(&server)
            .await;

        let store = test_store_with("http://localhost:9999", &server.uri());
        let chatbot_id = seed_chatbot(&store);
        store.select(chatbot_id).unwrap();

        let files = vec![
            file("a.pdf", b"a"),
            file("b.pdf", b"b"),
            file("c.pdf", b"c"),
            file("d.pdf", b"d"),
        ];

        let outcome = store
            .train_files("token", chatbot_id, files)
            .await
            .unwrap();

        assert_eq!(outcome.total, 4);
        assert_eq!(outcome.trained, 2);
        let failure = outcome.failure.expect("batch failed");
        assert_eq!(failure.index, 2);
        assert_eq!(failure.file_name, "c.pdf");

        // File four was never attempted
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
        assert_eq!(store.batch_percent(), 50);
    }

    #[tokio::test]
    async fn oversized_audio_rejected_before_upload() {
        let store = test_store();
        let oversized = TrainingFile {
            name: "call.mp3".to_string(),
            content_type: "audio/mpeg".to_string(),
            bytes: vec![0u8; (MAX_AUDIO_BYTES + 1) as usize],
        };

        let err = store
            .generate_transcript("token", oversized)
            .await
            .unwrap_err();
        match err {
            IngestError::Validation(message) => {
                assert_eq!(message, "Audio files are capped at 100MB")
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let empty = TrainingFile {
            name: "call.mp3".to_string(),
            content_type: "audio/mpeg".to_string(),
            bytes: Vec::new(),
        };
        let err = store.generate_transcript("token", empty).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[tokio::test]
    async fn transcript_error_carries_endpoint_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/transcripts/audio$"))
            .respond_with(ResponseTemplate::new(422).set_body_string("unsupported codec: amr"))
            .mount(&server)
            .await;

        let store = test_store_with("http://localhost:9999", &server.uri());
        let err = store
            .generate_transcript(
                "token",
                TrainingFile {
                    name: "call.amr".to_string(),
                    content_type: "audio/amr".to_string(),
                    bytes: b"data".to_vec(),
                },
            )
            .await
            .unwrap_err();

        match err {
            IngestError::Backend(client_error) => {
                assert_eq!(
                    client_error.upstream_message(),
                    Some("unsupported codec: amr")
                );
            }
            other => panic!("expected backend error, got {:?}", other),
        }
    }
}
