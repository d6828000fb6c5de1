//! # Training API Client
//!
//! Client for the chatbot training/ingestion API: knowledge submission
//! (files, scrape jobs, text), URL scraping with a streamed progress feed,
//! audio/YouTube transcription, and the per-chatbot Shopify integration.
//! Training itself is asynchronous server-side; submissions only confirm
//! that the job was accepted.

use chrono::{DateTime, Utc};
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use url::Url;
use uuid::Uuid;

use crate::chatbots::ingestion::{TrainAck, TrainingFile};
use crate::shopify::ShopifyConnection;

use super::{
    ClientError, NdjsonLines, TRAINING_SERVICE, Timeouts, check_status, read_json, with_budget,
};

/// Typed client for the training API.
#[derive(Debug, Clone)]
pub struct TrainingClient {
    http: reqwest::Client,
    base: Url,
    api_key: Option<String>,
    timeouts: Timeouts,
}

/// One progress event from a scrape-job stream, applied in arrival order.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct ScrapeProgress {
    /// Completion percentage, 0-100
    pub percentage: u8,
    /// Human-readable status line for the progress UI
    pub status: String,
    /// Terminal marker; no further events follow once set
    #[serde(default)]
    pub done: bool,
    /// Terminal failure message, if the job failed
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ScrapeJobEnvelope {
    job_id: String,
}

#[derive(Debug, serde::Deserialize)]
struct TranscriptEnvelope {
    transcript: String,
}

#[derive(Debug, serde::Deserialize)]
struct AuthorizeUrlEnvelope {
    url: Url,
}

#[derive(Debug, serde::Deserialize)]
struct ShopifyTrainEnvelope {
    last_trained_at: DateTime<Utc>,
}

impl TrainingClient {
    /// Creates a client rooted at the training API base URL.
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        api_key: Option<String>,
        timeouts: Timeouts,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            http,
            base: Url::parse(base_url)?,
            api_key,
            timeouts,
        })
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url
    }

    fn request(&self, method: Method, path: &str, access_token: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, self.endpoint(path))
            .bearer_auth(access_token);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }
        builder
    }

    async fn send(
        &self,
        budget: std::time::Duration,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        with_budget(TRAINING_SERVICE, budget, async {
            builder
                .send()
                .await
                .map_err(|source| ClientError::Transport {
                    service: TRAINING_SERVICE,
                    source,
                })
        })
        .await
    }

    fn file_part(file: &TrainingFile) -> Result<Part, ClientError> {
        Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| ClientError::Malformed {
                service: TRAINING_SERVICE,
                detail: format!("invalid content type '{}': {}", file.content_type, e),
            })
    }

    /// Submit one file for training.
    pub async fn train_with_file(
        &self,
        access_token: &str,
        chatbot_id: Uuid,
        file: &TrainingFile,
    ) -> Result<TrainAck, ClientError> {
        let form = Form::new().part("file", Self::file_part(file)?);
        let builder = self
            .request(Method::POST, &format!("/train/{}", chatbot_id), access_token)
            .multipart(form);
        let response = self.send(self.timeouts.upload, builder).await?;
        read_json(TRAINING_SERVICE, response).await
    }

    /// Submit the results of a completed scrape job for training.
    pub async fn train_with_scrape_job(
        &self,
        access_token: &str,
        chatbot_id: Uuid,
        scrape_job_id: &str,
    ) -> Result<TrainAck, ClientError> {
        let builder = self
            .request(Method::POST, &format!("/train/{}", chatbot_id), access_token)
            .json(&serde_json::json!({ "scrape_job_id": scrape_job_id }));
        let response = self.send(self.timeouts.request, builder).await?;
        read_json(TRAINING_SERVICE, response).await
    }

    /// Submit a title/content text payload for training.
    pub async fn train_with_text(
        &self,
        access_token: &str,
        chatbot_id: Uuid,
        title: &str,
        content: &str,
    ) -> Result<TrainAck, ClientError> {
        let builder = self
            .request(Method::POST, &format!("/train/{}", chatbot_id), access_token)
            .json(&serde_json::json!({ "title": title, "content": content }));
        let response = self.send(self.timeouts.request, builder).await?;
        read_json(TRAINING_SERVICE, response).await
    }

    /// Start a URL scrape; returns the server-issued job id.
    pub async fn start_scrape(
        &self,
        access_token: &str,
        chatbot_id: Uuid,
        url: &Url,
    ) -> Result<String, ClientError> {
        let builder = self
            .request(Method::POST, "/scrape", access_token)
            .json(&serde_json::json!({ "chatbot_id": chatbot_id, "url": url }));
        let response = self.send(self.timeouts.request, builder).await?;
        let envelope: ScrapeJobEnvelope = read_json(TRAINING_SERVICE, response).await?;
        Ok(envelope.job_id)
    }

    /// Open the progress stream for a scrape job (newline-delimited JSON).
    pub async fn open_scrape_events(
        &self,
        access_token: &str,
        job_id: &str,
    ) -> Result<ScrapeEventStream, ClientError> {
        let builder = self.request(
            Method::GET,
            &format!("/scrape/{}/events", job_id),
            access_token,
        );
        let response = self.send(self.timeouts.request, builder).await?;
        let response = check_status(TRAINING_SERVICE, response).await?;
        Ok(ScrapeEventStream {
            lines: NdjsonLines::new(TRAINING_SERVICE, response, self.timeouts.stream_idle),
        })
    }

    /// Transcribe an uploaded audio file; returns the plain transcript text.
    pub async fn transcribe_audio(
        &self,
        access_token: &str,
        file: &TrainingFile,
    ) -> Result<String, ClientError> {
        let form = Form::new().part("file", Self::file_part(file)?);
        let builder = self
            .request(Method::POST, "/transcripts/audio", access_token)
            .multipart(form);
        let response = self.send(self.timeouts.upload, builder).await?;
        let envelope: TranscriptEnvelope = read_json(TRAINING_SERVICE, response).await?;
        Ok(envelope.transcript)
    }

    /// Transcribe a YouTube video; returns the plain transcript text.
    pub async fn transcribe_youtube(
        &self,
        access_token: &str,
        url: &Url,
    ) -> Result<String, ClientError> {
        let builder = self
            .request(Method::POST, "/transcripts/youtube", access_token)
            .json(&serde_json::json!({ "url": url }));
        let response = self.send(self.timeouts.request, builder).await?;
        let envelope: TranscriptEnvelope = read_json(TRAINING_SERVICE, response).await?;
        Ok(envelope.transcript)
    }

    /// Fetch the Shopify authorization URL for a chatbot.
    pub async fn shopify_authorize_url(
        &self,
        access_token: &str,
        chatbot_id: Uuid,
    ) -> Result<Url, ClientError> {
        let builder = self.request(
            Method::GET,
            &format!("/shopify/{}/authorize", chatbot_id),
            access_token,
        );
        let response = self.send(self.timeouts.request, builder).await?;
        let envelope: AuthorizeUrlEnvelope = read_json(TRAINING_SERVICE, response).await?;
        Ok(envelope.url)
    }

    /// Exchange an OAuth authorization code for a persisted Shopify connection.
    pub async fn shopify_connect(
        &self,
        access_token: &str,
        chatbot_id: Uuid,
        code: &str,
    ) -> Result<ShopifyConnection, ClientError> {
        let builder = self
            .request(
                Method::POST,
                &format!("/shopify/{}/connect", chatbot_id),
                access_token,
            )
            .json(&serde_json::json!({ "code": code }));
        let response = self.send(self.timeouts.request, builder).await?;
        read_json(TRAINING_SERVICE, response).await
    }

    /// Disconnect the Shopify store from a chatbot.
    pub async fn shopify_disconnect(
        &self,
        access_token: &str,
        chatbot_id: Uuid,
    ) -> Result<(), ClientError> {
        let builder = self.request(
            Method::DELETE,
            &format!("/shopify/{}", chatbot_id),
            access_token,
        );
        let response = self.send(self.timeouts.request, builder).await?;
        check_status(TRAINING_SERVICE, response).await?;
        Ok(())
    }

    /// Trigger training on the connected store's product data.
    pub async fn shopify_train(
        &self,
        access_token: &str,
        chatbot_id: Uuid,
    ) -> Result<DateTime<Utc>, ClientError> {
        let builder = self.request(
            Method::POST,
            &format!("/shopify/{}/train", chatbot_id),
            access_token,
        );
        let response = self.send(self.timeouts.request, builder).await?;
        let envelope: ShopifyTrainEnvelope = read_json(TRAINING_SERVICE, response).await?;
        Ok(envelope.last_trained_at)
    }
}

/// Stream of scrape-job progress events.
pub struct ScrapeEventStream {
    lines: NdjsonLines,
}

impl ScrapeEventStream {
    /// Returns the next progress event, or `None` when the stream ends.
    pub async fn next_event(&mut self) -> Result<Option<ScrapeProgress>, ClientError> {
        match self.lines.next_line().await? {
            Some(line) => {
                let event =
                    serde_json::from_str::<ScrapeProgress>(&line).map_err(|e| {
                        ClientError::Malformed {
                            service: TRAINING_SERVICE,
                            detail: format!("bad progress event: {}", e),
                        }
                    })?;
                Ok(Some(event))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeoutConfig;

    #[test]
    fn progress_event_decodes_with_defaults() {
        let event: ScrapeProgress =
            serde_json::from_str(r#"{"percentage":40,"status":"crawling pages"}"#).unwrap();
        assert_eq!(event.percentage, 40);
        assert_eq!(event.status, "crawling pages");
        assert!(!event.done);
        assert!(event.error.is_none());
    }

    #[test]
    fn endpoint_joins_paths_against_base() {
        let timeouts = Timeouts::from(&TimeoutConfig::default());
        let http = crate::clients::build_http_client(&timeouts).expect("client builds");
        let client = TrainingClient::new(http, "http://localhost:8000", None, timeouts)
            .expect("valid base url");
        let id = Uuid::nil();
        assert_eq!(
            client.endpoint(&format!("/train/{}", id)).as_str(),
            format!("http://localhost:8000/train/{}", id)
        );
    }
}
