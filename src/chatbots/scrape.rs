//! # URL Scraping
//!
//! Starts scrape jobs against the training API and tracks their streamed
//! progress. Events are applied in arrival order with no deduplication or
//! reordering; the scanned-URL set is purely local state that can be
//! retracted before training without touching the network.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{ChatbotStore, IngestError};
use crate::clients::training::ScrapeProgress;

/// A URL-content-extraction task tracked by server-issued job id.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScrapeJob {
    pub job_id: String,
    pub url: String,
    /// Completion percentage, 0-100, driving the progress bar
    pub progress: u8,
    /// Status text shown next to the bar
    pub status: String,
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// A URL the user has submitted for scanning in the links wizard.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScannedUrl {
    pub url: String,
    pub job_id: String,
}

impl ChatbotStore {
    /// Validate and submit a URL for scraping; returns the job id used to
    /// correlate progress events.
    ///
    /// Only `http` and `https` URLs are accepted; anything else is rejected
    /// before any network call.
    pub async fn scrape_url(
        self: &Arc<Self>,
        access_token: &str,
        chatbot_id: Uuid,
        raw_url: &str,
    ) -> Result<String, IngestError> {
        let url = Url::parse(raw_url)
            .map_err(|_| IngestError::Validation("Enter a valid URL".to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(IngestError::Validation(
                "Only http and https URLs can be scanned".to_string(),
            ));
        }
        let chatbot_id = self.require_selected(chatbot_id)?;

        self.flags().scraping.store(true, Ordering::SeqCst);
        let _reset = scopeguard::guard(&self.flags().scraping, |flag| {
            flag.store(false, Ordering::SeqCst)
        });

        let job_id = self
            .training()
            .start_scrape(access_token, chatbot_id, &url)
            .await?;

        {
            let mut jobs = self.jobs.write().unwrap();
            jobs.insert(
                job_id.clone(),
                ScrapeJob {
                    job_id: job_id.clone(),
                    url: url.to_string(),
                    progress: 0,
                    status: "queued".to_string(),
                    done: false,
                    error: None,
                    started_at: Utc::now(),
                },
            );
        }
        {
            // One scanned entry per URL; re-submitting replaces the old job ref
            let mut scanned = self.scanned.write().unwrap();
            scanned.retain(|entry| entry.url != url.as_str());
            scanned.push(ScannedUrl {
                url: url.to_string(),
                job_id: job_id.clone(),
            });
        }

        self.spawn_progress_watcher(access_token.to_string(), job_id.clone());
        counter!("scrape_jobs_started_total").increment(1);

        Ok(job_id)
    }

    /// Remove a URL from the locally tracked scanned set. Purely a
    /// client-side retraction; no backend call is made.
    pub fn remove_url(&self, url: &str) -> bool {
        let mut scanned = self.scanned.write().unwrap();
        let before = scanned.len();
        scanned.retain(|entry| entry.url != url);
        before != scanned.len()
    }

    /// Snapshot of the scanned-URL set.
    pub fn scanned_urls(&self) -> Vec<ScannedUrl> {
        self.scanned.read().unwrap().clone()
    }

    /// Look up a tracked scrape job.
    pub fn scrape_job(&self, job_id: &str) -> Option<ScrapeJob> {
        self.jobs.read().unwrap().get(job_id).cloned()
    }

    /// Apply one progress event to a tracked job, in arrival order.
    pub(crate) fn apply_progress(&self, job_id: &str, event: ScrapeProgress) {
        counter!("scrape_progress_events_total").increment(1);
        let mut jobs = self.jobs.write().unwrap();
        if let Some(job) = jobs.get_mut(job_id) {
            job.progress = event.percentage.min(100);
            job.status = event.status;
            job.done = event.done || event.error.is_some();
            if event.error.is_some() {
                job.error = event.error;
            }
        }
    }

    fn mark_job_interrupted(&self, job_id: &str, message: String) {
        let mut jobs = self.jobs.write().unwrap();
        if let Some(job) = jobs.get_mut(job_id)
            && !job.done
        {
            job.done = true;
            job.status = "progress stream interrupted".to_string();
            job.error = Some(message);
        }
    }

    /// Consume the job's progress stream in the background, writing events
    /// into the store as they arrive. The watcher dies with the store's
    /// cancellation token on shutdown.
    fn spawn_progress_watcher(self: &Arc<Self>, access_token: String, job_id: String) {
        let store = Arc::clone(self);
        let cancel = self.watcher_token();

        tokio::spawn(async move {
            let mut stream = match store
                .training()
                .open_scrape_events(&access_token, &job_id)
                .await
            {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::warn!(job_id = %job_id, error = %err, "failed to open scrape progress stream");
                    store.mark_job_interrupted(&job_id, err.to_string());
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = stream.next_event() => {
                        match event {
                            Ok(Some(progress)) => {
                                let terminal = progress.done || progress.error.is_some();
                                store.apply_progress(&job_id, progress);
                                if terminal {
                                    return;
                                }
                            }
                            Ok(None) => return,
                            Err(err) => {
                                tracing::warn!(job_id = %job_id, error = %err, "scrape progress stream failed");
                                store.mark_job_interrupted(&job_id, err.to_string());
                                return;
                            }
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{seed_chatbot, test_store, test_store_with};
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn non_http_scheme_rejected_without_network() {
        let store = Arc::new(test_store());
        let chatbot_id = seed_chatbot(&store);
        store.select(chatbot_id).unwrap();

        for bad in ["ftp://example.com", "javascript:alert(1)", "not a url"] {
            let err = store
                .scrape_url("token", chatbot_id, bad)
                .await
                .unwrap_err();
            assert!(matches!(err, IngestError::Validation(_)), "input: {}", bad);
        }
        assert!(store.scanned_urls().is_empty());
    }

    #[tokio::test]
    async fn scrape_requires_selected_chatbot() {
        let store = Arc::new(test_store());
        let chatbot_id = seed_chatbot(&store);

        let err = store
            .scrape_url("token", chatbot_id, "https://example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::NoChatbotSelected));
    }

    #[tokio::test]
    async fn scanned_url_tracked_and_removed_locally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scrape"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "job_id": "job-42" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/scrape/.+/events$"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "{\"percentage\":100,\"status\":\"complete\",\"done\":true}\n",
                "application/x-ndjson",
            ))
            .mount(&server)
            .await;

        let store = Arc::new(test_store_with("http://localhost:9999", &server.uri()));
        let chatbot_id = seed_chatbot(&store);
        store.select(chatbot_id).unwrap();

        let job_id = store
            .scrape_url("token", chatbot_id, "https://example.com")
            .await
            .unwrap();
        assert_eq!(job_id, "job-42");

        let scanned = store.scanned_urls();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].url, "https://example.com/");
        assert_eq!(scanned[0].job_id, "job-42");

        // Wait for the watcher to drain the progress stream
        for _ in 0..50 {
            if store.scrape_job("job-42").is_some_and(|job| job.done) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let job = store.scrape_job("job-42").unwrap();
        assert!(job.done);
        assert_eq!(job.progress, 100);

        let requests_before = server.received_requests().await.unwrap().len();
        assert!(store.remove_url("https://example.com/"));
        assert!(store.scanned_urls().is_empty());
        // Removal is purely local
        assert_eq!(
            server.received_requests().await.unwrap().len(),
            requests_before
        );
    }

    #[test]
    fn progress_applied_in_arrival_order() {
        let store = test_store();
        store.jobs.write().unwrap().insert(
            "job-1".to_string(),
            ScrapeJob {
                job_id: "job-1".to_string(),
                url: "https://example.com/".to_string(),
                progress: 0,
                status: "queued".to_string(),
                done: false,
                error: None,
                started_at: Utc::now(),
            },
        );

        store.apply_progress(
            "job-1",
            ScrapeProgress {
                percentage: 60,
                status: "crawling".to_string(),
                done: false,
                error: None,
            },
        );
        // A late, lower-percentage event still wins: arrival order, no reordering
        store.apply_progress(
            "job-1",
            ScrapeProgress {
                percentage: 40,
                status: "retrying page".to_string(),
                done: false,
                error: None,
            },
        );

        let job = store.scrape_job("job-1").unwrap();
        assert_eq!(job.progress, 40);
        assert_eq!(job.status, "retrying page");
        assert!(!job.done);
    }
}
