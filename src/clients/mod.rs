//! # External Service Clients
//!
//! Typed HTTP clients for the two external collaborators: the
//! authentication-and-database backend and the chatbot training API. Every
//! call runs under an explicit timeout budget; long-lived event streams are
//! consumed through [`NdjsonLines`] with an idle budget between chunks.

use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::TimeoutConfig;
use crate::error::{ApiError, upstream_error};

pub mod backend;
pub mod training;

pub use backend::BackendClient;
pub use training::TrainingClient;

/// Service label used in errors and logs for the auth backend.
pub const AUTH_SERVICE: &str = "auth-backend";
/// Service label used in errors and logs for the training API.
pub const TRAINING_SERVICE: &str = "training-api";

/// Errors produced by external service clients.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {service} timed out after {budget_ms}ms")]
    Timeout { service: &'static str, budget_ms: u64 },
    #[error("request to {service} failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} rejected the request with status {status}: {message}")]
    Rejected {
        service: &'static str,
        status: u16,
        message: String,
    },
    #[error("{service} returned a malformed response: {detail}")]
    Malformed {
        service: &'static str,
        detail: String,
    },
}

impl ClientError {
    /// The upstream service this error originated from.
    pub fn service(&self) -> &'static str {
        match self {
            ClientError::Timeout { service, .. }
            | ClientError::Transport { service, .. }
            | ClientError::Rejected { service, .. }
            | ClientError::Malformed { service, .. } => service,
        }
    }

    /// The upstream HTTP status, when the service answered at all.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            ClientError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The upstream response body, verbatim, when the service answered.
    pub fn upstream_message(&self) -> Option<&str> {
        match self {
            ClientError::Rejected { message, .. } => Some(message.as_str()),
            _ => None,
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Timeout { service, budget_ms } => {
                tracing::error!(service, budget_ms, "upstream request timed out");
                ApiError::new(
                    axum::http::StatusCode::GATEWAY_TIMEOUT,
                    "UPSTREAM_TIMEOUT",
                    "Upstream service did not respond in time",
                )
            }
            ClientError::Transport { service, source } => {
                tracing::error!(service, error = %source, "upstream transport failure");
                if source.is_connect() {
                    ApiError::new(
                        axum::http::StatusCode::SERVICE_UNAVAILABLE,
                        "SERVICE_UNAVAILABLE",
                        "Upstream service unavailable",
                    )
                } else {
                    ApiError::new(
                        axum::http::StatusCode::BAD_GATEWAY,
                        "UPSTREAM_ERROR",
                        "Upstream service request failed",
                    )
                }
            }
            ClientError::Rejected {
                service,
                status,
                message,
            } => {
                tracing::error!(service, status, %message, "upstream rejected request");
                upstream_error(service.to_string(), status, Some(message))
            }
            ClientError::Malformed { service, detail } => {
                tracing::error!(service, %detail, "upstream response malformed");
                ApiError::new(
                    axum::http::StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "Upstream service returned an unexpected response",
                )
            }
        }
    }
}

/// Resolved timeout budgets for one client.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub connect: Duration,
    pub request: Duration,
    pub upload: Duration,
    pub stream_idle: Duration,
}

impl From<&TimeoutConfig> for Timeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            connect: Duration::from_millis(config.connect_ms),
            request: Duration::from_millis(config.request_ms),
            upload: Duration::from_millis(config.upload_ms),
            stream_idle: Duration::from_millis(config.stream_idle_ms),
        }
    }
}

/// Builds the shared reqwest client with the configured connect budget.
pub fn build_http_client(timeouts: &Timeouts) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(timeouts.connect)
        .build()
}

/// Runs `future` under `budget`, converting elapsed budgets into [`ClientError::Timeout`].
pub(crate) async fn with_budget<T, F>(
    service: &'static str,
    budget: Duration,
    future: F,
) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match tokio::time::timeout(budget, future).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout {
            service,
            budget_ms: budget.as_millis() as u64,
        }),
    }
}

/// Checks the response status, turning non-2xx answers into [`ClientError::Rejected`]
/// with the upstream body carried verbatim.
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(ClientError::Rejected {
        service,
        status: status.as_u16(),
        message,
    })
}

/// Checks the status and decodes a JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    service: &'static str,
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let response = check_status(service, response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ClientError::Malformed {
            service,
            detail: e.to_string(),
        })
}

/// Reader for newline-delimited JSON event streams.
///
/// Applies the idle budget between chunks so a stalled upstream stream
/// surfaces as a timeout instead of hanging the consumer forever.
pub struct NdjsonLines {
    service: &'static str,
    response: reqwest::Response,
    buffer: Vec<u8>,
    idle: Duration,
}

impl NdjsonLines {
    pub(crate) fn new(service: &'static str, response: reqwest::Response, idle: Duration) -> Self {
        Self {
            service,
            response,
            buffer: Vec::new(),
            idle,
        }
    }

    /// Returns the next non-empty line, or `None` when the stream ends.
    pub async fn next_line(&mut self) -> Result<Option<String>, ClientError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw[..pos]).trim().to_string();
                if line.is_empty() {
                    continue;
                }
                return Ok(Some(line));
            }

            let service = self.service;
            let idle = self.idle;
            let chunk = with_budget(service, idle, async {
                self.response
                    .chunk()
                    .await
                    .map_err(|source| ClientError::Transport { service, source })
            })
            .await?;

            match chunk {
                Some(bytes) => self.buffer.extend_from_slice(&bytes),
                None => {
                    // Stream ended; flush a trailing line without a newline.
                    let line = String::from_utf8_lossy(&self.buffer).trim().to_string();
                    self.buffer.clear();
                    if line.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(line));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn budget_elapses_into_timeout() {
        let result: Result<(), ClientError> =
            with_budget(TRAINING_SERVICE, Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        match result {
            Err(ClientError::Timeout { service, budget_ms }) => {
                assert_eq!(service, TRAINING_SERVICE);
                assert_eq!(budget_ms, 10);
            }
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rejected_error_exposes_upstream_detail() {
        let error = ClientError::Rejected {
            service: AUTH_SERVICE,
            status: 401,
            message: "invalid login credentials".to_string(),
        };

        assert_eq!(error.service(), AUTH_SERVICE);
        assert_eq!(error.upstream_status(), Some(401));
        assert_eq!(error.upstream_message(), Some("invalid login credentials"));
    }

    #[test]
    fn timeouts_resolve_from_config() {
        let config = TimeoutConfig {
            connect_ms: 1_000,
            request_ms: 10_000,
            upload_ms: 60_000,
            stream_idle_ms: 15_000,
        };
        let timeouts = Timeouts::from(&config);
        assert_eq!(timeouts.connect, Duration::from_secs(1));
        assert_eq!(timeouts.request, Duration::from_secs(10));
        assert_eq!(timeouts.upload, Duration::from_secs(60));
        assert_eq!(timeouts.stream_idle, Duration::from_secs(15));
    }
}
