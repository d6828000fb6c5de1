//! # Auth Backend Client
//!
//! Client for the authentication-and-database backend. The backend owns
//! credential storage, session issuance, and the account's persisted records
//! (chatbots, API tokens); this client only shuttles requests and decodes
//! responses.

use reqwest::Method;
use url::Url;
use uuid::Uuid;

use crate::chatbots::Chatbot;
use crate::session::{Credentials, Session, SessionEvent};
use crate::tokens::{ApiTokenInfo, CreatedToken};

use super::{AUTH_SERVICE, ClientError, NdjsonLines, Timeouts, check_status, read_json, with_budget};

/// Typed client for the auth backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base: Url,
    anon_key: Option<String>,
    timeouts: Timeouts,
}

/// Wire shape shared by sign-in, sign-up, and session retrieval.
#[derive(Debug, serde::Deserialize)]
struct SessionEnvelope {
    access_token: String,
    #[serde(default)]
    seq: u64,
    user: crate::session::UserProfile,
}

impl SessionEnvelope {
    fn into_session(self) -> Session {
        Session {
            access_token: self.access_token,
            user: self.user,
            seq: self.seq,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct AuthorizeUrlEnvelope {
    url: Url,
}

impl BackendClient {
    /// Creates a client rooted at the backend base URL.
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        anon_key: Option<String>,
        timeouts: Timeouts,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            http,
            base: Url::parse(base_url)?,
            anon_key,
            timeouts,
        })
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, self.endpoint(path));
        if let Some(key) = &self.anon_key {
            builder = builder.header("apikey", key);
        }
        builder
    }

    fn authed(&self, method: Method, path: &str, access_token: &str) -> reqwest::RequestBuilder {
        self.request(method, path).bearer_auth(access_token)
    }

    async fn send(
        &self,
        budget: std::time::Duration,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        with_budget(AUTH_SERVICE, budget, async {
            builder
                .send()
                .await
                .map_err(|source| ClientError::Transport {
                    service: AUTH_SERVICE,
                    source,
                })
        })
        .await
    }

    /// Exchange email/password credentials for a session.
    pub async fn password_sign_in(&self, credentials: &Credentials) -> Result<Session, ClientError> {
        let builder = self
            .request(Method::POST, "/auth/v1/token")
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({
                "email": credentials.email,
                "password": credentials.password,
            }));
        let response = self.send(self.timeouts.request, builder).await?;
        let envelope: SessionEnvelope = read_json(AUTH_SERVICE, response).await?;
        Ok(envelope.into_session())
    }

    /// Register a new account; the backend signs the account in on success.
    pub async fn sign_up(&self, credentials: &Credentials) -> Result<Session, ClientError> {
        let builder = self
            .request(Method::POST, "/auth/v1/signup")
            .json(&serde_json::json!({
                "email": credentials.email,
                "password": credentials.password,
            }));
        let response = self.send(self.timeouts.request, builder).await?;
        let envelope: SessionEnvelope = read_json(AUTH_SERVICE, response).await?;
        Ok(envelope.into_session())
    }

    /// Fetch the provider authorization URL for a federated sign-in.
    pub async fn oauth_authorize_url(&self, provider: &str) -> Result<Url, ClientError> {
        let builder = self
            .request(Method::GET, "/auth/v1/authorize")
            .query(&[("provider", provider)]);
        let response = self.send(self.timeouts.request, builder).await?;
        let envelope: AuthorizeUrlEnvelope = read_json(AUTH_SERVICE, response).await?;
        Ok(envelope.url)
    }

    /// Revoke the session behind `access_token`.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), ClientError> {
        let builder = self.authed(Method::POST, "/auth/v1/logout", access_token);
        let response = self.send(self.timeouts.request, builder).await?;
        check_status(AUTH_SERVICE, response).await?;
        Ok(())
    }

    /// Trigger a password-recovery email.
    pub async fn reset_password(&self, email: &str) -> Result<(), ClientError> {
        let builder = self
            .request(Method::POST, "/auth/v1/recover")
            .json(&serde_json::json!({ "email": email }));
        let response = self.send(self.timeouts.request, builder).await?;
        check_status(AUTH_SERVICE, response).await?;
        Ok(())
    }

    /// Update the signed-in account's password.
    pub async fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<(), ClientError> {
        let builder = self
            .authed(Method::PUT, "/auth/v1/user", access_token)
            .json(&serde_json::json!({ "password": new_password }));
        let response = self.send(self.timeouts.request, builder).await?;
        check_status(AUTH_SERVICE, response).await?;
        Ok(())
    }

    /// Retrieve the session behind `access_token`.
    ///
    /// Returns `Ok(None)` when the backend no longer recognizes the token;
    /// that is the caller's "no session" signal, not an error.
    pub async fn fetch_session(&self, access_token: &str) -> Result<Option<Session>, ClientError> {
        let builder = self.authed(Method::GET, "/auth/v1/user", access_token);
        let response = self.send(self.timeouts.request, builder).await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let envelope: SessionEnvelope = read_json(AUTH_SERVICE, response).await?;
        Ok(Some(envelope.into_session()))
    }

    /// Open the session-change event stream (newline-delimited JSON).
    pub async fn open_session_events(
        &self,
        access_token: Option<&str>,
    ) -> Result<SessionEventStream, ClientError> {
        let mut builder = self.request(Method::GET, "/auth/v1/events");
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }

        let response = self.send(self.timeouts.request, builder).await?;
        let response = check_status(AUTH_SERVICE, response).await?;
        Ok(SessionEventStream {
            lines: NdjsonLines::new(AUTH_SERVICE, response, self.timeouts.stream_idle),
        })
    }

    /// List the chatbots owned by the signed-in account.
    pub async fn list_chatbots(&self, access_token: &str) -> Result<Vec<Chatbot>, ClientError> {
        let builder = self.authed(Method::GET, "/rest/v1/chatbots", access_token);
        let response = self.send(self.timeouts.request, builder).await?;
        read_json(AUTH_SERVICE, response).await
    }

    /// Create an API token; the secret in the response is shown exactly once.
    pub async fn create_api_token(
        &self,
        access_token: &str,
        name: &str,
    ) -> Result<CreatedToken, ClientError> {
        let builder = self
            .authed(Method::POST, "/rest/v1/api_tokens", access_token)
            .json(&serde_json::json!({ "name": name }));
        let response = self.send(self.timeouts.request, builder).await?;
        read_json(AUTH_SERVICE, response).await
    }

    /// List API tokens (secrets omitted by the backend).
    pub async fn list_api_tokens(
        &self,
        access_token: &str,
    ) -> Result<Vec<ApiTokenInfo>, ClientError> {
        let builder = self.authed(Method::GET, "/rest/v1/api_tokens", access_token);
        let response = self.send(self.timeouts.request, builder).await?;
        read_json(AUTH_SERVICE, response).await
    }

    /// Delete an API token by id.
    pub async fn delete_api_token(
        &self,
        access_token: &str,
        token_id: Uuid,
    ) -> Result<(), ClientError> {
        let path = format!("/rest/v1/api_tokens/{}", token_id);
        let builder = self.authed(Method::DELETE, &path, access_token);
        let response = self.send(self.timeouts.request, builder).await?;
        check_status(AUTH_SERVICE, response).await?;
        Ok(())
    }
}

/// Stream of session-change events pushed by the backend.
pub struct SessionEventStream {
    lines: NdjsonLines,
}

impl SessionEventStream {
    /// Returns the next event, or `None` when the backend closes the stream.
    pub async fn next_event(&mut self) -> Result<Option<SessionEvent>, ClientError> {
        match self.lines.next_line().await? {
            Some(line) => {
                let event =
                    serde_json::from_str::<SessionEvent>(&line).map_err(|e| {
                        ClientError::Malformed {
                            service: AUTH_SERVICE,
                            detail: format!("bad session event: {}", e),
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

    fn test_client(base: &str) -> BackendClient {
        let timeouts = Timeouts::from(&TimeoutConfig::default());
        let http = crate::clients::build_http_client(&timeouts).expect("client builds");
        BackendClient::new(http, base, Some("anon-key".to_string()), timeouts)
            .expect("valid base url")
    }

    #[test]
    fn endpoint_joins_paths_against_base() {
        let client = test_client("http://localhost:9999");
        assert_eq!(
            client.endpoint("/auth/v1/token").as_str(),
            "http://localhost:9999/auth/v1/token"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let timeouts = Timeouts::from(&TimeoutConfig::default());
        let http = crate::clients::build_http_client(&timeouts).expect("client builds");
        assert!(BackendClient::new(http, "not a url", None, timeouts).is_err());
    }
}
