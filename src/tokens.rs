//! # API Token Store
//!
//! Account API tokens: created and deleted through explicit user action,
//! persisted by the backend. The secret is returned exactly once at creation
//! time and held in zeroizing memory until rendered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::clients::{BackendClient, ClientError};
use crate::error::ApiError;

/// Maximum accepted token display-name length.
pub const MAX_TOKEN_NAME_LEN: usize = 64;

/// An API token as listed after creation; the secret is never included.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiTokenInfo {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Secret material shown once and then dropped; zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct OneTimeSecret(String);

impl OneTimeSecret {
    pub fn new(secret: String) -> Self {
        Self(secret)
    }

    /// The secret value, for the single render it gets.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for OneTimeSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OneTimeSecret([REDACTED])")
    }
}

impl Serialize for OneTimeSecret {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for OneTimeSecret {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(String::deserialize(deserializer)?))
    }
}

/// Creation response carrying the one-time-visible secret.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatedToken {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Displayed once; subsequent listings omit it
    #[schema(value_type = String)]
    pub secret: OneTimeSecret,
}

/// Errors surfaced by token operations.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Caught locally before any network call.
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Backend(#[from] ClientError),
}

impl From<TokenError> for ApiError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::Validation(message) => {
                crate::error::validation_error(&message, serde_json::Value::Null)
            }
            TokenError::Backend(client_error) => client_error.into(),
        }
    }
}

/// Application-state object for API token management.
pub struct TokenStore {
    backend: BackendClient,
}

impl TokenStore {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    /// Create a token; the response carries the only copy of the secret.
    pub async fn create(
        &self,
        access_token: &str,
        name: &str,
    ) -> Result<CreatedToken, TokenError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TokenError::Validation("Token name is required".to_string()));
        }
        if name.len() > MAX_TOKEN_NAME_LEN {
            return Err(TokenError::Validation(format!(
                "Token names are capped at {} characters",
                MAX_TOKEN_NAME_LEN
            )));
        }

        Ok(self.backend.create_api_token(access_token, name).await?)
    }

    /// List the account's tokens; secrets are never included.
    pub async fn list(&self, access_token: &str) -> Result<Vec<ApiTokenInfo>, TokenError> {
        Ok(self.backend.list_api_tokens(access_token).await?)
    }

    /// Delete a token by id.
    pub async fn delete(&self, access_token: &str, token_id: Uuid) -> Result<(), TokenError> {
        Ok(self.backend.delete_api_token(access_token, token_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{Timeouts, build_http_client};
    use crate::config::TimeoutConfig;

    fn test_store() -> TokenStore {
        let timeouts = Timeouts::from(&TimeoutConfig::default());
        let http = build_http_client(&timeouts).unwrap();
        let backend =
            BackendClient::new(http, "http://localhost:9999", None, timeouts).unwrap();
        TokenStore::new(backend)
    }

    #[tokio::test]
    async fn blank_name_rejected_locally() {
        let store = test_store();
        let err = store.create("token", "   ").await.unwrap_err();
        assert!(matches!(err, TokenError::Validation(_)));

        let too_long = "x".repeat(MAX_TOKEN_NAME_LEN + 1);
        let err = store.create("token", &too_long).await.unwrap_err();
        assert!(matches!(err, TokenError::Validation(_)));
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = OneTimeSecret::new("sk-super-secret".to_string());
        assert_eq!(format!("{:?}", secret), "OneTimeSecret([REDACTED])");
        assert_eq!(secret.expose(), "sk-super-secret");
    }

    #[test]
    fn created_token_serializes_secret_once() {
        let token = CreatedToken {
            id: Uuid::new_v4(),
            name: "ci".to_string(),
            created_at: Utc::now(),
            secret: OneTimeSecret::new("sk-abc".to_string()),
        };

        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json.get("secret").unwrap(), "sk-abc");
    }
}
