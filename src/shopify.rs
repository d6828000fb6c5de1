//! # Shopify Store
//!
//! Per-chatbot Shopify integration state: `{disconnected, authorizing,
//! connected}`. The OAuth flow is brokered by the training API; this store
//! signs the `state` parameter so the callback can be correlated back to the
//! chatbot it was issued for, and tracks the connection phase in between.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use metrics::counter;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::clients::{ClientError, TrainingClient};
use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

const STATE_NONCE_LEN: usize = 16;
const STATE_TAG_LEN: usize = 32;

/// A persisted Shopify connection scoped to one chatbot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShopifyConnection {
    pub store_name: String,
    #[serde(default)]
    pub last_trained_at: Option<DateTime<Utc>>,
}

/// Connection phase for one chatbot.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ShopifyPhase {
    Disconnected,
    /// Awaiting the OAuth redirect back from Shopify
    Authorizing,
    Connected(ShopifyConnection),
}

/// Errors surfaced by Shopify operations.
#[derive(Debug, Error)]
pub enum ShopifyError {
    #[error("invalid or expired OAuth state")]
    InvalidState,
    #[error("OAuth state secret is not configured")]
    StateSecretMissing,
    #[error("Connect a Shopify store before training on product data")]
    NotConnected,
    #[error(transparent)]
    Backend(#[from] ClientError),
}

impl From<ShopifyError> for ApiError {
    fn from(error: ShopifyError) -> Self {
        match error {
            ShopifyError::InvalidState => crate::error::validation_error(
                "invalid or expired OAuth state",
                serde_json::Value::Null,
            ),
            ShopifyError::StateSecretMissing => ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "OAuth state secret is not configured",
            ),
            ShopifyError::NotConnected => crate::error::validation_error(
                "Connect a Shopify store before training on product data",
                serde_json::Value::Null,
            ),
            ShopifyError::Backend(client_error) => client_error.into(),
        }
    }
}

/// Application-state object tracking per-chatbot Shopify connections.
pub struct ShopifyStore {
    training: TrainingClient,
    state_secret: Option<Vec<u8>>,
    phases: RwLock<HashMap<Uuid, ShopifyPhase>>,
}

impl ShopifyStore {
    /// Creates an empty store over the training API client.
    pub fn new(training: TrainingClient, state_secret: Option<Vec<u8>>) -> Self {
        Self {
            training,
            state_secret,
            phases: RwLock::new(HashMap::new()),
        }
    }

    /// Current phase for a chatbot; unknown chatbots are disconnected.
    pub fn phase(&self, chatbot_id: Uuid) -> ShopifyPhase {
        self.phases
            .read()
            .unwrap()
            .get(&chatbot_id)
            .cloned()
            .unwrap_or(ShopifyPhase::Disconnected)
    }

    fn set_phase(&self, chatbot_id: Uuid, phase: ShopifyPhase) {
        self.phases.write().unwrap().insert(chatbot_id, phase);
    }

    /// Start the OAuth flow: fetch the authorization URL, bind our signed
    /// state to it, and move the chatbot to `authorizing`.
    pub async fn auth_url(
        &self,
        access_token: &str,
        chatbot_id: Uuid,
    ) -> Result<Url, ShopifyError> {
        let state = self.issue_state(chatbot_id)?;

        let mut url = self
            .training
            .shopify_authorize_url(access_token, chatbot_id)
            .await?;
        url.query_pairs_mut().append_pair("state", &state);

        self.set_phase(chatbot_id, ShopifyPhase::Authorizing);
        Ok(url)
    }

    /// Exchange an authorization code for a persisted connection.
    pub async fn connect_with_code(
        &self,
        access_token: &str,
        chatbot_id: Uuid,
        code: &str,
    ) -> Result<ShopifyConnection, ShopifyError> {
        let connection = self
            .training
            .shopify_connect(access_token, chatbot_id, code)
            .await?;

        counter!("shopify_connects_total").increment(1);
        self.set_phase(chatbot_id, ShopifyPhase::Connected(connection.clone()));
        Ok(connection)
    }

    /// Handle the OAuth callback: verify the signed state, then exchange the
    /// code for the chatbot the state was issued for.
    pub async fn handle_callback(
        &self,
        access_token: &str,
        state: &str,
        code: &str,
    ) -> Result<(Uuid, ShopifyConnection), ShopifyError> {
        let chatbot_id = self.verify_state(state)?;
        let connection = self
            .connect_with_code(access_token, chatbot_id, code)
            .await?;
        Ok((chatbot_id, connection))
    }

    /// Disconnect the store. Direct and synchronous; no intermediate state.
    pub async fn disconnect(
        &self,
        access_token: &str,
        chatbot_id: Uuid,
    ) -> Result<(), ShopifyError> {
        self.training
            .shopify_disconnect(access_token, chatbot_id)
            .await?;
        self.set_phase(chatbot_id, ShopifyPhase::Disconnected);
        Ok(())
    }

    /// Trigger training on the connected store's product data; returns and
    /// records the new last-trained timestamp.
    pub async fn sync(
        &self,
        access_token: &str,
        chatbot_id: Uuid,
    ) -> Result<DateTime<Utc>, ShopifyError> {
        let store_name = match self.phase(chatbot_id) {
            ShopifyPhase::Connected(connection) => connection.store_name,
            _ => return Err(ShopifyError::NotConnected),
        };

        let last_trained = self
            .training
            .shopify_train(access_token, chatbot_id)
            .await?;

        self.set_phase(
            chatbot_id,
            ShopifyPhase::Connected(ShopifyConnection {
                store_name,
                last_trained_at: Some(last_trained),
            }),
        );
        Ok(last_trained)
    }

    /// Issue an HMAC-signed state token binding the flow to a chatbot.
    fn issue_state(&self, chatbot_id: Uuid) -> Result<String, ShopifyError> {
        let secret = self
            .state_secret
            .as_deref()
            .ok_or(ShopifyError::StateSecretMissing)?;

        let mut payload = Vec::with_capacity(16 + STATE_NONCE_LEN);
        payload.extend_from_slice(chatbot_id.as_bytes());
        let mut nonce = [0u8; STATE_NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        payload.extend_from_slice(&nonce);

        let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| ShopifyError::InvalidState)?;
        mac.update(&payload);
        let tag = mac.finalize().into_bytes();

        let mut token = payload;
        token.extend_from_slice(&tag);
        Ok(base64_url::encode(&token))
    }

    /// Verify a state token and recover the chatbot it was issued for.
    fn verify_state(&self, state: &str) -> Result<Uuid, ShopifyError> {
        let secret = self
            .state_secret
            .as_deref()
            .ok_or(ShopifyError::StateSecretMissing)?;

        let decoded = base64_url::decode(state).map_err(|_| ShopifyError::InvalidState)?;
        if decoded.len() != 16 + STATE_NONCE_LEN + STATE_TAG_LEN {
            return Err(ShopifyError::InvalidState);
        }

        let (payload, tag) = decoded.split_at(16 + STATE_NONCE_LEN);
        let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| ShopifyError::InvalidState)?;
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        if !bool::from(expected.as_slice().ct_eq(tag)) {
            return Err(ShopifyError::InvalidState);
        }

        Uuid::from_slice(&payload[..16]).map_err(|_| ShopifyError::InvalidState)
    }
}
