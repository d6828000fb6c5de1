//! # Session Store
//!
//! Holds the current authentication session and exposes the credential
//! operations, all delegating to the auth backend. The store is an explicit
//! application-state object injected through `AppState`; it owns every
//! mutation of session state and notifies subscribers on change.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use lru::LruCache;
use metrics::counter;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::clients::{BackendClient, ClientError};
use crate::error::ApiError;

pub mod provider;

pub use provider::SessionProvider;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles")
});

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Profile embedded in every session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// The authenticated identity and token material for the current user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user: UserProfile,
    /// Backend-issued sequence number; newer sessions carry larger values.
    #[serde(default)]
    pub seq: u64,
}

/// One session-change notification from the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionEvent {
    pub seq: u64,
    pub session: Option<Session>,
}

/// Email/password credential pair.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Claims carried by backend-issued session tokens.
#[derive(Debug, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub exp: u64,
    #[serde(default)]
    pub seq: u64,
}

impl SessionClaims {
    /// Builds a session from locally verified claims.
    pub fn into_session(self, access_token: &str) -> Session {
        Session {
            access_token: access_token.to_string(),
            user: UserProfile {
                id: self.sub,
                email: self.email,
                display_name: self.name,
                avatar_url: self.avatar_url,
            },
            seq: self.seq,
        }
    }
}

/// Verify a backend-issued HS256 session token locally (signature + expiry).
pub fn verify_session_token(
    token: &str,
    secret: &str,
) -> Result<SessionClaims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.validate_aud = false;
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Caught locally before any network call; store state is untouched.
    #[error("{0}")]
    Validation(String),
    #[error("not signed in")]
    NotSignedIn,
    #[error(transparent)]
    Backend(#[from] ClientError),
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::Validation(message) => crate::error::validation_error(
                &message,
                serde_json::Value::Null,
            ),
            SessionError::NotSignedIn => crate::error::unauthorized(None),
            SessionError::Backend(client_error) => client_error.into(),
        }
    }
}

type SubscriberMap = HashMap<u64, mpsc::UnboundedSender<Option<Session>>>;

/// Application-state object owning the current session.
pub struct SessionStore {
    backend: BackendClient,
    current: RwLock<Option<Session>>,
    applied_seq: AtomicU64,
    loading: AtomicBool,
    subscribers: Arc<Mutex<SubscriberMap>>,
    next_subscriber: AtomicU64,
    cache: Mutex<LruCache<String, Session>>,
}

impl SessionStore {
    /// Creates an empty store over the given backend client.
    pub fn new(backend: BackendClient, cache_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            backend,
            current: RwLock::new(None),
            applied_seq: AtomicU64::new(0),
            loading: AtomicBool::new(false),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_subscriber: AtomicU64::new(1),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The backend client this store delegates to.
    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    /// Whether a session operation is currently in flight.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Snapshot of the current session.
    pub fn current(&self) -> Option<Session> {
        self.current.read().unwrap().clone()
    }

    /// Highest session sequence number applied so far.
    pub fn applied_seq(&self) -> u64 {
        self.applied_seq.load(Ordering::SeqCst)
    }

    fn begin_op(&self) -> impl Drop + '_ {
        self.loading.store(true, Ordering::SeqCst);
        scopeguard::guard(&self.loading, |flag| flag.store(false, Ordering::SeqCst))
    }

    fn notify(&self, snapshot: Option<Session>) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|_, tx| tx.send(snapshot.clone()).is_ok());
    }

    /// Install a session as the result of a direct user operation.
    ///
    /// Direct operations always win: the applied sequence advances past the
    /// current value even when the backend-supplied seq lags behind.
    fn install(&self, session: Option<Session>) {
        let seq_hint = session.as_ref().map(|s| s.seq).unwrap_or(0);
        let next = self
            .applied_seq
            .load(Ordering::SeqCst)
            .saturating_add(1)
            .max(seq_hint);
        self.applied_seq.store(next, Ordering::SeqCst);

        if let Some(ref s) = session {
            self.cache
                .lock()
                .unwrap()
                .put(s.access_token.clone(), s.clone());
        }
        *self.current.write().unwrap() = session.clone();
        self.notify(session);
    }

    /// Apply a backend-pushed change notification.
    ///
    /// Events are reconciled by sequence number: anything at or below the
    /// applied sequence is stale and dropped. Returns whether the event was
    /// applied.
    pub fn apply_event(&self, event: SessionEvent) -> bool {
        let mut applied = self.applied_seq.load(Ordering::SeqCst);
        loop {
            if event.seq <= applied {
                tracing::debug!(seq = event.seq, applied, "dropping stale session event");
                return false;
            }
            match self.applied_seq.compare_exchange(
                applied,
                event.seq,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(observed) => applied = observed,
            }
        }

        if let Some(ref s) = event.session {
            self.cache
                .lock()
                .unwrap()
                .put(s.access_token.clone(), s.clone());
        }
        *self.current.write().unwrap() = event.session.clone();
        self.notify(event.session);
        true
    }

    /// Subscribe to session changes; dropping the returned guard unsubscribes.
    pub fn subscribe(&self) -> SessionSubscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().insert(id, tx);
        SessionSubscription {
            id,
            rx,
            registry: Arc::clone(&self.subscribers),
        }
    }

    /// Number of live subscribers (test observability).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Look up a session for `access_token` without touching the network.
    pub fn cached(&self, access_token: &str) -> Option<Session> {
        if let Some(current) = self.current.read().unwrap().as_ref()
            && current.access_token == access_token
        {
            return Some(current.clone());
        }
        self.cache.lock().unwrap().get(access_token).cloned()
    }

    /// Resolve a session for `access_token`, consulting the backend on a
    /// cache miss and filling the cache on success.
    pub async fn resolve(&self, access_token: &str) -> Result<Option<Session>, SessionError> {
        if let Some(session) = self.cached(access_token) {
            return Ok(Some(session));
        }

        let fetched = self.backend.fetch_session(access_token).await?;
        if let Some(ref session) = fetched {
            self.cache
                .lock()
                .unwrap()
                .put(access_token.to_string(), session.clone());
        }
        Ok(fetched)
    }

    /// Warm the cache with a session verified elsewhere (e.g. a locally
    /// checked token signature).
    pub fn cache_session(&self, session: Session) {
        self.cache
            .lock()
            .unwrap()
            .put(session.access_token.clone(), session);
    }

    /// Drop any cached session for `access_token`.
    pub fn evict(&self, access_token: &str) {
        self.cache.lock().unwrap().pop(access_token);
    }

    /// Sign in with email/password credentials.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session, SessionError> {
        validate_email(&credentials.email)?;
        if credentials.password.is_empty() {
            return Err(SessionError::Validation("Password is required".to_string()));
        }

        let _loading = self.begin_op();
        match self.backend.password_sign_in(credentials).await {
            Ok(session) => {
                counter!("session_sign_in_total").increment(1);
                self.install(Some(session.clone()));
                Ok(session)
            }
            Err(err) => {
                counter!("session_sign_in_failures_total").increment(1);
                Err(err.into())
            }
        }
    }

    /// Fetch the Google authorization URL for federated sign-in.
    pub async fn sign_in_with_google(&self) -> Result<Url, SessionError> {
        let _loading = self.begin_op();
        Ok(self.backend.oauth_authorize_url("google").await?)
    }

    /// Register a new account.
    pub async fn sign_up(&self, credentials: &Credentials) -> Result<Session, SessionError> {
        validate_email(&credentials.email)?;
        validate_password(&credentials.password)?;

        let _loading = self.begin_op();
        let session = self.backend.sign_up(credentials).await?;
        counter!("session_sign_up_total").increment(1);
        self.install(Some(session.clone()));
        Ok(session)
    }

    /// Sign the current session out and clear it.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let session = self.current().ok_or(SessionError::NotSignedIn)?;

        let _loading = self.begin_op();
        self.backend.sign_out(&session.access_token).await?;
        self.evict(&session.access_token);
        self.install(None);
        counter!("session_sign_out_total").increment(1);
        Ok(())
    }

    /// Trigger a password-recovery email.
    pub async fn reset_password(&self, email: &str) -> Result<(), SessionError> {
        validate_email(email)?;

        let _loading = self.begin_op();
        Ok(self.backend.reset_password(email).await?)
    }

    /// Update the password for the session behind `access_token`. The length
    /// rule is checked locally before any network call.
    pub async fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<(), SessionError> {
        validate_password(new_password)?;

        let _loading = self.begin_op();
        Ok(self
            .backend
            .update_password(access_token, new_password)
            .await?)
    }
}

/// Change-notification handle returned by [`SessionStore::subscribe`].
///
/// Dropping the subscription unsubscribes.
pub struct SessionSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Option<Session>>,
    registry: Arc<Mutex<SubscriberMap>>,
}

impl SessionSubscription {
    /// Waits for the next session snapshot; `None` when the store is gone.
    pub async fn changed(&mut self) -> Option<Option<Session>> {
        self.rx.recv().await
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.registry.lock().unwrap().remove(&self.id);
    }
}

fn validate_email(email: &str) -> Result<(), SessionError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(SessionError::Validation(
            "Please enter a valid email address".to_string(),
        ))
    }
}

fn validate_password(password: &str) -> Result<(), SessionError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(SessionError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{Timeouts, build_http_client};
    use crate::config::TimeoutConfig;

    fn test_store() -> SessionStore {
        let timeouts = Timeouts::from(&TimeoutConfig::default());
        let http = build_http_client(&timeouts).unwrap();
        let backend =
            BackendClient::new(http, "http://localhost:9999", None, timeouts).unwrap();
        SessionStore::new(backend, 16)
    }

    fn sample_session(token: &str, seq: u64) -> Session {
        Session {
            access_token: token.to_string(),
            user: UserProfile {
                id: Uuid::new_v4(),
                email: "user@example.com".to_string(),
                display_name: None,
                avatar_url: None,
            },
            seq,
        }
    }

    #[test]
    fn stale_events_are_dropped() {
        let store = test_store();

        assert!(store.apply_event(SessionEvent {
            seq: 5,
            session: Some(sample_session("tok-a", 5)),
        }));
        assert_eq!(store.current().unwrap().access_token, "tok-a");

        // An older notification must not overwrite the newer session
        assert!(!store.apply_event(SessionEvent {
            seq: 3,
            session: None,
        }));
        assert!(store.current().is_some());

        // A newer sign-out notification clears it
        assert!(store.apply_event(SessionEvent {
            seq: 6,
            session: None,
        }));
        assert!(store.current().is_none());
    }

    #[test]
    fn cached_covers_current_and_lru() {
        let store = test_store();
        store.apply_event(SessionEvent {
            seq: 1,
            session: Some(sample_session("tok-current", 1)),
        });

        assert!(store.cached("tok-current").is_some());
        assert!(store.cached("tok-unknown").is_none());

        store.evict("tok-current");
        // Current session still resolves even after cache eviction
        assert!(store.cached("tok-current").is_some());
    }

    #[tokio::test]
    async fn subscription_receives_changes_and_unsubscribes_on_drop() {
        let store = test_store();
        let mut subscription = store.subscribe();
        assert_eq!(store.subscriber_count(), 1);

        store.apply_event(SessionEvent {
            seq: 1,
            session: Some(sample_session("tok-a", 1)),
        });

        let snapshot = subscription.changed().await.expect("channel open");
        assert_eq!(snapshot.unwrap().access_token, "tok-a");

        drop(subscription);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn short_password_rejected_locally() {
        let store = test_store();

        let err = store.update_password("tok-a", "short").await.unwrap_err();
        match err {
            SessionError::Validation(message) => {
                assert_eq!(message, "Password must be at least 8 characters")
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn malformed_email_rejected_locally() {
        let store = test_store();
        let err = store
            .sign_in(&Credentials {
                email: "not-an-email".to_string(),
                password: "password123".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert!(store.current().is_none());
    }

    #[test]
    fn jwt_roundtrip_verifies() {
        use jsonwebtoken::{EncodingKey, Header, encode};

        let secret = "test-jwt-secret";
        let user_id = Uuid::new_v4();
        let exp = chrono::Utc::now().timestamp() as u64 + 3600;
        let claims = serde_json::json!({
            "sub": user_id,
            "email": "user@example.com",
            "exp": exp,
            "seq": 7,
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        let verified = verify_session_token(&token, secret).unwrap();
        assert_eq!(verified.sub, user_id);
        assert_eq!(verified.email, "user@example.com");
        assert_eq!(verified.seq, 7);

        assert!(verify_session_token(&token, "wrong-secret").is_err());
    }
}
