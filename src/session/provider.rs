//! # Session Provider
//!
//! Process-wide bootstrap for the session store: performs one unconditional
//! session fetch at startup, then keeps a long-lived listener on the auth
//! backend's change stream so the store tracks token refreshes, external
//! sign-outs, and sign-ins from other clients. Shutting the provider down is
//! the explicit resource-release point for the listener.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{SessionEvent, SessionStore};
use crate::clients::ClientError;

const RECONNECT_BASE: Duration = Duration::from_secs(1);
const RECONNECT_CAP: Duration = Duration::from_secs(30);

/// Handle over the background session listener.
pub struct SessionProvider {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl SessionProvider {
    /// Starts the provider: one initial fetch, then the change listener.
    pub fn start(store: Arc<SessionStore>) -> Self {
        let shutdown = CancellationToken::new();
        let listener_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            run(store, listener_shutdown).await;
        });

        Self { shutdown, handle }
    }

    /// Tears the listener down and waits for it to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(err) = self.handle.await {
            warn!(error = ?err, "session listener task did not shut down cleanly");
        }
    }
}

async fn run(store: Arc<SessionStore>, shutdown: CancellationToken) {
    info!("starting session provider");

    initial_fetch(&store).await;

    let mut delay = RECONNECT_BASE;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = pump_events(&store, &shutdown) => {
                match result {
                    Ok(()) => {
                        // Clean close; the backend recycles streams periodically.
                        delay = RECONNECT_BASE;
                    }
                    Err(err) => {
                        warn!(error = %err, "session event stream failed, reconnecting in {:?}", delay);
                        counter!("session_event_stream_failures_total").increment(1);
                    }
                }
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(delay) => {}
        }
        delay = (delay * 2).min(RECONNECT_CAP);
    }

    info!("session provider stopped");
}

/// The one unconditional startup fetch. A fresh process has no persisted
/// token, in which case there is nothing to fetch and the listener is the
/// sole source of session state.
async fn initial_fetch(store: &SessionStore) {
    let Some(session) = store.current() else {
        debug!("no persisted session at startup");
        return;
    };

    match store.backend().fetch_session(&session.access_token).await {
        Ok(Some(fetched)) => {
            let seq = fetched.seq;
            if store.apply_event(SessionEvent {
                seq,
                session: Some(fetched),
            }) {
                debug!(seq, "applied startup session fetch");
            } else {
                // A change notification with a newer seq won the race.
                debug!(seq, "startup session fetch superseded by listener");
            }
        }
        Ok(None) => {
            let seq = store.applied_seq().saturating_add(1);
            store.apply_event(SessionEvent { seq, session: None });
            debug!("startup fetch found no session, cleared store");
        }
        Err(err) => {
            warn!(error = %err, "startup session fetch failed");
        }
    }
}

async fn pump_events(
    store: &SessionStore,
    shutdown: &CancellationToken,
) -> Result<(), ClientError> {
    let token = store.current().map(|s| s.access_token);
    let mut stream = store.backend().open_session_events(token.as_deref()).await?;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            event = stream.next_event() => {
                match event? {
                    Some(event) => {
                        counter!("session_events_received_total").increment(1);
                        if store.apply_event(event) {
                            counter!("session_events_applied_total").increment(1);
                        }
                    }
                    None => return Ok(()),
                }
            }
        }
    }
}
