//! Authenticated session lifecycle.
//!
//! [`SessionManager`] is the only writer of session state, both in memory and
//! in the persisted record. Consumers hold an `Arc<SessionManager>` and read
//! snapshots; they never touch the store.
//!
//! Every transition bumps an `epoch`. Long-running operations capture the
//! epoch when they start and compare it at their suspension points to detect
//! a logout or re-login that happened meanwhile.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::{TrustError, TrustResult};
use crate::types::{Principal, Session};

pub mod store;

pub use store::{FileSessionStore, MemorySessionStore, SessionEntries, SessionStore};

use store::{AUTH_TOKEN_KEY, CURRENT_USER_KEY, IS_AUTHENTICATED_KEY};

/// Session state as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub session: Option<Session>,

    /// Incremented on every begin/end/restore.
    pub epoch: u64,
}

impl SessionSnapshot {
    pub fn principal(&self) -> Option<&Principal> {
        self.session.as_ref().map(|s| &s.principal)
    }
}

/// Owner of the authenticated session.
#[derive(Debug)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    state: watch::Sender<SessionSnapshot>,
    // Keeps store writes in the same order as published transitions.
    transition: Mutex<()>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            store,
            state,
            transition: Mutex::new(()),
        }
    }

    /// Manager over a [`FileSessionStore`] at `path`.
    pub fn with_file(path: impl Into<std::path::PathBuf>) -> Self {
        Self::new(Arc::new(FileSessionStore::new(path)))
    }

    /// Manager over a fresh [`MemorySessionStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStore::new()))
    }

    /// Rebuild the session from the persisted record.
    ///
    /// Missing or malformed data yields `None`. A corrupt record is logged and
    /// cleared so the next start is clean; a record that could not be read is
    /// logged and left in place.
    pub async fn restore(&self) -> Option<Session> {
        let _guard = self.transition.lock().await;

        let restored = match self.store.load().await {
            Ok(Some(entries)) => match session_from_entries(&entries) {
                Ok(session) => session,
                Err(e) => {
                    self.discard_corrupt(&e).await;
                    None
                }
            },
            Ok(None) => None,
            Err(e @ TrustError::CorruptSessionState { .. }) => {
                self.discard_corrupt(&e).await;
                None
            }
            Err(e) => {
                warn!(error = %e, "failed to read persisted session, keeping record");
                None
            }
        };

        match &restored {
            Some(session) => info!(
                principal_id = %session.principal.id,
                role = %session.principal.role,
                "restored persisted session"
            ),
            None => debug!("no persisted session to restore"),
        }

        self.publish(restored.clone());
        restored
    }

    /// Persist and publish a new authenticated session.
    ///
    /// The in-memory session only changes once the record is written; on a
    /// storage failure the previous state is kept.
    pub async fn begin_session(
        &self,
        principal: Principal,
        token: impl Into<String>,
    ) -> TrustResult<Session> {
        let session = Session::new(principal, token);
        let _guard = self.transition.lock().await;

        self.store.replace(&session_to_entries(&session)?).await?;
        self.publish(Some(session.clone()));

        info!(
            principal_id = %session.principal.id,
            role = %session.principal.role,
            "session started"
        );
        Ok(session)
    }

    /// Clear the session in memory and in the persisted record.
    ///
    /// The in-memory session is cleared even if the record cannot be removed.
    pub async fn end_session(&self) -> TrustResult<()> {
        let _guard = self.transition.lock().await;
        self.end_locked().await
    }

    /// End the session only if it is still the one observed at `epoch`.
    ///
    /// Returns whether the session was ended. Used when the backend reports
    /// the token as invalid, so a newer login is never discarded.
    pub async fn invalidate(&self, epoch: u64) -> TrustResult<bool> {
        let _guard = self.transition.lock().await;
        if self.epoch() != epoch || self.current_session().is_none() {
            return Ok(false);
        }
        warn!(epoch, "session invalidated by backend");
        self.end_locked().await?;
        Ok(true)
    }

    async fn end_locked(&self) -> TrustResult<()> {
        let had_session = self.current_session().is_some();
        self.publish(None);

        if had_session {
            info!("session ended");
        }

        self.store.clear().await.inspect_err(|e| {
            warn!(error = %e, "failed to clear persisted session");
        })
    }

    async fn discard_corrupt(&self, error: &TrustError) {
        warn!(error = %error, "discarding unreadable persisted session");
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to clear corrupt session record");
        }
    }

    fn publish(&self, session: Option<Session>) {
        self.state.send_modify(|snapshot| {
            snapshot.session = session;
            snapshot.epoch += 1;
        });
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.state.borrow().session.clone()
    }

    pub fn current_principal(&self) -> Option<Principal> {
        self.state.borrow().principal().cloned()
    }

    pub fn epoch(&self) -> u64 {
        self.state.borrow().epoch
    }

    pub fn is_authenticated(&self) -> bool {
        self.state
            .borrow()
            .session
            .as_ref()
            .is_some_and(|s| s.authenticated)
    }

    /// Token to attach as `Authorization: Bearer <token>`, while present.
    pub fn bearer_token(&self) -> Option<String> {
        self.state
            .borrow()
            .session
            .as_ref()
            .filter(|s| s.authenticated && !s.token.is_empty())
            .map(|s| s.token.clone())
    }

    /// Receive every transition. The value is replaced before receivers wake.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }
}

fn session_to_entries(session: &Session) -> TrustResult<SessionEntries> {
    let user = serde_json::to_string(&session.principal)
        .map_err(|e| TrustError::storage(format!("failed to serialize principal: {}", e)))?;

    let mut entries = SessionEntries::new();
    entries.insert(IS_AUTHENTICATED_KEY.to_string(), "true".to_string());
    entries.insert(CURRENT_USER_KEY.to_string(), user);
    if !session.token.is_empty() {
        entries.insert(AUTH_TOKEN_KEY.to_string(), session.token.clone());
    }
    Ok(entries)
}

/// `Ok(None)` for a logged-out record, `Err` for an unreadable one.
fn session_from_entries(entries: &SessionEntries) -> TrustResult<Option<Session>> {
    if entries.get(IS_AUTHENTICATED_KEY).map(String::as_str) != Some("true") {
        return Ok(None);
    }

    let user = entries
        .get(CURRENT_USER_KEY)
        .ok_or_else(|| TrustError::CorruptSessionState {
            message: format!("authenticated record has no '{}'", CURRENT_USER_KEY),
        })?;

    let principal: Principal =
        serde_json::from_str(user).map_err(|e| TrustError::CorruptSessionState {
            message: format!("invalid '{}': {}", CURRENT_USER_KEY, e),
        })?;

    let token = entries.get(AUTH_TOKEN_KEY).cloned().unwrap_or_default();
    Ok(Some(Session::new(principal, token)))
}
