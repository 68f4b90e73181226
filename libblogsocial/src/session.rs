//! Session state and token lifecycle
//!
//! `Session` is the only component allowed to write tokens. The API client
//! reads the access token through it before every request and asks it to
//! invalidate the session when the server answers 401.
//!
//! State changes are published on a broadcast channel so front ends can
//! react (e.g. switch back to the login flow) without polling storage.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use libblogsocial::credentials::MemoryStore;
//! use libblogsocial::session::{Credential, Session, SessionEvent};
//!
//! # async fn example() -> libblogsocial::Result<()> {
//! let session = Session::new(Arc::new(MemoryStore::new()));
//! let mut events = session.subscribe();
//!
//! session.login(&Credential::new("access", "refresh"))?;
//! assert!(session.state()?.is_authenticated);
//!
//! if let Ok(SessionEvent::SignedIn) = events.recv().await {
//!     println!("signed in");
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::credentials::{CredentialStore, REFRESH_TOKEN_KEY, TOKEN_KEY};
use crate::error::{CredentialError, Result};

/// Access/refresh token pair
///
/// Token values are kept in `SecretString` so they are zeroed on drop and
/// redacted from `Debug` output.
pub struct Credential {
    access_token: SecretString,
    refresh_token: SecretString,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: SecretString::from(refresh_token.into()),
        }
    }

    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    pub fn refresh_token(&self) -> &str {
        self.refresh_token.expose_secret()
    }

}

impl Clone for Credential {
    fn clone(&self) -> Self {
        Self::new(self.access_token(), self.refresh_token())
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.access_token() == other.access_token() && self.refresh_token() == other.refresh_token()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Snapshot of authentication status
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub credential: Option<Credential>,
}

impl SessionState {
    pub fn from_credential(credential: Option<Credential>) -> Self {
        Self {
            is_authenticated: credential.is_some(),
            credential,
        }
    }
}

/// Session state changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A credential was stored after login or registration
    SignedIn,
    /// The credential pair was replaced by a refresh
    Refreshed,
    /// The user logged out
    SignedOut,
    /// The server rejected a request with 401 and the credential was dropped
    Invalidated {
        /// Request path that triggered the invalidation
        path: String,
    },
}

pub type SessionEventReceiver = broadcast::Receiver<SessionEvent>;

/// Broadcast bus for [`SessionEvent`]s
///
/// Emitting never blocks; with no subscribers events are dropped.
#[derive(Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> SessionEventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: SessionEvent) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new(32)
    }
}

/// Owner of the stored credential and the session-change channel
pub struct Session {
    store: Arc<dyn CredentialStore>,
    events: SessionEvents,
}

impl Session {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            events: SessionEvents::default(),
        }
    }

    /// Name of the backing credential store
    pub fn backend_name(&self) -> &str {
        self.store.backend_name()
    }

    pub fn subscribe(&self) -> SessionEventReceiver {
        self.events.subscribe()
    }

    /// Current access token, if one is stored and non-empty
    pub fn access_token(&self) -> Result<Option<SecretString>> {
        Ok(self
            .store
            .get(TOKEN_KEY)?
            .filter(|token| !token.is_empty())
            .map(SecretString::from))
    }

    /// Current credential pair
    ///
    /// A missing refresh token is tolerated (the backend's login response
    /// does not always carry one); a missing access token means no session.
    pub fn credential(&self) -> Result<Option<Credential>> {
        let Some(access_token) = self.store.get(TOKEN_KEY)?.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        let refresh_token = self.store.get(REFRESH_TOKEN_KEY)?.unwrap_or_default();
        Ok(Some(Credential::new(access_token, refresh_token)))
    }

    /// Current credential pair, or `CredentialError::NotFound` when signed out
    pub fn require_credential(&self) -> Result<Credential> {
        self.credential()?
            .ok_or_else(|| CredentialError::NotFound(TOKEN_KEY.to_string()).into())
    }

    pub fn state(&self) -> Result<SessionState> {
        Ok(SessionState::from_credential(self.credential()?))
    }

    pub fn is_authenticated(&self) -> Result<bool> {
        Ok(self.access_token()?.is_some())
    }

    /// Run a storage operation on the blocking pool
    ///
    /// Keyring lookups and passphrase decryption can take seconds; async
    /// callers go through here so the executor keeps running other tasks.
    pub async fn run_blocking<T, F>(self: &Arc<Self>, op: F) -> Result<T>
    where
        F: FnOnce(&Session) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let session = Arc::clone(self);
        tokio::task::spawn_blocking(move || op(&session))
            .await
            .map_err(|e| CredentialError::Task(e.to_string()))?
    }

    /// Store a freshly issued credential
    pub fn login(&self, credential: &Credential) -> Result<()> {
        self.write_credential(credential)?;
        tracing::info!("Session established");
        self.events.emit(SessionEvent::SignedIn);
        Ok(())
    }

    /// Replace the stored credential with a refreshed pair
    pub fn refresh(&self, credential: &Credential) -> Result<()> {
        self.write_credential(credential)?;
        tracing::debug!("Session credential refreshed");
        self.events.emit(SessionEvent::Refreshed);
        Ok(())
    }

    /// Drop the stored credential at the user's request
    pub fn logout(&self) -> Result<()> {
        self.clear_credential()?;
        tracing::info!("Session ended");
        self.events.emit(SessionEvent::SignedOut);
        Ok(())
    }

    /// Drop the stored credential because the server answered 401
    ///
    /// Called by the transport layer, not by business logic. Sibling requests
    /// already in flight are not cancelled and may fail on their own.
    pub fn invalidate_session_on_unauthorized(&self, path: &str) -> Result<()> {
        let result = self.clear_credential();
        tracing::warn!(path, "Server returned 401; stored credential cleared");
        self.events.emit(SessionEvent::Invalidated {
            path: path.to_string(),
        });
        result
    }

    fn write_credential(&self, credential: &Credential) -> Result<()> {
        self.store.set(TOKEN_KEY, credential.access_token())?;
        if credential.refresh_token().is_empty() {
            self.store.delete(REFRESH_TOKEN_KEY)?;
        } else {
            self.store.set(REFRESH_TOKEN_KEY, credential.refresh_token())?;
        }
        Ok(())
    }

    // Both keys are attempted even if the first delete fails.
    fn clear_credential(&self) -> Result<()> {
        let access = self.store.delete(TOKEN_KEY);
        let refresh = self.store.delete(REFRESH_TOKEN_KEY);
        access.and(refresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryStore;

    fn session_with_store() -> (Session, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Session::new(store.clone()), store)
    }

    #[test]
    fn test_empty_store_is_unauthenticated() {
        let (session, _) = session_with_store();
        let state = session.state().unwrap();
        assert!(!state.is_authenticated);
        assert!(state.credential.is_none());
    }

    #[test]
    fn test_login_stores_both_tokens() {
        let (session, store) = session_with_store();
        session.login(&Credential::new("tok-123", "ref-456")).unwrap();

        assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("tok-123"));
        assert_eq!(
            store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
            Some("ref-456")
        );

        let state = session.state().unwrap();
        assert!(state.is_authenticated);
        assert_eq!(state.credential, Some(Credential::new("tok-123", "ref-456")));
    }

    #[test]
    fn test_login_without_refresh_token() {
        let (session, store) = session_with_store();
        store.set(REFRESH_TOKEN_KEY, "stale").unwrap();

        session.login(&Credential::new("tok-123", "")).unwrap();

        assert!(!store.exists(REFRESH_TOKEN_KEY).unwrap());
        let credential = session.credential().unwrap().unwrap();
        assert_eq!(credential.access_token(), "tok-123");
        assert_eq!(credential.refresh_token(), "");
    }

    #[test]
    fn test_empty_access_token_is_no_session() {
        let (session, store) = session_with_store();
        store.set(TOKEN_KEY, "").unwrap();
        assert!(!session.is_authenticated().unwrap());
        assert!(session.credential().unwrap().is_none());
    }

    #[test]
    fn test_logout_clears_tokens() {
        let (session, store) = session_with_store();
        session.login(&Credential::new("tok-123", "ref-456")).unwrap();
        session.logout().unwrap();

        assert!(!store.exists(TOKEN_KEY).unwrap());
        assert!(!store.exists(REFRESH_TOKEN_KEY).unwrap());
        assert!(!session.is_authenticated().unwrap());
    }

    #[test]
    fn test_refresh_replaces_tokens() {
        let (session, _) = session_with_store();
        session.login(&Credential::new("old", "old-refresh")).unwrap();
        session.refresh(&Credential::new("new", "new-refresh")).unwrap();

        assert_eq!(
            session.credential().unwrap(),
            Some(Credential::new("new", "new-refresh"))
        );
    }

    #[tokio::test]
    async fn test_events_follow_transitions() {
        let (session, _) = session_with_store();
        let mut receiver = session.subscribe();

        session.login(&Credential::new("a", "b")).unwrap();
        session.refresh(&Credential::new("c", "d")).unwrap();
        session.invalidate_session_on_unauthorized("/profile").unwrap();
        session.logout().unwrap();

        assert_eq!(receiver.recv().await.unwrap(), SessionEvent::SignedIn);
        assert_eq!(receiver.recv().await.unwrap(), SessionEvent::Refreshed);
        assert_eq!(
            receiver.recv().await.unwrap(),
            SessionEvent::Invalidated {
                path: "/profile".to_string()
            }
        );
        assert_eq!(receiver.recv().await.unwrap(), SessionEvent::SignedOut);
    }

    #[test]
    fn test_invalidate_clears_tokens() {
        let (session, store) = session_with_store();
        session.login(&Credential::new("tok-123", "ref-456")).unwrap();
        session.invalidate_session_on_unauthorized("/posts").unwrap();
        assert!(!store.exists(TOKEN_KEY).unwrap());
        assert!(!store.exists(REFRESH_TOKEN_KEY).unwrap());
    }

    #[test]
    fn test_emit_without_subscribers_does_not_fail() {
        let events = SessionEvents::new(4);
        events.emit(SessionEvent::SignedOut);

        let mut receiver = events.subscribe();
        events.emit(SessionEvent::SignedIn);
        assert_eq!(receiver.try_recv().unwrap(), SessionEvent::SignedIn);
    }

    #[test]
    fn test_require_credential_when_signed_out() {
        let (session, _) = session_with_store();
        let result = session.require_credential();
        assert!(matches!(
            result,
            Err(crate::error::BlogSocialError::Credential(CredentialError::NotFound(ref key))) if key == TOKEN_KEY
        ));

        session.login(&Credential::new("tok-123", "")).unwrap();
        assert_eq!(session.require_credential().unwrap().access_token(), "tok-123");
    }

    #[tokio::test]
    async fn test_run_blocking_sees_session() {
        let (session, _) = session_with_store();
        let session = Arc::new(session);

        session
            .run_blocking(|s| s.login(&Credential::new("tok-123", "ref-456")))
            .await
            .unwrap();
        let token = session.run_blocking(Session::access_token).await.unwrap();

        assert_eq!(token.map(|t| t.expose_secret().to_string()).as_deref(), Some("tok-123"));
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("tok-123", "ref-456");
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("tok-123"));
        assert!(!debug.contains("ref-456"));
    }

    #[test]
    fn test_session_event_serialization() {
        let json = serde_json::to_value(SessionEvent::Invalidated {
            path: "/profile".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "invalidated", "path": "/profile"}));
    }
}
