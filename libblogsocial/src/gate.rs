//! Session gate: which navigation root to mount

use crate::error::Result;
use crate::navigation::RootRoute;
use crate::session::{Session, SessionState};

/// Pure choice of root from session state
pub fn select_root(state: &SessionState) -> RootRoute {
    if state.is_authenticated {
        RootRoute::Main
    } else {
        RootRoute::Auth
    }
}

/// Decides the navigation root at startup from stored credentials
pub struct SessionGate;

impl SessionGate {
    /// Read the session and pick a root
    ///
    /// A credential in storage means the main flow; anything else means the
    /// auth flow. Later transitions are driven by `SessionEvent`s.
    pub fn resolve(session: &Session) -> Result<RootRoute> {
        let root = select_root(&session.state()?);
        tracing::debug!(root = %root, backend = session.backend_name(), "Session gate resolved");
        Ok(root)
    }
}
