//! Blog Social - client core for the Blog Social API
//!
//! This library provides the authenticated API client, credential storage,
//! session lifecycle and navigation gating shared by every Blog Social front end.

pub mod auth;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod logging;
pub mod navigation;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use client::{ApiClient, ApiRequest};
pub use config::Config;
pub use credentials::{CredentialConfig, CredentialManager, CredentialStore, StorageBackend};
pub use error::{ApiError, BlogSocialError, Result};
pub use gate::SessionGate;
pub use navigation::RootRoute;
pub use session::{Credential, Session, SessionEvent, SessionState};
