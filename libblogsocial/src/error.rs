//! Error types for Blog Social

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlogSocialError>;

/// Message used when neither the server nor the transport said anything useful.
pub const FALLBACK_MESSAGE: &str = "An error occurred";

/// `code` of field-level validation failures, client- or server-side
pub const VALIDATION_CODE: &str = "VALIDATION";

#[derive(Error, Debug)]
pub enum BlogSocialError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl BlogSocialError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            BlogSocialError::InvalidInput(_) => 3,
            BlogSocialError::Credential(CredentialError::NotFound(_)) => 2,
            BlogSocialError::Credential(_) => 1,
            BlogSocialError::Api(error) => error.exit_code(),
            BlogSocialError::Config(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("OS keyring unavailable: {0}")]
    KeyringUnavailable(String),

    #[error("Keyring operation failed: {0}")]
    Keyring(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Failed to decrypt credential (wrong master password?)")]
    DecryptionFailed,

    #[error("Master password not set")]
    MasterPasswordNotSet,

    #[error("Master password must be at least 8 characters")]
    WeakPassword,

    #[error("No credential storage backend available")]
    NoStoreAvailable,

    #[error("Credential storage task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The single error shape every API call fails with.
///
/// Transport failures, timeouts, 4xx/5xx responses and undecodable bodies all
/// end up here. `code` and `details` are omitted from the serialized form when
/// absent, matching the server's own error body.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, Vec<String>>>,
}

impl ApiError {
    /// Create an error carrying only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            details: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: BTreeMap<String, Vec<String>>) -> Self {
        self.details = Some(details);
        self
    }

    /// Client-side field validation failure, shaped like the server's own
    /// `VALIDATION` responses so callers can render both the same way.
    pub fn validation(field: &str, reason: &str) -> Self {
        let mut details = BTreeMap::new();
        details.insert(field.to_string(), vec![reason.to_string()]);
        Self::new(format!("Validation error: {} {}", field, reason))
            .with_code(VALIDATION_CODE)
            .with_details(details)
    }

    /// Process exit code for front ends: 3 for validation failures, else 1
    pub fn exit_code(&self) -> i32 {
        if self.code.as_deref() == Some(VALIDATION_CODE) {
            3
        } else {
            1
        }
    }
}

/// Where a failure came from.
///
/// Only used for logging; callers see the collapsed [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network unreachable, DNS, connection refused, timeout
    Transport,
    /// 401 from the server
    Auth,
    /// Any other 4xx
    Validation,
    /// 5xx
    Server,
    /// 2xx whose body could not be decoded
    Decode,
    /// Credential lookup failed before the request was sent
    Storage,
}

impl FailureKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => FailureKind::Auth,
            400..=499 => FailureKind::Validation,
            500..=599 => FailureKind::Server,
            _ => FailureKind::Decode,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Transport => "transport",
            FailureKind::Auth => "auth",
            FailureKind::Validation => "validation",
            FailureKind::Server => "server",
            FailureKind::Decode => "decode",
            FailureKind::Storage => "storage",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = BlogSocialError::InvalidInput("Empty email".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_missing_credential() {
        let error = BlogSocialError::Credential(CredentialError::NotFound(
            "blogsocial.auth_token".to_string(),
        ));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_api_and_config() {
        let api = BlogSocialError::Api(ApiError::new("boom"));
        assert_eq!(api.exit_code(), 1);

        let config = BlogSocialError::Config(ConfigError::MissingField("api.base_url".to_string()));
        assert_eq!(config.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_validation_is_invalid_input() {
        let local = BlogSocialError::Api(ApiError::validation("email", "is required"));
        assert_eq!(local.exit_code(), 3);

        let server = ApiError::new("Invalid email").with_code("VALIDATION");
        assert_eq!(server.exit_code(), 3);
        assert_eq!(ApiError::new("Token expired").with_code("UNAUTHORIZED").exit_code(), 1);
    }

    #[test]
    fn test_api_error_display_is_message() {
        let error = ApiError::new("Invalid email").with_code("VALIDATION");
        assert_eq!(error.to_string(), "Invalid email");

        let wrapped = BlogSocialError::Api(error);
        assert_eq!(wrapped.to_string(), "API error: Invalid email");
    }

    #[test]
    fn test_api_error_omits_absent_fields() {
        let error = ApiError::new("timeout of 10000ms exceeded");
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json, serde_json::json!({"message": "timeout of 10000ms exceeded"}));
    }

    #[test]
    fn test_api_error_deserializes_server_body() {
        let body = r#"{"message":"Invalid email","code":"VALIDATION","details":{"email":["required"]}}"#;
        let error: ApiError = serde_json::from_str(body).unwrap();

        assert_eq!(error.message, "Invalid email");
        assert_eq!(error.code.as_deref(), Some("VALIDATION"));
        assert_eq!(
            error.details.unwrap().get("email"),
            Some(&vec!["required".to_string()])
        );
    }

    #[test]
    fn test_validation_helper_shape() {
        let error = ApiError::validation("password", "must be at least 8 characters");
        assert_eq!(error.code.as_deref(), Some("VALIDATION"));
        let details = error.details.unwrap();
        assert_eq!(
            details.get("password"),
            Some(&vec!["must be at least 8 characters".to_string()])
        );
    }

    #[test]
    fn test_failure_kind_from_status() {
        assert_eq!(FailureKind::from_status(401), FailureKind::Auth);
        assert_eq!(FailureKind::from_status(403), FailureKind::Validation);
        assert_eq!(FailureKind::from_status(422), FailureKind::Validation);
        assert_eq!(FailureKind::from_status(503), FailureKind::Server);
        assert_eq!(FailureKind::Transport.to_string(), "transport");
    }

    #[test]
    fn test_config_error_formatting() {
        let error = ConfigError::InvalidValue {
            field: "api.timeout_ms".to_string(),
            reason: "must be greater than zero".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid value for api.timeout_ms: must be greater than zero"
        );
    }

    #[test]
    fn test_error_conversion_from_credential_error() {
        let error: BlogSocialError = CredentialError::NoStoreAvailable.into();
        match error {
            BlogSocialError::Credential(CredentialError::NoStoreAvailable) => {}
            _ => panic!("Expected BlogSocialError::Credential"),
        }
    }
}
