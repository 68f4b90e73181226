//! Request/response stages of the API client
//!
//! Every call goes through two fixed stages:
//!
//! 1. [`before_send`]: attach (or strip) the bearer token
//! 2. [`on_response`]: turn whatever came back into a JSON value or an [`ApiError`]
//!
//! Both are plain functions so they can be tested without a network.
//! The 401 session invalidation is deliberately *not* here; the client calls
//! [`Session::invalidate_session_on_unauthorized`](crate::session::Session::invalidate_session_on_unauthorized)
//! itself so that side effect stays visible.

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::error::{ApiError, FALLBACK_MESSAGE};

/// An outbound API call, before it is turned into an HTTP request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL (e.g. `/posts?page=2`)
    pub path: String,
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }
}

/// Outbound stage: set `Authorization: Bearer <token>` when a token is
/// stored, and make sure no `Authorization` header leaves otherwise.
///
/// Fails only if the token contains bytes that cannot go in a header.
pub fn before_send(mut request: ApiRequest, token: Option<&SecretString>) -> Result<ApiRequest, ApiError> {
    request.headers.remove(AUTHORIZATION);

    if let Some(token) = token {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|_| ApiError::new("Stored access token is not a valid header value"))?;
        value.set_sensitive(true);
        request.headers.insert(AUTHORIZATION, value);
    }

    Ok(request)
}

/// Status and body of a response that made it back from the server
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A request that never produced a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// The per-request timeout elapsed
    Timeout { timeout_ms: u64 },
    /// DNS failure, connection refused, TLS error, reset...
    Network(String),
}

impl TransportFailure {
    pub fn message(&self) -> String {
        match self {
            TransportFailure::Timeout { timeout_ms } => {
                format!("timeout of {}ms exceeded", timeout_ms)
            }
            TransportFailure::Network(message) => message.clone(),
        }
    }
}

/// Inbound stage: decode a success body or normalize a failure
///
/// A 2xx with an empty body yields `Value::Null`. A 2xx whose body is not JSON
/// is a failure like any other.
pub fn on_response(outcome: Result<RawResponse, TransportFailure>) -> Result<Value, ApiError> {
    let response = match outcome {
        Ok(response) => response,
        Err(failure) => return Err(normalize_error(None, &[], Some(&failure.message()))),
    };

    if !response.is_success() {
        let transport_message = format!("Request failed with status code {}", response.status);
        return Err(normalize_error(
            Some(response.status),
            &response.body,
            Some(&transport_message),
        ));
    }

    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    serde_json::from_slice(&response.body)
        .map_err(|e| ApiError::new(format!("Invalid response body: {}", e)))
}

/// Build an [`ApiError`] from whatever is known about a failure
///
/// Priority for `message`: the server's `message` field, then the transport
/// message, then [`FALLBACK_MESSAGE`]. `code` and `details` are only ever taken
/// from a JSON object body and are left out when that body lacks them.
pub fn normalize_error(status: Option<u16>, body: &[u8], transport_message: Option<&str>) -> ApiError {
    let parsed = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    };

    let server_message = parsed
        .as_ref()
        .and_then(|map| map.get("message"))
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty());

    let message = server_message
        .or(transport_message.filter(|message| !message.is_empty()))
        .unwrap_or(FALLBACK_MESSAGE)
        .to_string();

    let code = parsed
        .as_ref()
        .and_then(|map| map.get("code"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let details = parsed
        .as_ref()
        .and_then(|map| map.get("details"))
        .and_then(|details| serde_json::from_value::<BTreeMap<String, Vec<String>>>(details.clone()).ok());

    if let Some(status) = status {
        tracing::trace!(status, has_code = code.is_some(), "Normalized error response");
    }

    ApiError {
        message,
        code,
        details,
    }
}

/// Join the base URL and a request path with exactly one slash between them
pub fn build_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
