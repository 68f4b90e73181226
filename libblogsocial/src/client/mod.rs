//! Authenticated HTTP client for the Blog Social API
//!
//! `ApiClient` is built once at startup and cloned into every caller that
//! needs it. Each request:
//!
//! - reads the access token from the session's credential store (before
//!   anything is sent),
//! - attaches `Authorization: Bearer <token>` when a token exists,
//! - invalidates the session if the server answers 401,
//! - fails with exactly one [`ApiError`] on any problem.
//!
//! There are no retries. Callers re-issue requests themselves.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use libblogsocial::client::ApiClient;
//! use libblogsocial::config::ApiConfig;
//! use libblogsocial::credentials::MemoryStore;
//! use libblogsocial::session::Session;
//! use libblogsocial::types::{PaginatedResponse, Post};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Arc::new(Session::new(Arc::new(MemoryStore::new())));
//! let client = ApiClient::new(ApiConfig::default(), session)?;
//!
//! let page: PaginatedResponse<Post> = client.get("/posts?page=1").await?;
//! println!("{} posts", page.data.len());
//! # Ok(())
//! # }
//! ```

pub mod pipeline;

use std::error::Error as StdError;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
pub use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use zeroize::Zeroize;

use crate::config::ApiConfig;
use crate::error::{ApiError, FailureKind, Result};
use crate::session::Session;

pub use pipeline::{before_send, build_url, normalize_error, on_response, ApiRequest, RawResponse, TransportFailure};

/// Authenticated API client
///
/// Cheap to clone; clones share the connection pool and the session.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
    session: Arc<Session>,
}

impl ApiClient {
    /// Create a client for `config.base_url`
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid base URL or zero timeout.
    pub fn new(config: ApiConfig, session: Arc<Session>) -> Result<Self> {
        config.validate()?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(default_headers)
            .build()
            .map_err(|e| ApiError::new(format!("Failed to build HTTP client: {}", e)))?;

        tracing::debug!(
            base_url = %config.base_url,
            timeout_ms = config.timeout_ms,
            "API client configured"
        );

        Ok(Self {
            http,
            config,
            session,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Issue a request and return the parsed JSON body
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: Option<HeaderMap>,
    ) -> std::result::Result<Value, ApiError> {
        let mut request = ApiRequest::new(method, path);
        request.body = body;
        if let Some(headers) = headers {
            request = request.headers(headers);
        }
        self.send(request).await
    }

    /// Run a prepared request through the pipeline
    pub async fn send(&self, request: ApiRequest) -> std::result::Result<Value, ApiError> {
        let token = self.session.run_blocking(Session::access_token).await.map_err(|e| {
            tracing::warn!(
                path = %request.path,
                kind = %FailureKind::Storage,
                "Could not read stored credential: {}",
                e
            );
            ApiError::new(format!("Failed to read stored credential: {}", e))
        })?;

        let request = before_send(request, token.as_ref())?;
        let method = request.method.clone();
        let path = request.path.clone();

        let outcome = self.dispatch(request).await;

        match &outcome {
            Ok(response) => tracing::debug!(%method, %path, status = response.status, "API request completed"),
            Err(failure) => tracing::debug!(%method, %path, "API request failed: {}", failure.message()),
        }

        let kind = match &outcome {
            Ok(response) if response.is_success() => FailureKind::Decode,
            Ok(response) => FailureKind::from_status(response.status),
            Err(_) => FailureKind::Transport,
        };

        on_response(outcome).map_err(|error| {
            tracing::debug!(%method, %path, %kind, code = ?error.code, "{}", error.message);
            error
        })
    }

    async fn dispatch(&self, request: ApiRequest) -> std::result::Result<RawResponse, TransportFailure> {
        let url = build_url(&self.config.base_url, &request.path);
        let mut builder = self.http.request(request.method, url.as_str()).headers(request.headers);
        if let Some(mut body) = request.body {
            builder = builder.json(&body);
            // Bodies may carry passwords; the serialized copy is all reqwest needs
            zeroize_strings(&mut body);
        }

        let response = builder.send().await.map_err(|e| self.transport_failure(&e))?;
        let status = response.status().as_u16();

        // Invalidate as soon as the status is known, before the body is read
        if status == 401 {
            let path = request.path.clone();
            let cleared = self
                .session
                .run_blocking(move |session| session.invalidate_session_on_unauthorized(&path))
                .await;
            if let Err(e) = cleared {
                tracing::warn!(path = %request.path, "Failed to clear stored credential: {}", e);
            }
        }

        let body = response.bytes().await.map_err(|e| self.transport_failure(&e))?;
        Ok(RawResponse::new(status, body.to_vec()))
    }

    fn transport_failure(&self, error: &reqwest::Error) -> TransportFailure {
        if error.is_timeout() {
            return TransportFailure::Timeout {
                timeout_ms: self.config.timeout_ms,
            };
        }

        let mut message = error.to_string();
        let mut source = StdError::source(error);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        TransportFailure::Network(message)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> std::result::Result<T, ApiError> {
        let value = self.send(ApiRequest::get(path)).await?;
        decode(value)
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<T, ApiError> {
        let value = self.send(ApiRequest::post(path).json(encode(body)?)).await?;
        decode(value)
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<T, ApiError> {
        let value = self.send(ApiRequest::put(path).json(encode(body)?)).await?;
        decode(value)
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<T, ApiError> {
        let value = self.send(ApiRequest::patch(path).json(encode(body)?)).await?;
        decode(value)
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> std::result::Result<T, ApiError> {
        let value = self.send(ApiRequest::delete(path)).await?;
        decode(value)
    }
}

fn zeroize_strings(value: &mut Value) {
    match value {
        Value::String(text) => text.zeroize(),
        Value::Array(items) => items.iter_mut().for_each(zeroize_strings),
        Value::Object(map) => map.values_mut().for_each(zeroize_strings),
        _ => {}
    }
}

fn encode<B: Serialize>(body: &B) -> std::result::Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::new(format!("Failed to encode request body: {}", e)))
}

fn decode<T: DeserializeOwned>(value: Value) -> std::result::Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::new(format!("Invalid response body: {}", e)))
}
