//! Login, registration, refresh and logout against the Blog Social API
//!
//! These are the only flows that move the session between authenticated and
//! unauthenticated (apart from a 401 seen by the client). Each successful
//! call stores or clears the credential through [`Session`].

use std::sync::Arc;

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::session::{Credential, Session};
use crate::types::{AuthResponse, LoginRequest, MessageResponse, RefreshRequest, RegisterRequest, User};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 50;
const PASSWORD_MIN: usize = 8;

/// Auth flows on top of an [`ApiClient`]
pub struct AuthService {
    client: ApiClient,
}

impl AuthService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn session(&self) -> &Arc<Session> {
        self.client.session()
    }

    /// `POST /auth/login`, then store the returned credential
    pub async fn login(&self, request: &LoginRequest) -> Result<User, ApiError> {
        validate_login(request)?;

        let response: AuthResponse = self.client.post("/auth/login", request).await?;
        self.establish(response).await
    }

    /// `POST /auth/register`, then store the returned credential
    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ApiError> {
        validate_register(request)?;

        let response: AuthResponse = self.client.post("/auth/register", request).await?;
        self.establish(response).await
    }

    /// `POST /auth/refresh` with the stored refresh token
    ///
    /// Fails without a network call when no refresh token is stored.
    pub async fn refresh(&self) -> Result<User, ApiError> {
        let credential = self
            .session()
            .run_blocking(Session::credential)
            .await
            .map_err(|e| ApiError::new(format!("Failed to read stored credential: {}", e)))?
            .filter(|credential| !credential.refresh_token().is_empty())
            .ok_or_else(|| ApiError::new("No refresh token stored").with_code("UNAUTHENTICATED"))?;

        let request = RefreshRequest {
            refresh_token: credential.refresh_token().to_string(),
        };
        let response: AuthResponse = self.client.post("/auth/refresh", &request).await?;

        // Keep the old refresh token if the server did not rotate it
        let refresh_token = if response.refresh_token.is_empty() {
            credential.refresh_token().to_string()
        } else {
            response.refresh_token
        };
        let credential = Credential::new(response.token, refresh_token);
        self.session()
            .run_blocking(move |session| session.refresh(&credential))
            .await
            .map_err(|e| ApiError::new(format!("Failed to store credential: {}", e)))?;

        Ok(response.user)
    }

    /// `POST /auth/logout`, then clear the stored credential
    ///
    /// The server only acknowledges logout; the local credential is cleared
    /// whether or not that call succeeds.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result: Result<MessageResponse, ApiError> =
            self.client.post("/auth/logout", &serde_json::json!({})).await;
        if let Err(e) = &result {
            tracing::debug!("Server-side logout failed, clearing local session anyway: {}", e);
        }

        self.session()
            .run_blocking(Session::logout)
            .await
            .map_err(|e| ApiError::new(format!("Failed to clear stored credential: {}", e)))
    }

    /// `GET /users/me`
    pub async fn me(&self) -> Result<User, ApiError> {
        self.client.get("/users/me").await
    }

    async fn establish(&self, response: AuthResponse) -> Result<User, ApiError> {
        let credential = Credential::new(response.token, response.refresh_token);
        self.session()
            .run_blocking(move |session| session.login(&credential))
            .await
            .map_err(|e| ApiError::new(format!("Failed to store credential: {}", e)))?;
        tracing::info!(username = %response.user.username, "Logged in");
        Ok(response.user)
    }
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let trimmed = email.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ApiError::validation("email", "must be a valid email address")),
    }
}

fn validate_login(request: &LoginRequest) -> Result<(), ApiError> {
    validate_email(&request.email)?;
    if request.password.is_empty() {
        return Err(ApiError::validation("password", "is required"));
    }
    Ok(())
}

fn validate_register(request: &RegisterRequest) -> Result<(), ApiError> {
    let username_len = request.username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&username_len) {
        return Err(ApiError::validation(
            "username",
            &format!("must be between {} and {} characters", USERNAME_MIN, USERNAME_MAX),
        ));
    }
    validate_email(&request.email)?;
    if request.password.chars().count() < PASSWORD_MIN {
        return Err(ApiError::validation(
            "password",
            &format!("must be at least {} characters", PASSWORD_MIN),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            display_name: None,
        }
    }

    fn login(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_validate_login() {
        assert!(validate_login(&login("ada@example.com", "x")).is_ok());

        let error = validate_login(&login("ada@example.com", "")).unwrap_err();
        assert!(error.details.unwrap().contains_key("password"));

        let error = validate_login(&login("ada", "x")).unwrap_err();
        assert_eq!(error.code.as_deref(), Some("VALIDATION"));
        assert!(error.details.unwrap().contains_key("email"));
    }

    #[test]
    fn test_validate_register_username_bounds() {
        assert!(validate_register(&register("ada", "ada@example.com", "password1")).is_ok());
        assert!(validate_register(&register("ad", "ada@example.com", "password1")).is_err());
        assert!(validate_register(&register(&"a".repeat(51), "ada@example.com", "password1")).is_err());
    }

    #[test]
    fn test_validate_register_password_length() {
        let error = validate_register(&register("ada", "ada@example.com", "short")).unwrap_err();
        assert_eq!(
            error.details.unwrap().get("password"),
            Some(&vec!["must be at least 8 characters".to_string()])
        );
    }

    #[test]
    fn test_validate_email_requires_both_parts() {
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ada@").is_err());
        assert!(validate_email("ada@example.com").is_ok());
    }
}
