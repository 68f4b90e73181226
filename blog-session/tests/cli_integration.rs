//! Integration tests for the blog-session CLI
//!
//! Every test gets its own config file and encrypted credential directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestEnv {
    _temp_dir: TempDir,
    config_path: PathBuf,
    credentials_dir: PathBuf,
}

impl TestEnv {
    fn new(base_url: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let credentials_dir = temp_dir.path().join("credentials");
        let config_path = temp_dir.path().join("config.toml");

        let cred_path = credentials_dir.to_string_lossy().replace('\\', "\\\\");
        let config_content = format!(
            r#"
[api]
base_url = "{}"
timeout_ms = 2000

[credentials]
storage = "encrypted"
path = "{}"
"#,
            base_url, cred_path
        );
        fs::write(&config_path, config_content).unwrap();

        Self {
            _temp_dir: temp_dir,
            config_path,
            credentials_dir,
        }
    }

    /// Config pointing at a port nothing listens on
    fn offline() -> Self {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        Self::new(&format!("http://127.0.0.1:{}/api/v1", port))
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("blog-session").unwrap();
        cmd.env("BLOGSOCIAL_CONFIG", &self.config_path);
        cmd.env("BLOGSOCIAL_MASTER_PASSWORD", "test-password-12345");
        cmd.env_remove("BLOGSOCIAL_API_URL");
        cmd.env_remove("RUST_LOG");
        cmd
    }
}

fn user_json() -> Value {
    json!({
        "id": 1,
        "username": "ada",
        "email": "ada@example.com",
        "created_at": "2024-01-01T00:00:00Z"
    })
}

#[test]
fn test_status_without_session() {
    let env = TestEnv::offline();

    env.cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Root: Auth"))
        .stdout(predicate::str::contains("Backend: encrypted_file"));
}

#[test]
fn test_config_shows_effective_values() {
    let env = TestEnv::offline();

    env.cmd()
        .arg("config")
        .env("BLOGSOCIAL_APP_NAME", "Blog Social Staging")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"timeout_ms\": 2000"))
        .stdout(predicate::str::contains("Blog Social Staging"))
        .stdout(predicate::str::contains("test-password-12345").not());
}

#[test]
fn test_request_rejects_invalid_body() {
    let env = TestEnv::offline();

    env.cmd()
        .args(["request", "POST", "/posts", "--body", "{not json"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_request_connection_refused_prints_error_json() {
    let env = TestEnv::offline();

    let output = env.cmd().args(["request", "GET", "/posts"]).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    let error: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(!error["message"].as_str().unwrap().is_empty());
    assert!(error.get("code").is_none());
}

#[test]
fn test_refresh_and_logout_without_session_exit_2() {
    let env = TestEnv::offline();

    for command in ["refresh", "logout"] {
        env.cmd()
            .arg(command)
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Credential not found: auth_token"));
    }
}

#[test]
fn test_login_validation_failure_prints_error_json() {
    let env = TestEnv::offline();

    let output = env
        .cmd()
        .args(["login", "--email", "not-an-email", "--stdin"])
        .write_stdin("correct horse\n")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
    let error: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(error["code"], "VALIDATION");
    assert!(error["details"]["email"].is_array());
}

#[test]
fn test_login_rejects_empty_password() {
    let env = TestEnv::offline();

    env.cmd()
        .args(["login", "--email", "ada@example.com", "--stdin"])
        .write_stdin("\n")
        .assert()
        .code(3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_login_request_and_invalidation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .and(body_json(json!({"email": "ada@example.com", "password": "correct horse"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tok-123",
            "refresh_token": "ref-456",
            "user": user_json()
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/posts"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [], "total": 0})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/profile"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Token expired", "code": "UNAUTHORIZED"})),
        )
        .mount(&server)
        .await;

    let env = TestEnv::new(&format!("{}/api/v1", server.uri()));

    let env = tokio::task::spawn_blocking(move || {
        env.cmd()
            .args(["login", "--email", "ada@example.com", "--stdin"])
            .write_stdin("correct horse\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("Logged in as ada"));

        // Tokens are encrypted at rest
        let token_file = env.credentials_dir.join("blogsocial.auth_token.age");
        let on_disk = fs::read(&token_file).unwrap();
        assert!(!String::from_utf8_lossy(&on_disk).contains("tok-123"));

        env.cmd()
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Root: Main"));

        env.cmd()
            .args(["request", "get", "/posts"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"total\": 0"));

        env.cmd()
            .args(["request", "GET", "/profile"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("Token expired"))
            .stdout(predicate::str::contains("UNAUTHORIZED"));

        env.cmd()
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Root: Auth"));

        env.cmd().arg("logout").assert().code(2);

        env
    })
    .await
    .unwrap();

    drop(env);
}
