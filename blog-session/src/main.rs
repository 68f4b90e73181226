//! blog-session - command-line front end for a Blog Social session
//!
//! Logs in, refreshes, logs out and issues authenticated requests against the
//! configured API, using the same credential storage as every other front end.

use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libblogsocial::auth::AuthService;
use libblogsocial::client::{ApiClient, Method};
use libblogsocial::config::{resolve_config_path, Config};
use libblogsocial::credentials::CredentialManager;
use libblogsocial::gate::SessionGate;
use libblogsocial::logging::{LogFormat, LoggingConfig};
use libblogsocial::session::Session;
use libblogsocial::types::LoginRequest;
use libblogsocial::{ApiError, BlogSocialError};
use serde_json::Value;
use tracing::error;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "blog-session")]
#[command(about = "Manage a Blog Social session and call the API with it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format (text, json, pretty)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which root the app would open on and where tokens are stored
    Status,

    /// Log in with email and password
    Login {
        /// Account email
        #[arg(long)]
        email: String,

        /// Read the password from stdin instead of prompting
        #[arg(long)]
        stdin: bool,
    },

    /// Log out and clear stored tokens
    Logout,

    /// Exchange the stored refresh token for a new credential
    Refresh,

    /// Send an authenticated request and print the JSON response
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,

        /// Path relative to the API base URL, e.g. /posts?page=1
        path: String,

        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

/// Outcome of a command that prints its own failure
enum Outcome {
    Success,
    Failed(i32),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    logging.verbose = cli.verbose;
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    logging.init();

    match run_command(cli.command).await {
        Ok(Outcome::Success) => Ok(()),
        Ok(Outcome::Failed(code)) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            let code = e
                .downcast_ref::<BlogSocialError>()
                .map(BlogSocialError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

async fn run_command(command: Commands) -> Result<Outcome> {
    let config = Config::load()?;

    match command {
        Commands::Config => show_config(&config),
        Commands::Status => show_status(&config),
        Commands::Login { email, stdin } => login(&config, email, stdin).await,
        Commands::Logout => logout(&config).await,
        Commands::Refresh => refresh(&config).await,
        Commands::Request { method, path, body } => request(&config, &method, &path, body.as_deref()).await,
    }
}

fn open_session(config: &Config) -> Result<Arc<Session>> {
    let manager = CredentialManager::new(config.credentials.clone())?;
    Ok(Arc::new(Session::new(Arc::new(manager))))
}

fn auth_service(config: &Config) -> Result<AuthService> {
    let client = ApiClient::new(config.api.clone(), open_session(config)?)?;
    Ok(AuthService::new(client))
}

fn show_config(config: &Config) -> Result<Outcome> {
    println!("Config file: {}", resolve_config_path()?.display());
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(Outcome::Success)
}

fn show_status(config: &Config) -> Result<Outcome> {
    let session = open_session(config)?;
    let root = SessionGate::resolve(&session)?;

    println!("App: {}", config.app.name);
    println!("API: {}", config.api.base_url);
    println!("Root: {}", root);
    println!("Backend: {}", session.backend_name());
    Ok(Outcome::Success)
}

async fn login(config: &Config, email: String, stdin: bool) -> Result<Outcome> {
    let mut password = read_password(stdin)?;
    let auth = auth_service(config)?;

    // Moved, not copied: the request wipes it on drop
    let request = LoginRequest {
        email,
        password: std::mem::take(&mut *password),
    };

    match auth.login(&request).await {
        Ok(user) => {
            println!("Logged in as {} ({})", user.username, user.email);
            Ok(Outcome::Success)
        }
        Err(api_error) => report(&api_error),
    }
}

fn read_password(stdin: bool) -> Result<Zeroizing<String>> {
    let password = if stdin {
        let mut line = Zeroizing::new(String::new());
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read password from stdin")?;
        let len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(len);
        line
    } else if atty::is(atty::Stream::Stdin) {
        Zeroizing::new(rpassword::prompt_password("Password: ").context("Failed to read password")?)
    } else {
        return Err(BlogSocialError::InvalidInput(
            "No terminal available for the password prompt; use --stdin".to_string(),
        )
        .into());
    };

    if password.is_empty() {
        return Err(BlogSocialError::InvalidInput("Password cannot be empty".to_string()).into());
    }
    Ok(password)
}

async fn logout(config: &Config) -> Result<Outcome> {
    let auth = auth_service(config)?;
    require_session(&auth).await?;

    match auth.logout().await {
        Ok(()) => {
            println!("Logged out");
            Ok(Outcome::Success)
        }
        Err(api_error) => report(&api_error),
    }
}

async fn refresh(config: &Config) -> Result<Outcome> {
    let auth = auth_service(config)?;
    require_session(&auth).await?;

    match auth.refresh().await {
        Ok(user) => {
            println!("Session refreshed for {}", user.username);
            Ok(Outcome::Success)
        }
        Err(api_error) => report(&api_error),
    }
}

/// Fail with `CredentialError::NotFound` (exit 2) when nobody is logged in
async fn require_session(auth: &AuthService) -> Result<()> {
    auth.session().run_blocking(Session::require_credential).await?;
    Ok(())
}

/// Print a normalized API error on stdout and pick the exit code for it
fn report(api_error: &ApiError) -> Result<Outcome> {
    println!("{}", serde_json::to_string_pretty(api_error)?);
    Ok(Outcome::Failed(api_error.exit_code()))
}

async fn request(config: &Config, method: &str, path: &str, body: Option<&str>) -> Result<Outcome> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| BlogSocialError::InvalidInput(format!("Invalid HTTP method: '{}'", method)))?;
    let body = body
        .map(serde_json::from_str::<Value>)
        .transpose()
        .map_err(|e| BlogSocialError::InvalidInput(format!("Request body is not valid JSON: {}", e)))?;

    let client = ApiClient::new(config.api.clone(), open_session(config)?)?;

    match client.request(method, path, body, None).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(Outcome::Success)
        }
        Err(api_error) => report(&api_error),
    }
}
