//! Logging setup shared by Blog Social binaries
//!
//! Everything goes to stderr so that command output on stdout stays
//! machine-readable. Format and level come from the command line or from
//! `BLOGSOCIAL_LOG_FORMAT` / `BLOGSOCIAL_LOG_LEVEL`; `RUST_LOG` wins over both.
//!
//! ```no_run
//! use libblogsocial::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "debug", false).init();
//! ```

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

pub const LOG_FORMAT_ENV: &str = "BLOGSOCIAL_LOG_FORMAT";
pub const LOG_LEVEL_ENV: &str = "BLOGSOCIAL_LOG_LEVEL";

const DEFAULT_LEVEL: &str = "info";
const VERBOSE_LEVEL: &str = "debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Plain lines, no colors
    #[default]
    Text,
    /// One JSON object per line
    Json,
    /// Multi-line, colored
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    /// Forces `debug` unless `RUST_LOG` is set
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: impl Into<String>, verbose: bool) -> Self {
        Self {
            format,
            level: level.into(),
            verbose,
        }
    }

    /// Settings from `BLOGSOCIAL_LOG_FORMAT` and `BLOGSOCIAL_LOG_LEVEL`
    ///
    /// An unparseable format falls back to text.
    pub fn from_env() -> Self {
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default();
        let level = std::env::var(LOG_LEVEL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LEVEL.to_string());

        Self::new(format, level, false)
    }

    /// Directive used when `RUST_LOG` is not set
    pub fn directive(&self) -> &str {
        if self.verbose {
            VERBOSE_LEVEL
        } else {
            &self.level
        }
    }

    /// Install the global subscriber
    ///
    /// Returns `false` if a subscriber was already installed (e.g. a second
    /// call from a test); the existing one is kept.
    pub fn init(&self) -> bool {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(self.directive()))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));

        let installed = match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .flatten_event(true)
                .with_current_span(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_file(true)
                .with_line_number(true)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(false)
                .try_init(),
        };

        installed.is_ok()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(LogFormat::Text, DEFAULT_LEVEL, false)
    }
}
