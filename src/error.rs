//! Unified error handling for the autopost crate
//!
//! Every fallible operation in the library returns [`Result`]. The variants
//! mirror the failure taxonomy of a publishing run:
//!
//! - [`Error::TransientNetwork`] - rate limited or transient I/O, surfaced only
//!   after the retry policy gave up
//! - [`Error::SelectorTimeout`] - an editor element never became interactable
//! - [`Error::Authentication`] - missing or rejected account credentials
//! - [`Error::ContentGeneration`] - empty or malformed generated content
//! - [`Error::QuotaExhausted`] - no credential has allowance left today
//! - [`Error::BatchFlush`] - a progress upsert was not confirmed
//!
//! Infrastructure failures (HTTP, SQLite, JSON, I/O, browser protocol) are
//! wrapped in their own variants so callers can classify them with
//! [`Error::category`].

use std::io;
use thiserror::Error;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, rate limit)
    Network,
    /// Browser automation errors (selectors, navigation, login)
    Automation,
    /// Content generation errors
    Generation,
    /// Credential quota errors
    Quota,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short lowercase label, used as a structured log field
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Automation => "automation",
            Self::Generation => "generation",
            Self::Quota => "quota",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the autopost crate
#[derive(Error, Debug)]
pub enum Error {
    /// Retryable failure that survived every attempt of the retry policy
    #[error("transient network failure after {attempts} attempt(s): {source}")]
    TransientNetwork {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// The remote service answered with a rate-limit signal
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// A required editor element never became ready
    #[error("selector '{selector}' not ready after {attempts} attempt(s)")]
    SelectorTimeout { selector: String, attempts: u32 },

    /// Missing or rejected account credentials
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Generation returned empty or malformed content
    #[error("content generation failed: {0}")]
    ContentGeneration(String),

    /// No credential has remaining daily allowance
    #[error("all {credentials} credential(s) reached the daily limit of {daily_limit}")]
    QuotaExhausted { credentials: usize, daily_limit: u32 },

    /// Progress upsert was not confirmed by the store
    #[error("progress batch flush failed: {0}")]
    BatchFlush(String),

    /// The publish went through but no post URL could be read back
    #[error("published post URL could not be extracted")]
    UrlNotFound,

    /// Browser / DevTools protocol failure
    #[error("browser error: {0}")]
    Browser(String),

    /// Remote API answered with a non-success status or envelope
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Database errors
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("config error: {0}")]
    Config(String),

    /// The run was stopped while this operation was suspended
    #[error("operation cancelled")]
    Cancelled,

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap a browser protocol error
    pub fn browser(err: impl std::fmt::Display) -> Self {
        Self::Browser(err.to_string())
    }

    /// Whether this is a rate-limit signal from a remote service
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status == 429,
            Self::Http(e) => e.status().map(|s| s.as_u16() == 429).unwrap_or(false),
            _ => false,
        }
    }

    /// Innermost error, looking through retry wrappers
    pub fn root(&self) -> &Error {
        match self {
            Self::TransientNetwork { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error is recoverable (a later attempt may succeed)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::TransientNetwork { .. } | Self::RateLimited(_) => true,
            Self::SelectorTimeout { .. } | Self::Browser(_) | Self::UrlNotFound => true,
            Self::Authentication(_) => false,
            Self::ContentGeneration(_) => true,
            Self::QuotaExhausted { .. } => false,
            Self::BatchFlush(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Database(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Http(_) => true,
            Self::Config(_) => false,
            Self::Cancelled => false,
            Self::Other { .. } => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TransientNetwork { .. }
            | Self::RateLimited(_)
            | Self::Http(_)
            | Self::Api { .. } => ErrorCategory::Network,
            Self::SelectorTimeout { .. }
            | Self::Authentication(_)
            | Self::UrlNotFound
            | Self::Browser(_) => ErrorCategory::Automation,
            Self::ContentGeneration(_) => ErrorCategory::Generation,
            Self::QuotaExhausted { .. } => ErrorCategory::Quota,
            Self::BatchFlush(_) | Self::Database(_) | Self::Io(_) | Self::Json(_) => {
                ErrorCategory::Storage
            }
            Self::Config(_) => ErrorCategory::Config,
            Self::Cancelled | Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::other(format!("lock poisoned: {err}"))
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
