//! Error types for the throttle monitor
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for throttlewatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the throttle monitor
#[derive(Error, Debug)]
pub enum Error {
    /// Status source (hosting API) errors
    #[error("Status source error: {0}")]
    StatusSource(String),

    /// Downstream automation errors
    #[error("Automation error: {0}")]
    Automation(String),

    /// Notifier errors
    #[error("Notifier error: {0}")]
    Notifier(String),

    /// Ledger store errors
    #[error("Ledger store error: {0}")]
    LedgerStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Account credentials are missing one or more fields
    #[error("Incomplete configuration for {account}: missing {missing}")]
    ConfigIncomplete {
        /// Account identifier (may be a placeholder when the id itself is missing)
        account: String,
        /// Comma-separated list of missing fields
        missing: String,
    },

    /// Local I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Failure classes the reconciliation loop reacts to
///
/// Every error maps onto exactly one class. The class decides containment:
/// which iteration is skipped and whether the ledger is still touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Skip the account or resource, continue the cycle
    ConfigIncomplete,
    /// Skip the resource for this cycle, no ledger mutation
    TransientNetworkFailure,
    /// Keep the in-memory ledger, retry on the next cycle's save
    PersistenceFailure,
    /// Logged and notified, ledger is still updated
    DownstreamActionFailure,
    /// Logged only
    NotifierFailure,
    /// Anything else
    Other,
}

impl ErrorClass {
    /// Stable name used as the `class` field in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::ConfigIncomplete => "config_incomplete",
            ErrorClass::TransientNetworkFailure => "transient_network",
            ErrorClass::PersistenceFailure => "persistence",
            ErrorClass::DownstreamActionFailure => "downstream_action",
            ErrorClass::NotifierFailure => "notifier",
            ErrorClass::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Create a status source error
    pub fn status_source(msg: impl Into<String>) -> Self {
        Self::StatusSource(msg.into())
    }

    /// Create an automation error
    pub fn automation(msg: impl Into<String>) -> Self {
        Self::Automation(msg.into())
    }

    /// Create a notifier error
    pub fn notifier(msg: impl Into<String>) -> Self {
        Self::Notifier(msg.into())
    }

    /// Create a ledger store error
    pub fn ledger_store(msg: impl Into<String>) -> Self {
        Self::LedgerStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an incomplete-configuration error
    pub fn config_incomplete(account: impl Into<String>, missing: &[&str]) -> Self {
        Self::ConfigIncomplete {
            account: account.into(),
            missing: missing.join(", "),
        }
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Classify this error for containment decisions
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Config(_) | Error::ConfigIncomplete { .. } => ErrorClass::ConfigIncomplete,
            Error::StatusSource(_)
            | Error::Http(_)
            | Error::Authentication(_)
            | Error::RateLimited(_)
            | Error::NotFound(_)
            | Error::Provider { .. } => ErrorClass::TransientNetworkFailure,
            Error::LedgerStore(_) | Error::Io(_) | Error::Json(_) => ErrorClass::PersistenceFailure,
            Error::Automation(_) => ErrorClass::DownstreamActionFailure,
            Error::Notifier(_) => ErrorClass::NotifierFailure,
            Error::InvalidInput(_) | Error::Other(_) => ErrorClass::Other,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
