//! Configuration types for the throttle monitor
//!
//! This module defines all configuration structures used throughout the
//! workspace. The daemon deserializes them from a JSON document.

use serde::{Deserialize, Serialize};

/// Main monitor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Hosting accounts to poll
    #[serde(default, rename = "rest_accounts", alias = "accounts")]
    pub accounts: Vec<AccountConfig>,

    /// Ledger persistence
    #[serde(default)]
    pub ledger: LedgerStoreConfig,

    /// Poll loop settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// HTTP surface settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Downstream automation (optional)
    #[serde(default)]
    pub vertex: Option<VertexConfig>,

    /// Notification channel (optional)
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,

    /// Periodic run report
    #[serde(default)]
    pub report: ReportConfig,
}

impl MonitorConfig {
    /// Parse a configuration document
    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        serde_json::from_str(json)
            .map_err(|e| crate::Error::config(format!("Invalid configuration document: {}", e)))
    }

    /// Validate the configuration
    ///
    /// Incomplete accounts are not an error here: they are skipped on every
    /// cycle so one bad account never blocks the others.
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.engine.validate()?;
        self.http.validate()?;
        self.report.validate()?;

        if let LedgerStoreConfig::File { path } = &self.ledger
            && path.trim().is_empty()
        {
            return Err(crate::Error::config("Ledger file path cannot be empty"));
        }

        if let Some(vertex) = &self.vertex {
            vertex.validate()?;
        }

        if let Some(telegram) = &self.telegram {
            telegram.validate()?;
        }

        Ok(())
    }

    /// Whether both the report source and the report channel are configured
    pub fn report_enabled(&self) -> bool {
        self.report.enabled && self.vertex.is_some() && self.telegram.is_some()
    }
}

/// Credentials for one hosting account
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Account identifier (customer number)
    #[serde(default)]
    pub account_id: String,
    /// OAuth access token
    /// ⚠️ NEVER log this value
    #[serde(default)]
    pub access_token: String,
    /// OAuth refresh token
    /// ⚠️ NEVER log this value
    #[serde(default)]
    pub refresh_token: String,
}

impl AccountConfig {
    /// Create a new account configuration
    pub fn new(
        account_id: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Names of the credential fields that are empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.account_id.trim().is_empty() {
            missing.push("account_id");
        }
        if self.access_token.trim().is_empty() {
            missing.push("access_token");
        }
        if self.refresh_token.trim().is_empty() {
            missing.push("refresh_token");
        }
        missing
    }

    /// Whether all credential fields are present
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Label used in logs (the account id, or a placeholder)
    pub fn label(&self) -> &str {
        if self.account_id.trim().is_empty() {
            "<unnamed account>"
        } else {
            &self.account_id
        }
    }
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("account_id", &self.account_id)
            .field("access_token", &"<REDACTED>")
            .field("refresh_token", &"<REDACTED>")
            .finish()
    }
}

/// Ledger store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerStoreConfig {
    /// JSON file
    File {
        /// Path to the ledger document
        path: String,
    },

    /// In-memory ledger (not persistent)
    Memory,
}

impl Default for LedgerStoreConfig {
    fn default() -> Self {
        LedgerStoreConfig::File {
            path: default_ledger_path(),
        }
    }
}

fn default_ledger_path() -> String {
    "throttle_history.json".to_string()
}

/// Poll loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay between successful cycles (in seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Delay after a failed cycle (in seconds)
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.poll_interval_secs == 0 {
            return Err(crate::Error::config("Poll interval must be > 0"));
        }
        if self.retry_delay_secs == 0 {
            return Err(crate::Error::config("Retry delay must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_retry_delay_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Routes served by the daemon besides the webhook
pub const RESERVED_PATHS: [&str; 4] = ["/", "/health", "/api/status", "/api/vertex/report"];

/// HTTP surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the per-resource lookup webhook
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,

    /// Optional dashboard HTML file (falls back to the built-in page)
    #[serde(default)]
    pub dashboard_path: Option<String>,
}

impl HttpConfig {
    /// Validate the HTTP configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !self.webhook_path.starts_with('/') || self.webhook_path.len() < 2 {
            return Err(crate::Error::config(format!(
                "Webhook path must start with '/' and not be the root. Got: '{}'",
                self.webhook_path
            )));
        }
        if self.webhook_path.contains(['{', '}', '*']) {
            return Err(crate::Error::config(format!(
                "Webhook path cannot contain route parameters or wildcards. Got: '{}'",
                self.webhook_path
            )));
        }
        if RESERVED_PATHS.contains(&self.webhook_path.as_str()) {
            return Err(crate::Error::config(format!(
                "Webhook path '{}' is already served by the daemon",
                self.webhook_path
            )));
        }
        if self.bind.trim().is_empty() {
            return Err(crate::Error::config("HTTP bind address cannot be empty"));
        }
        Ok(())
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            webhook_path: default_webhook_path(),
            dashboard_path: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    56578
}

fn default_webhook_path() -> String {
    "/webhook/secret-monitor".to_string()
}

/// Vertex downloader automation configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct VertexConfig {
    /// Vertex base URL (e.g. "https://vertex.example.com")
    pub base_url: String,

    /// Session cookie
    /// ⚠️ NEVER log this value
    #[serde(default)]
    pub cookie: String,

    /// Pause and delete all qBittorrent tasks when a resource gets throttled
    #[serde(default = "default_purge_on_throttle")]
    pub purge_on_throttle: bool,
}

impl VertexConfig {
    /// Validate the Vertex configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.base_url.trim().is_empty() {
            return Err(crate::Error::config("Vertex base_url cannot be empty"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(crate::Error::config(format!(
                "Vertex base_url must use HTTP or HTTPS scheme. Got: {}",
                self.base_url
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for VertexConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexConfig")
            .field("base_url", &self.base_url)
            .field("cookie", &"<REDACTED>")
            .field("purge_on_throttle", &self.purge_on_throttle)
            .finish()
    }
}

fn default_purge_on_throttle() -> bool {
    true
}

/// Telegram notifier configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token
    /// ⚠️ NEVER log this value
    pub bot_token: String,

    /// Target chat id
    pub chat_id: String,
}

impl TelegramConfig {
    /// Validate the Telegram configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.bot_token.trim().is_empty() {
            return Err(crate::Error::config("Telegram bot_token cannot be empty"));
        }
        if self.chat_id.trim().is_empty() {
            return Err(crate::Error::config("Telegram chat_id cannot be empty"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<REDACTED>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Periodic run report configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Whether the hourly report runs (needs Vertex and Telegram)
    #[serde(default = "default_report_enabled")]
    pub enabled: bool,

    /// Minute of every hour at which the report is sent
    #[serde(default = "default_report_minute")]
    pub minute: u32,
}

impl ReportConfig {
    /// Validate the report configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.minute >= 60 {
            return Err(crate::Error::config(format!(
                "Report minute must be between 0 and 59. Got: {}",
                self.minute
            )));
        }
        Ok(())
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: default_report_enabled(),
            minute: default_report_minute(),
        }
    }
}

fn default_report_enabled() -> bool {
    true
}

fn default_report_minute() -> u32 {
    57
}
