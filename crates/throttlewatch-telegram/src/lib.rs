// # Telegram Notifier
//
// This crate delivers throttlewatch messages through the Telegram Bot API.
//
// ## Implementation Status
//
// - ✅ sendMessage with HTML parse mode
// - ✅ Run report formatting
// - ✅ HTTP timeout configured (10 seconds)
// - ❌ NO retry logic (delivery is best-effort)
// - ❌ NO message splitting for texts over the Bot API limit
//
// ### Trust Level: Untrusted (Notifier)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTPS calls to the Bot API
//
// **Forbidden Capabilities**:
// - ❌ Affect ledger or automation state
// - ❌ Spawn tasks or threads
//
// ## Security Requirements
//
// - The bot token is part of the request URL and NEVER appears in logs

pub mod report;

pub use report::{failure_notice, format_run_report};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use throttlewatch_core::config::TelegramConfig;
use throttlewatch_core::traits::Notifier;
use throttlewatch_core::{Error, Result};

/// Bot API base URL
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Default HTTP timeout for Bot API requests (10 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram notifier
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the bot token.
pub struct TelegramNotifier {
    /// Bot token
    /// ⚠️ NEVER log this value
    bot_token: String,

    /// Target chat
    chat_id: String,

    /// Bot API base URL
    api_base: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the token
impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("bot_token", &"<REDACTED>")
            .field("chat_id", &self.chat_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TelegramNotifier {
    /// Create a notifier from configuration
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        Self::with_api_base(config, TELEGRAM_API_BASE)
    }

    /// Create a notifier against a different Bot API host
    pub fn with_api_base(config: &TelegramConfig, api_base: impl Into<String>) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Send one HTML message
    ///
    /// # API Call
    ///
    /// ```http
    /// POST /bot<token>/sendMessage
    /// Content-Type: application/json
    ///
    /// { "chat_id": "...", "text": "...", "parse_mode": "HTML", "disable_web_page_preview": true }
    /// ```
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let body = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        // reqwest errors carry the URL, which contains the token
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::notifier(format!("Telegram request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => Error::auth(format!("Telegram rejected the bot token ({})", status)),
                404 => Error::notifier(format!("Telegram chat or bot not found ({})", status)),
                429 => Error::rate_limited("Telegram rate limit exceeded"),
                _ => Error::notifier(format!("Telegram returned status {}", status)),
            });
        }

        let result: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::notifier(format!("Failed to parse Telegram response: {}", e.without_url())))?;
        if !result.ok {
            return Err(Error::notifier(format!(
                "Telegram refused the message: {}",
                result.description.unwrap_or_else(|| "no description".to_string())
            )));
        }

        tracing::info!("[Telegram] Message delivered to chat {}", self.chat_id);
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, text: &str) -> Result<()> {
        self.send_message(text).await
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
