// # Vertex Automation
//
// This crate toggles the Vertex downloader that runs on a throttled server
// and optionally purges the qBittorrent instance behind it.
//
// ## Implementation Status
//
// - ✅ Downloader lookup by client URL host (the resource id)
// - ✅ Enable/disable through the Vertex modify API
// - ✅ Optional purge on disable: pause all, settle, delete all with files
// - ✅ Run statistics for the periodic report
// - ✅ HTTP timeout configured (30 seconds)
// - ❌ NO retry logic (one attempt per transition; failures are reported)
// - ❌ NO background tasks
//
// ### Trust Level: Untrusted (Automation)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTP/HTTPS calls to Vertex and the downloader's WebUI
//
// **Forbidden Capabilities**:
// - ❌ Retry failed calls
// - ❌ Access the ledger
// - ❌ Spawn tasks or threads
//
// ## Security Requirements
//
// - The Vertex cookie and WebUI passwords NEVER appear in logs
//
// ## API Reference
//
// - List downloaders: GET `/api/downloader/list`
// - Modify downloader: POST `/api/downloader/modify`
// - Run statistics: GET `/api/setting/getRunInfo`

pub mod downloader;
pub mod qbittorrent;
pub mod run_info;

pub use downloader::Downloader;
pub use qbittorrent::QbittorrentClient;
pub use run_info::{RunInfo, TrackerStats};

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use throttlewatch_core::config::VertexConfig;
use throttlewatch_core::traits::Automation;
use throttlewatch_core::{Error, Result};

use run_info::Envelope;

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait between pausing and deleting torrents
const DEFAULT_PURGE_SETTLE: Duration = Duration::from_secs(5);

/// Vertex downloader automation
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the cookie.
pub struct VertexAutomation {
    /// Vertex base URL
    base_url: String,

    /// Session cookie
    /// ⚠️ NEVER log this value
    cookie: String,

    /// Purge the qBittorrent instance on disable
    purge_on_throttle: bool,

    /// Wait between pause and delete during a purge
    purge_settle: Duration,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the cookie
impl std::fmt::Debug for VertexAutomation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexAutomation")
            .field("base_url", &self.base_url)
            .field("cookie", &"<REDACTED>")
            .field("purge_on_throttle", &self.purge_on_throttle)
            .finish()
    }
}

impl VertexAutomation {
    /// Create the automation from configuration
    pub fn new(config: &VertexConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cookie: config.cookie.clone(),
            purge_on_throttle: config.purge_on_throttle,
            purge_settle: DEFAULT_PURGE_SETTLE,
            client,
        })
    }

    /// Override the wait between pause and delete
    pub fn with_purge_settle(mut self, settle: Duration) -> Self {
        self.purge_settle = settle;
        self
    }

    /// List all downloaders
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /api/downloader/list
    /// Cookie: <session>
    /// ```
    pub async fn list_downloaders(&self) -> Result<Vec<Downloader>> {
        let entries: Vec<Value> = self.get("/api/downloader/list").await?;
        Ok(entries.iter().filter_map(Downloader::from_json).collect())
    }

    /// Find the downloader running on a resource
    pub async fn find_downloader(&self, resource_id: &str) -> Result<Downloader> {
        self.list_downloaders()
            .await?
            .into_iter()
            .find(|d| d.serves(resource_id))
            .ok_or_else(|| Error::not_found(format!("No Vertex downloader for {}", resource_id)))
    }

    /// Fetch today's run statistics
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /api/setting/getRunInfo
    /// Cookie: <session>
    /// ```
    pub async fn fetch_run_info(&self) -> Result<RunInfo> {
        tracing::info!("[Vertex] Requesting run info");
        self.get("/api/setting/getRunInfo").await
    }

    /// Set the enable flag of a downloader
    ///
    /// # API Call
    ///
    /// ```http
    /// POST /api/downloader/modify
    /// Cookie: <session>
    ///
    /// { ...downloader, "enable": true|false }
    /// ```
    async fn modify(&self, downloader: &Downloader, enable: bool) -> Result<()> {
        if downloader.enabled == enable {
            tracing::debug!(
                "[Vertex] Downloader {} already {}",
                downloader.alias,
                if enable { "enabled" } else { "disabled" }
            );
            return Ok(());
        }

        let response = self
            .client
            .post(format!("{}/api/downloader/modify", self.base_url))
            .header("Cookie", &self.cookie)
            .json(&downloader.modify_body(enable))
            .send()
            .await
            .map_err(|e| Error::http(format!("Vertex modify request failed: {}", e)))?;

        let envelope: Envelope<Value> = Self::read_envelope(response, "/api/downloader/modify").await?;
        if !envelope.success {
            return Err(Error::automation(format!(
                "Vertex refused to modify {}: {}",
                downloader.alias,
                envelope.message.unwrap_or_else(|| "no message".to_string())
            )));
        }
        Ok(())
    }

    /// Pause and delete everything on the downloader's qBittorrent
    async fn purge(&self, downloader: &Downloader) -> Result<()> {
        let Some((username, password)) = downloader.credentials() else {
            tracing::debug!(
                "[qBittorrent] No WebUI credentials for {}, skipping purge",
                downloader.alias
            );
            return Ok(());
        };

        QbittorrentClient::new(&downloader.client_url, self.client.clone())
            .purge(username, password, self.purge_settle)
            .await
            .map_err(|e| Error::automation(format!("Purge of {} failed: {}", downloader.alias, e)))
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("Cookie", &self.cookie)
            .send()
            .await
            .map_err(|e| Error::http(format!("Vertex request {} failed: {}", path, e)))?;

        let envelope: Envelope<T> = Self::read_envelope(response, path).await?;
        if !envelope.success {
            return Err(Error::provider(
                "vertex",
                format!(
                    "{} unsuccessful: {}",
                    path,
                    envelope.message.unwrap_or_else(|| "no message".to_string())
                ),
            ));
        }
        envelope
            .data
            .ok_or_else(|| Error::provider("vertex", format!("{} returned no data", path)))
    }

    async fn read_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        path: &str,
    ) -> Result<Envelope<T>> {
        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => Error::auth(format!("Vertex rejected the session cookie ({})", status)),
                404 => Error::not_found(format!("Vertex endpoint not found: {}", path)),
                _ => Error::provider("vertex", format!("{} failed with status {}", path, status)),
            });
        }

        response
            .json()
            .await
            .map_err(|e| Error::provider("vertex", format!("Failed to parse {}: {}", path, e)))
    }
}

#[async_trait]
impl Automation for VertexAutomation {
    async fn enable(&self, resource_id: &str) -> Result<()> {
        let downloader = self.find_downloader(resource_id).await?;
        self.modify(&downloader, true).await?;
        tracing::info!("[Vertex] Enabled downloader {} ({})", downloader.alias, resource_id);
        Ok(())
    }

    /// Disable the downloader, then purge its client if configured
    ///
    /// The purge runs even when the modify call failed; the first error is
    /// returned.
    async fn disable(&self, resource_id: &str) -> Result<()> {
        let downloader = self.find_downloader(resource_id).await?;

        let modified = self.modify(&downloader, false).await;
        match &modified {
            Ok(()) => tracing::info!(
                "[Vertex] Disabled downloader {} ({})",
                downloader.alias,
                resource_id
            ),
            Err(e) => tracing::error!("[Vertex] Failed to disable {}: {}", downloader.alias, e),
        }

        let purged = if self.purge_on_throttle {
            self.purge(&downloader).await
        } else {
            Ok(())
        };

        modified.and(purged)
    }

    fn name(&self) -> &'static str {
        "vertex"
    }
}
