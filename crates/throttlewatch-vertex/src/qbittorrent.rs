//! Minimal qBittorrent WebUI client
//!
//! Only what the throttle purge needs: log in, pause everything, delete
//! everything with its files.

use std::time::Duration;
use throttlewatch_core::{Error, Result};

/// Authenticated WebUI session
#[derive(Clone)]
pub struct QbSession {
    sid: String,
}

impl std::fmt::Debug for QbSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QbSession").field("sid", &"<REDACTED>").finish()
    }
}

/// qBittorrent WebUI client for one instance
#[derive(Debug, Clone)]
pub struct QbittorrentClient {
    base_url: String,
    client: reqwest::Client,
}

impl QbittorrentClient {
    /// Create a client for the WebUI at `base_url`
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Log in and return the session cookie
    ///
    /// # API Call
    ///
    /// ```http
    /// POST /api/v2/auth/login
    /// username=...&password=...
    /// ```
    pub async fn login(&self, username: &str, password: &str) -> Result<QbSession> {
        let response = self
            .client
            .post(format!("{}/api/v2/auth/login", self.base_url))
            .header("Referer", &self.base_url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|e| Error::http(format!("qBittorrent login request failed: {}", e)))?;

        let status = response.status();
        let sid = session_cookie(response.headers());
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() || body.trim() == "Fails." {
            return Err(Error::auth(format!(
                "qBittorrent login at {} rejected (status {})",
                self.base_url, status
            )));
        }

        let sid = sid.ok_or_else(|| {
            Error::auth(format!("qBittorrent at {} returned no session", self.base_url))
        })?;
        Ok(QbSession { sid })
    }

    /// Pause every torrent
    pub async fn pause_all(&self, session: &QbSession) -> Result<()> {
        self.post_form(session, "/api/v2/torrents/pause", &[("hashes", "all")])
            .await
    }

    /// Delete every torrent
    pub async fn delete_all(&self, session: &QbSession, delete_files: bool) -> Result<()> {
        let delete_files = if delete_files { "true" } else { "false" };
        self.post_form(
            session,
            "/api/v2/torrents/delete",
            &[("hashes", "all"), ("deleteFiles", delete_files)],
        )
        .await
    }

    /// Pause all, let the client settle, then delete all with files
    pub async fn purge(&self, username: &str, password: &str, settle: Duration) -> Result<()> {
        let session = self.login(username, password).await?;
        self.pause_all(&session).await?;
        tracing::info!("[qBittorrent] Paused all torrents at {}", self.base_url);

        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        self.delete_all(&session, true).await?;
        tracing::info!("[qBittorrent] Deleted all torrents and files at {}", self.base_url);
        Ok(())
    }

    async fn post_form(&self, session: &QbSession, path: &str, form: &[(&str, &str)]) -> Result<()> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Referer", &self.base_url)
            .header("Cookie", format!("SID={}", session.sid))
            .form(form)
            .send()
            .await
            .map_err(|e| Error::http(format!("qBittorrent request {} failed: {}", path, e)))?;

        if !response.status().is_success() {
            return Err(Error::provider(
                "qbittorrent",
                format!("{} failed with status {}", path, response.status()),
            ));
        }
        Ok(())
    }
}

/// Extract `SID` from the `Set-Cookie` headers
fn session_cookie(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|part| part.trim().strip_prefix("SID=").map(str::to_string))
        .filter(|sid| !sid.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};

    #[test]
    fn sid_is_read_from_set_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("other=1; path=/"));
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("SID=abc123; HttpOnly; SameSite=Strict; path=/"),
        );
        assert_eq!(session_cookie(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn missing_sid_is_none() {
        assert_eq!(session_cookie(&HeaderMap::new()), None);
    }
}
