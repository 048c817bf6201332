// # Netcup Status Source
//
// This crate provides the Netcup SCP REST API status source for the
// throttle monitor.
//
// ## Implementation Status
//
// - ✅ One listing request per account and one detail request per server per cycle
// - ✅ Full error propagation to the engine (the next cycle is the retry)
// - ✅ HTTP timeout configured (30 seconds)
// - ✅ Specific error handling for HTTP status codes (401, 403, 404, 429, 5xx)
// - ✅ Access token refresh 30 seconds before expiry, refresh token rotation
// - ✅ One refresh and one re-issue on 401
// - ❌ NO retry with backoff (owned by the poll scheduler)
// - ❌ NO caching of server state (owned by the engine)
// - ❌ NO background token refresh (violates shutdown determinism)
//
// ### Trust Level: Untrusted (Status Source)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTP/HTTPS API calls to the SCP and its token endpoint only
// - ✅ Keep its own access/refresh token pair
// - ✅ Parse provider-specific responses
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Access the ledger
// - ❌ Decide whether a throttle state changed
//
// ## Security Requirements
//
// - Tokens NEVER appear in logs or `Debug` output
//
// ## API Reference
//
// - List servers: GET `/servers`
// - Server details: GET `/servers/:id?loadServerLiveInfo=true`
// - Token refresh: POST `realms/scp/protocol/openid-connect/token`
//   (`grant_type=refresh_token`, `client_id=scp`)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use throttlewatch_core::config::AccountConfig;
use throttlewatch_core::traits::{ServerRef, ServerStatus, StatusSource, StatusSourceFactory};
use throttlewatch_core::{Error, Result, TrafficCounters};
use tokio::sync::Mutex;

/// SCP REST API base URL
pub const NETCUP_API_BASE: &str = "https://www.servercontrolpanel.de/scp-core/api/v1";

/// Keycloak token endpoint
pub const NETCUP_TOKEN_URL: &str =
    "https://www.servercontrolpanel.de/realms/scp/protocol/openid-connect/token";

/// OAuth client id of the SCP
const CLIENT_ID: &str = "scp";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifetime assumed for the configured access token
const INITIAL_TOKEN_LIFETIME: Duration = Duration::from_secs(240);

/// Refresh this long before the token expires
const REFRESH_MARGIN: Duration = Duration::from_secs(30);

/// Lifetime used when the token endpoint omits `expires_in`
const DEFAULT_EXPIRES_IN: u64 = 300;

/// Current credentials of one account
struct TokenState {
    access_token: String,
    refresh_token: String,
    expires_at: Instant,
}

impl TokenState {
    fn needs_refresh(&self, now: Instant) -> bool {
        now + REFRESH_MARGIN >= self.expires_at
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Netcup SCP status source for one account
///
/// # Trust Level: Untrusted
///
/// Requests are single-shot apart from the one re-issue after a token
/// refresh on 401.
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the tokens.
pub struct NetcupStatusSource {
    /// Account label used in logs and views
    account_id: String,

    /// API base URL
    base_url: String,

    /// Token endpoint URL
    token_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Access/refresh token pair
    /// ⚠️ NEVER log these values
    tokens: Mutex<TokenState>,
}

// Custom Debug implementation that hides the tokens
impl std::fmt::Debug for NetcupStatusSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetcupStatusSource")
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .field("tokens", &"<REDACTED>")
            .finish()
    }
}

impl NetcupStatusSource {
    /// Create a status source against the production endpoints
    ///
    /// # Errors
    ///
    /// - `ConfigIncomplete` if the account lacks a field
    /// - `Http` if the HTTP client cannot be built
    pub fn new(account: &AccountConfig) -> Result<Self> {
        Self::with_endpoints(account, NETCUP_API_BASE, NETCUP_TOKEN_URL)
    }

    /// Create a status source against custom endpoints
    pub fn with_endpoints(
        account: &AccountConfig,
        base_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Result<Self> {
        let missing = account.missing_fields();
        if !missing.is_empty() {
            return Err(Error::config_incomplete(account.label(), &missing));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            account_id: account.account_id.clone(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_url: token_url.into(),
            client,
            tokens: Mutex::new(TokenState {
                access_token: account.access_token.clone(),
                refresh_token: account.refresh_token.clone(),
                expires_at: Instant::now() + INITIAL_TOKEN_LIFETIME,
            }),
        })
    }

    /// Current access token, refreshed first if it is about to expire
    async fn access_token(&self) -> Result<String> {
        let mut tokens = self.tokens.lock().await;
        if tokens.needs_refresh(Instant::now()) {
            self.refresh(&mut tokens).await?;
        }
        Ok(tokens.access_token.clone())
    }

    /// Exchange the refresh token for a new access token
    ///
    /// # API Call
    ///
    /// ```http
    /// POST realms/scp/protocol/openid-connect/token
    /// Content-Type: application/x-www-form-urlencoded
    ///
    /// client_id=scp&refresh_token=...&grant_type=refresh_token
    /// ```
    async fn refresh(&self, tokens: &mut TokenState) -> Result<()> {
        tracing::info!("[{}] Refreshing access token", self.account_id);

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", CLIENT_ID),
                ("refresh_token", tokens.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| Error::http(format!("Token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!("[{}] Token refresh failed: {}", self.account_id, status);
            return Err(Error::auth(format!(
                "Token refresh for account {} rejected with status {}",
                self.account_id, status
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::auth(format!("Invalid token response: {}", e)))?;

        let expires_in = body.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        tokens.access_token = body.access_token;
        if let Some(refresh_token) = body.refresh_token {
            tokens.refresh_token = refresh_token;
        }
        tokens.expires_at = Instant::now() + Duration::from_secs(expires_in);

        tracing::info!(
            "[{}] Access token refreshed (valid for {}s)",
            self.account_id,
            expires_in
        );
        Ok(())
    }

    /// Force a refresh after the API rejected the current token
    async fn refresh_rejected(&self, rejected: &str) -> Result<String> {
        let mut tokens = self.tokens.lock().await;
        // Another caller may already have replaced the rejected token
        if tokens.access_token == rejected {
            self.refresh(&mut tokens).await?;
        }
        Ok(tokens.access_token.clone())
    }

    /// GET a JSON document from the API
    ///
    /// A 401 triggers one token refresh and one re-issue of the request.
    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let token = self.access_token().await?;
        let mut response = self.send_get(&url, query, &token).await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            tracing::warn!(
                "[{}] Access token rejected, refreshing and retrying once",
                self.account_id
            );
            let token = self.refresh_rejected(&token).await?;
            response = self.send_get(&url, query, &token).await?;
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(map_status(status.as_u16(), path, &error_text));
        }

        response
            .json()
            .await
            .map_err(|e| Error::provider("netcup", format!("Failed to parse response: {}", e)))
    }

    async fn send_get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        token: &str,
    ) -> Result<reqwest::Response> {
        self.client
            .get(url)
            .query(query)
            .bearer_auth(token)
            .header("Accept", "application/hal+json")
            .send()
            .await
            .map_err(|e| Error::http(format!("HTTP request failed: {}", e)))
    }
}

/// Map an unsuccessful HTTP status to an error
fn map_status(status: u16, path: &str, error_text: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "Request to {} rejected: invalid token or insufficient permissions. Status: {}",
            path, status
        )),
        404 => Error::not_found(format!("Not found: {}", path)),
        429 => Error::rate_limited(format!(
            "Rate limit exceeded. Please retry later. Status: {}",
            status
        )),
        500..=599 => Error::provider(
            "netcup",
            format!("SCP server error (transient): {} - {}", status, error_text),
        ),
        _ => Error::provider(
            "netcup",
            format!("Request to {} failed: {} - {}", path, status, error_text),
        ),
    }
}

/// Render a JSON id (number or string) as a string
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.trim().is_empty())
}

fn mib(value: &Value) -> u64 {
    value
        .as_u64()
        .or_else(|| value.as_f64().map(|f| f.max(0.0).round() as u64))
        .unwrap_or(0)
}

/// Parse the `/servers` listing
///
/// Entries without an id are skipped. The name falls back from
/// `hostname` to `name` to the id itself.
pub fn parse_server_list(json: &Value) -> Result<Vec<ServerRef>> {
    let entries = json
        .as_array()
        .ok_or_else(|| Error::provider("netcup", "Invalid response format: expected an array"))?;

    let mut servers = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(server_id) = id_string(&entry["vserverId"]).or_else(|| id_string(&entry["id"]))
        else {
            tracing::warn!("Skipping server entry without id");
            continue;
        };

        let display_name = non_empty_str(&entry["hostname"])
            .or_else(|| non_empty_str(&entry["name"]))
            .map(str::to_string)
            .unwrap_or_else(|| server_id.clone());

        servers.push(ServerRef::new(server_id, display_name));
    }

    Ok(servers)
}

/// Parse a `/servers/:id?loadServerLiveInfo=true` document
///
/// The throttle flag is only reported when live info is present; a
/// server without it is unavailable for this cycle.
pub fn parse_server_status(json: &Value) -> ServerStatus {
    let ipv4 = json["ipv4Addresses"]
        .as_array()
        .and_then(|addresses| addresses.first())
        .and_then(|address| non_empty_str(&address["ip"]))
        .map(str::to_string);

    let live = &json["serverLiveInfo"];
    if !live.is_object() {
        return ServerStatus {
            ipv4,
            ..Default::default()
        };
    }

    let mut throttled = false;
    let mut rx_mib: u64 = 0;
    let mut tx_mib: u64 = 0;
    for interface in live["interfaces"].as_array().into_iter().flatten() {
        rx_mib = rx_mib.saturating_add(mib(&interface["rxMonthlyInMiB"]));
        tx_mib = tx_mib.saturating_add(mib(&interface["txMonthlyInMiB"]));
        throttled |= interface["trafficThrottled"].as_bool().unwrap_or(false);
    }

    ServerStatus {
        ipv4,
        throttled: Some(throttled),
        traffic: TrafficCounters::new(rx_mib, tx_mib),
        operational_status: non_empty_str(&live["state"]).map(str::to_string),
    }
}

#[async_trait]
impl StatusSource for NetcupStatusSource {
    fn account_id(&self) -> &str {
        &self.account_id
    }

    /// List the servers of the account
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /servers
    /// Authorization: Bearer <token>
    /// ```
    async fn list_servers(&self) -> Result<Vec<ServerRef>> {
        let json = self.get_json("/servers", &[]).await?;
        let servers = parse_server_list(&json)?;
        tracing::debug!("[{}] Listed {} servers", self.account_id, servers.len());
        Ok(servers)
    }

    /// Fetch address, live state, throttle flag and traffic in one request
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /servers/:id?loadServerLiveInfo=true
    /// Authorization: Bearer <token>
    /// ```
    async fn fetch_status(&self, server: &ServerRef) -> Result<ServerStatus> {
        let path = format!("/servers/{}", server.server_id);
        let json = self
            .get_json(&path, &[("loadServerLiveInfo", "true")])
            .await?;
        Ok(parse_server_status(&json))
    }
}

/// Factory for creating Netcup status sources
#[derive(Debug, Clone)]
pub struct NetcupStatusSourceFactory {
    base_url: String,
    token_url: String,
}

impl NetcupStatusSourceFactory {
    /// Factory for the production endpoints
    pub fn new() -> Self {
        Self::with_endpoints(NETCUP_API_BASE, NETCUP_TOKEN_URL)
    }

    /// Factory for custom endpoints
    pub fn with_endpoints(base_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token_url: token_url.into(),
        }
    }
}

impl Default for NetcupStatusSourceFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSourceFactory for NetcupStatusSourceFactory {
    fn create(&self, account: &AccountConfig) -> Result<Box<dyn StatusSource>> {
        Ok(Box::new(NetcupStatusSource::with_endpoints(
            account,
            self.base_url.clone(),
            self.token_url.clone(),
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::json;

    fn account() -> AccountConfig {
        AccountConfig::new("acct-1", "old-access", "old-refresh")
    }

    fn source(server: &MockServer) -> NetcupStatusSource {
        NetcupStatusSource::with_endpoints(&account(), server.url("/api"), server.url("/token"))
            .unwrap()
    }

    #[test]
    fn test_server_list_fallbacks() {
        let json = json!([
            { "vserverId": 42, "id": 1, "hostname": "v2201" },
            { "id": "7", "name": "nick" },
            { "id": 9 },
            { "hostname": "no-id" }
        ]);

        let servers = parse_server_list(&json).unwrap();
        assert_eq!(
            servers,
            vec![
                ServerRef::new("42", "v2201"),
                ServerRef::new("7", "nick"),
                ServerRef::new("9", "9"),
            ]
        );
    }

    #[test]
    fn test_server_list_requires_array() {
        assert!(parse_server_list(&json!({ "servers": [] })).is_err());
    }

    #[test]
    fn test_status_sums_interfaces() {
        let json = json!({
            "ipv4Addresses": [{ "ip": "203.0.113.7" }, { "ip": "203.0.113.8" }],
            "serverLiveInfo": {
                "state": "RUNNING",
                "interfaces": [
                    { "rxMonthlyInMiB": 1024, "txMonthlyInMiB": 512, "trafficThrottled": false },
                    { "rxMonthlyInMiB": 1024, "txMonthlyInMiB": 512, "trafficThrottled": true }
                ]
            }
        });

        let status = parse_server_status(&json);
        assert_eq!(status.ipv4.as_deref(), Some("203.0.113.7"));
        assert_eq!(status.throttled, Some(true));
        assert_eq!(status.traffic, TrafficCounters::new(2048, 1024));
        assert_eq!(status.operational_status.as_deref(), Some("RUNNING"));
    }

    #[test]
    fn test_status_saturates_huge_counters() {
        let json = json!({
            "ipv4Addresses": [{ "ip": "203.0.113.7" }],
            "serverLiveInfo": {
                "interfaces": [
                    { "rxMonthlyInMiB": u64::MAX, "txMonthlyInMiB": 1 },
                    { "rxMonthlyInMiB": u64::MAX, "txMonthlyInMiB": 1e30 }
                ]
            }
        });

        let status = parse_server_status(&json);
        assert_eq!(status.traffic.rx_mib, u64::MAX);
        assert_eq!(status.traffic.tx_mib, u64::MAX);
        assert!(status.traffic.total_gb().is_finite());
    }

    #[test]
    fn test_status_without_live_info_has_no_flag() {
        let status = parse_server_status(&json!({ "ipv4Addresses": [] }));
        assert_eq!(status.ipv4, None);
        assert_eq!(status.throttled, None);
        assert_eq!(status.operational_status, None);
    }

    #[test]
    fn test_incomplete_account_rejected() {
        let account = AccountConfig::new("acct-1", "access", "");
        let err = NetcupStatusSource::new(&account).unwrap_err();
        assert!(err.to_string().contains("refresh_token"));
    }

    #[test]
    fn test_tokens_not_exposed_in_debug() {
        let source = NetcupStatusSource::new(&account()).unwrap();
        let debug = format!("{:?}", source);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("old-access"));
        assert!(!debug.contains("old-refresh"));
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(map_status(403, "/servers", ""), Error::Authentication(_)));
        assert!(matches!(map_status(404, "/servers/1", ""), Error::NotFound(_)));
        assert!(matches!(map_status(429, "/servers", ""), Error::RateLimited(_)));
        assert!(matches!(map_status(502, "/servers", ""), Error::Provider { .. }));
    }

    #[tokio::test]
    async fn test_fetch_status_single_request() {
        let server = MockServer::start_async().await;
        let detail = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/servers/42")
                    .query_param("loadServerLiveInfo", "true")
                    .header("authorization", "Bearer old-access");
                then.status(200).json_body(json!({
                    "ipv4Addresses": [{ "ip": "203.0.113.7" }],
                    "serverLiveInfo": {
                        "state": "RUNNING",
                        "interfaces": [{ "rxMonthlyInMiB": 10, "txMonthlyInMiB": 5, "trafficThrottled": false }]
                    }
                }));
            })
            .await;

        let status = source(&server)
            .fetch_status(&ServerRef::new("42", "v2201"))
            .await
            .unwrap();

        detail.assert_hits_async(1).await;
        assert_eq!(status.throttled, Some(false));
        assert_eq!(status.ipv4.as_deref(), Some("203.0.113.7"));
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_once_and_rotates() {
        let server = MockServer::start_async().await;
        let rejected = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/servers")
                    .header("authorization", "Bearer old-access");
                then.status(401);
            })
            .await;
        let accepted = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/servers")
                    .header("authorization", "Bearer new-access");
                then.status(200)
                    .json_body(json!([{ "id": 1, "hostname": "v2201" }]));
            })
            .await;
        let first_refresh = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .body_contains("grant_type=refresh_token")
                    .body_contains("refresh_token=old-refresh");
                // Short lifetime: the next call refreshes proactively
                then.status(200).json_body(json!({
                    "access_token": "new-access",
                    "refresh_token": "rotated-refresh",
                    "expires_in": 10
                }));
            })
            .await;
        let second_refresh = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .body_contains("refresh_token=rotated-refresh");
                then.status(200).json_body(json!({
                    "access_token": "new-access",
                    "expires_in": 300
                }));
            })
            .await;

        let source = source(&server);
        let servers = source.list_servers().await.unwrap();
        assert_eq!(servers, vec![ServerRef::new("1", "v2201")]);
        rejected.assert_hits_async(1).await;
        accepted.assert_hits_async(1).await;
        first_refresh.assert_hits_async(1).await;

        source.list_servers().await.unwrap();
        second_refresh.assert_hits_async(1).await;
        accepted.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_failed_refresh_is_authentication_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/servers");
                then.status(401);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(400).body("invalid_grant");
            })
            .await;

        let err = source(&server).list_servers().await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/servers/42");
                then.status(503).body("maintenance");
            })
            .await;

        let err = source(&server)
            .fetch_status(&ServerRef::new("42", "v2201"))
            .await
            .unwrap_err();
        assert_eq!(
            err.class(),
            throttlewatch_core::ErrorClass::TransientNetworkFailure
        );
    }

    #[test]
    fn test_factory_creation() {
        let factory = NetcupStatusSourceFactory::new();
        let source = factory.create(&account()).unwrap();
        assert_eq!(source.account_id(), "acct-1");
    }
}
