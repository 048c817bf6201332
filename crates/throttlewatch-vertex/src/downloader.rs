//! Vertex downloader records

use serde_json::{Map, Value};

/// One downloader as listed by Vertex
///
/// The full JSON object is kept so a modify request sends back every field
/// Vertex knows about, not only the ones this crate reads.
#[derive(Clone, PartialEq)]
pub struct Downloader {
    /// Vertex id
    pub id: String,
    /// Display alias
    pub alias: String,
    /// Whether Vertex currently schedules this downloader
    pub enabled: bool,
    /// qBittorrent WebUI URL
    pub client_url: String,
    /// WebUI user
    pub username: Option<String>,
    /// WebUI password
    /// ⚠️ NEVER log this value
    pub password: Option<String>,
    raw: Map<String, Value>,
}

impl Downloader {
    /// Parse one entry of `/api/downloader/list`
    ///
    /// Returns `None` for entries without an id or client URL.
    pub fn from_json(value: &Value) -> Option<Self> {
        let raw = value.as_object()?.clone();

        let id = match raw.get("id")? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let client_url = raw.get("clientUrl")?.as_str()?.to_string();

        let text = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            alias: text("alias").unwrap_or_else(|| id.clone()),
            enabled: raw.get("enable").and_then(Value::as_bool).unwrap_or(false),
            username: text("username"),
            password: text("password"),
            id,
            client_url,
            raw,
        })
    }

    /// Host of the client URL
    pub fn host(&self) -> Option<String> {
        client_host(&self.client_url)
    }

    /// Whether this downloader runs on the given resource
    pub fn serves(&self, resource_id: &str) -> bool {
        self.host().is_some_and(|host| host == resource_id)
    }

    /// WebUI credentials, if both are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.username.as_deref()?, self.password.as_deref()?))
    }

    /// Body of a modify request that sets the enable flag
    pub fn modify_body(&self, enable: bool) -> Value {
        let mut body = self.raw.clone();
        body.insert("enable".to_string(), Value::Bool(enable));
        Value::Object(body)
    }
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .field("enabled", &self.enabled)
            .field("client_url", &self.client_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

/// Host part of a client URL, brackets stripped for IPv6
pub fn client_host(client_url: &str) -> Option<String> {
    let url = reqwest::Url::parse(client_url).ok()?;
    let host = url.host_str()?;
    Some(host.trim_start_matches('[').trim_end_matches(']').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn downloader() -> Downloader {
        Downloader::from_json(&json!({
            "id": "a1b2",
            "alias": "box-1",
            "enable": true,
            "clientUrl": "http://203.0.113.7:8080/",
            "username": "admin",
            "password": "hunter2",
            "maxUploadSpeed": "100MiB"
        }))
        .unwrap()
    }

    #[test]
    fn matches_on_client_host() {
        let d = downloader();
        assert!(d.serves("203.0.113.7"));
        assert!(!d.serves("203.0.113.70"));
        assert_eq!(d.credentials(), Some(("admin", "hunter2")));
    }

    #[test]
    fn modify_body_keeps_unknown_fields() {
        let body = downloader().modify_body(false);
        assert_eq!(body["enable"], false);
        assert_eq!(body["maxUploadSpeed"], "100MiB");
        assert_eq!(body["id"], "a1b2");
    }

    #[test]
    fn entries_without_url_are_rejected() {
        assert!(Downloader::from_json(&json!({ "id": "x" })).is_none());
        assert!(Downloader::from_json(&json!({ "clientUrl": "http://h" })).is_none());
    }

    #[test]
    fn password_not_exposed_in_debug() {
        let debug = format!("{:?}", downloader());
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn host_parsing() {
        assert_eq!(client_host("https://seed.example.com:443/qb"), Some("seed.example.com".to_string()));
        assert_eq!(client_host("http://[2001:db8::1]:8080"), Some("2001:db8::1".to_string()));
        assert_eq!(client_host("not a url"), None);
    }
}
