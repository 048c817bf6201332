//! Notification texts
//!
//! Messages use the small HTML subset chat bots render (`<b>`, `<code>`,
//! `<i>`). Everything interpolated from outside is escaped.

use chrono::{DateTime, Utc};

use crate::availability::{format_duration, format_timestamp};
use crate::model::Observation;
use crate::traits::LedgerEntry;

use super::AutomationAction;

/// Message sent when a resource becomes throttled
pub fn throttled(obs: &Observation, entry: &LedgerEntry) -> String {
    format!(
        "<b>🔴 Server throttled</b>\n\n\
         • Server: <code>{}</code>\n\
         • IP: <code>{}</code>\n\
         • Since: <code>{}</code>\n\
         • Throttle count: <code>{}</code>\n\n\
         <i>Downloader paused.</i>",
        escape_html(&obs.display_name),
        escape_html(&obs.resource_id),
        format_timestamp(obs.observed_at),
        entry.throttle_count,
    )
}

/// Message sent when a throttle period closes
pub fn unthrottled(obs: &Observation, duration_seconds: u64, entry: &LedgerEntry) -> String {
    format!(
        "<b>🟢 Throttle lifted</b>\n\n\
         • Server: <code>{}</code>\n\
         • IP: <code>{}</code>\n\
         • Throttled for: <code>{}</code>\n\
         • Total throttled time: <code>{}</code>\n\n\
         <i>Downloader re-enabled.</i>",
        escape_html(&obs.display_name),
        escape_html(&obs.resource_id),
        format_duration(duration_seconds),
        format_duration(entry.total_throttled_seconds),
    )
}

/// Message sent when the downstream automation call failed
pub fn automation_failed(
    action: AutomationAction,
    resource_id: &str,
    error: &str,
    at: DateTime<Utc>,
) -> String {
    format!(
        "<b>⚠️ Downloader {} failed</b>\n\n\
         • IP: <code>{}</code>\n\
         • Error: <code>{}</code>\n\
         • Time: <code>{}</code>",
        action,
        escape_html(resource_id),
        escape_html(error),
        format_timestamp(at),
    )
}

/// Escape the characters that are markup in chat HTML
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrafficCounters;

    fn observation() -> Observation {
        Observation {
            resource_id: "10.0.0.1".to_string(),
            display_name: "web<1>".to_string(),
            account_id: "acct".to_string(),
            server_id: "1".to_string(),
            throttled: false,
            traffic: TrafficCounters::default(),
            operational_status: "RUNNING".to_string(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn unthrottled_message_has_duration_and_total() {
        let obs = observation();
        let mut entry = LedgerEntry::baseline("web", false, obs.observed_at);
        entry.total_throttled_seconds = 4_200;

        let text = unthrottled(&obs, 600, &entry);
        assert!(text.contains("10m 0s"));
        assert!(text.contains("1h 10m 0s"));
        assert!(text.contains("web&lt;1&gt;"));
    }

    #[test]
    fn failure_message_names_action() {
        let text = automation_failed(AutomationAction::Disable, "10.0.0.1", "a & b", Utc::now());
        assert!(text.contains("Downloader disable failed"));
        assert!(text.contains("a &amp; b"));
    }
}
