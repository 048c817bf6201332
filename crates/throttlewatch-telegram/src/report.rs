//! Run report formatting

use chrono::{DateTime, Utc};
use std::fmt::Write;
use throttlewatch_core::availability::format_timestamp;
use throttlewatch_core::engine::messages::escape_html;
use throttlewatch_vertex::RunInfo;

/// Trackers listed in a report
pub const TOP_TRACKERS: usize = 10;

const BYTES_PER_TIB: f64 = 1_099_511_627_776.0;

/// Convert a byte count to TiB
pub fn bytes_to_tib(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_TIB
}

/// Share ratio with three decimals, `∞` when nothing was downloaded
pub fn format_ratio(uploaded: u64, downloaded: u64) -> String {
    if downloaded == 0 {
        return "∞".to_string();
    }
    format!("{:.3}", uploaded as f64 / downloaded as f64)
}

/// Format the hourly run report
pub fn format_run_report(info: &RunInfo, now: DateTime<Utc>) -> String {
    let mut text = format!(
        "<b>📊 Vertex daily report</b>\n\n\
         <b>📈 Today's traffic</b>\n\
         • Upload: <code>{:.3} TiB</code>\n\
         • Download: <code>{:.3} TiB</code>\n\
         • Ratio: <code>{}</code>\n\n\
         <b>📦 Today's tasks</b>\n\
         • Added: <code>{}</code>\n\
         • Rejected: <code>{}</code>\n\
         • Deleted: <code>{}</code>\n\n\
         <b>💾 Total traffic</b>\n\
         • Upload: <code>{:.3} TiB</code>\n\
         • Download: <code>{:.3} TiB</code>\n\
         • Ratio: <code>{}</code>\n",
        bytes_to_tib(info.uploaded_today),
        bytes_to_tib(info.downloaded_today),
        format_ratio(info.uploaded_today, info.downloaded_today),
        info.add_count_today,
        info.reject_count_today,
        info.delete_count_today,
        bytes_to_tib(info.uploaded),
        bytes_to_tib(info.downloaded),
        format_ratio(info.uploaded, info.downloaded),
    );

    let trackers = info.top_trackers(TOP_TRACKERS);
    if !trackers.is_empty() {
        text.push_str("\n<b>🎯 Top trackers today (by upload)</b>\n");
        for (idx, tracker) in trackers.iter().enumerate() {
            // Writing to a String cannot fail
            let _ = write!(
                text,
                "\n<b>{}. {}</b>\n   ↑ <code>{:.3} TiB</code> | ↓ <code>{:.3} TiB</code> | ratio <code>{}</code>\n",
                idx + 1,
                escape_html(&tracker.tracker),
                bytes_to_tib(tracker.uploaded),
                bytes_to_tib(tracker.downloaded),
                format_ratio(tracker.uploaded, tracker.downloaded),
            );
        }
    }

    let _ = write!(text, "\n<i>⏰ {}</i>", format_timestamp(now));
    text
}

/// Message sent when the run info could not be fetched
pub fn failure_notice(error: &str, now: DateTime<Utc>) -> String {
    format!(
        "<b>❌ Vertex report failed</b>\n\n\
         • Error: <code>{}</code>\n\
         • Time: <code>{}</code>",
        escape_html(error),
        format_timestamp(now),
    )
}
