//! Hourly Vertex run report

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use throttlewatch_telegram::{TelegramNotifier, failure_notice, format_run_report};
use throttlewatch_vertex::VertexAutomation;
use tokio::sync::watch;
use tracing::{error, info};

/// Fetches run statistics from Vertex and posts them to Telegram
#[derive(Debug, Clone)]
pub struct Reporter {
    vertex: Arc<VertexAutomation>,
    telegram: Arc<TelegramNotifier>,
}

impl Reporter {
    pub fn new(vertex: Arc<VertexAutomation>, telegram: Arc<TelegramNotifier>) -> Self {
        Self { vertex, telegram }
    }

    /// Send one report
    ///
    /// When the statistics cannot be fetched a failure notice is sent
    /// instead and the fetch error is returned.
    pub async fn send(&self) -> Result<()> {
        let now = Utc::now();
        match self.vertex.fetch_run_info().await {
            Ok(info) => self
                .telegram
                .send_message(&format_run_report(&info, now))
                .await
                .context("Failed to send run report"),
            Err(e) => {
                let notice = failure_notice(&e.to_string(), now);
                if let Err(send_err) = self.telegram.send_message(&notice).await {
                    error!("Failed to send report failure notice: {}", send_err);
                }
                Err(anyhow::Error::new(e).context("Failed to fetch Vertex run info"))
            }
        }
    }
}

/// Time until the next occurrence of `minute` past the hour
///
/// An occurrence exactly at `now` is skipped so a report never fires twice.
pub fn next_report_delay<Tz: TimeZone>(now: &DateTime<Tz>, minute: u32) -> Duration {
    let into_hour = u64::from(now.minute() * 60 + now.second());
    let target = u64::from(minute.min(59) * 60);

    let secs = if target > into_hour {
        target - into_hour
    } else {
        3600 - into_hour + target
    };

    let nanos = u64::from(now.nanosecond() % 1_000_000_000);
    Duration::from_secs(secs).saturating_sub(Duration::from_nanos(nanos))
}

/// Send a report every hour at `minute` until shutdown
pub async fn run_hourly(reporter: Reporter, minute: u32, mut shutdown: watch::Receiver<bool>) {
    info!("Hourly Vertex report scheduled at minute {}", minute);

    loop {
        let delay = next_report_delay(&Local::now(), minute);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }

        info!("Sending hourly Vertex report");
        if let Err(e) = reporter.send().await {
            error!("Hourly report failed: {:#}", e);
        }
    }

    info!("Hourly report stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, minute, second).unwrap()
    }

    #[test]
    fn delay_until_later_minute_in_same_hour() {
        assert_eq!(next_report_delay(&at(50, 0), 57), Duration::from_secs(7 * 60));
        assert_eq!(next_report_delay(&at(56, 30), 57), Duration::from_secs(30));
    }

    #[test]
    fn delay_wraps_into_next_hour() {
        assert_eq!(next_report_delay(&at(58, 0), 57), Duration::from_secs(59 * 60));
        assert_eq!(next_report_delay(&at(0, 0), 0), Duration::from_secs(3600));
    }

    #[test]
    fn exact_minute_waits_a_full_hour() {
        assert_eq!(next_report_delay(&at(57, 0), 57), Duration::from_secs(3600));
    }

    #[test]
    fn sub_second_offset_is_subtracted() {
        let now = at(56, 59) + chrono::Duration::milliseconds(250);
        assert_eq!(next_report_delay(&now, 57), Duration::from_millis(750));
    }
}
