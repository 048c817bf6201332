//! Vertex run statistics (`/api/setting/getRunInfo`)

use serde::{Deserialize, Serialize};

/// Response envelope of the Vertex API
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

/// Upload/download statistics of the Vertex instance
///
/// Byte counts; absent fields read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunInfo {
    pub uploaded_today: u64,
    pub downloaded_today: u64,
    pub uploaded: u64,
    pub downloaded: u64,
    pub add_count_today: u64,
    pub reject_count_today: u64,
    pub delete_count_today: u64,
    pub per_tracker_today: Vec<TrackerStats>,
}

/// Today's traffic of one tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerStats {
    pub tracker: String,
    pub uploaded: u64,
    pub downloaded: u64,
}

impl Default for TrackerStats {
    fn default() -> Self {
        Self {
            tracker: "Unknown".to_string(),
            uploaded: 0,
            downloaded: 0,
        }
    }
}

impl RunInfo {
    /// Trackers ordered by today's upload, largest first
    pub fn top_trackers(&self, limit: usize) -> Vec<&TrackerStats> {
        let mut trackers: Vec<&TrackerStats> = self.per_tracker_today.iter().collect();
        trackers.sort_by(|a, b| b.uploaded.cmp(&a.uploaded));
        trackers.truncate(limit);
        trackers
    }
}
