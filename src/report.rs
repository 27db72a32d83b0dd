use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// One video that did not complete, and why. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub video_title: String,
    pub reason: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// Accumulates per-video failures across one batch without ever aborting
/// it. Cloned into every per-video flow; all appends are serialized.
#[derive(Clone, Default)]
pub struct FailureReport {
    records: Arc<Mutex<Vec<FailureRecord>>>,
}

impl FailureReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, video_title: impl Into<String>, reason: impl Into<String>) {
        let record = FailureRecord {
            video_title: video_title.into(),
            reason: reason.into(),
            at: chrono::Utc::now(),
        };
        log::warn!(
            "⚠️ [BATCH] {} failed: {}",
            record.video_title,
            record.reason
        );
        let mut records = self.records.lock().await;
        records.push(record);
    }

    pub async fn records(&self) -> Vec<FailureRecord> {
        let records = self.records.lock().await;
        records.clone()
    }

    pub async fn is_empty(&self) -> bool {
        let records = self.records.lock().await;
        records.is_empty()
    }

    /// End-of-batch summary, one line per failed video. `None` when every
    /// video completed — the caller shows nothing in that case.
    pub async fn summary(&self) -> Option<String> {
        let records = self.records.lock().await;
        if records.is_empty() {
            return None;
        }
        let lines: Vec<String> = records
            .iter()
            .map(|r| format!("{} Reason: {}", r.video_title, r.reason))
            .collect();
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_report_has_no_summary() {
        let report = FailureReport::new();
        assert!(report.summary().await.is_none());
        assert!(report.is_empty().await);
    }

    #[tokio::test]
    async fn summary_lists_title_and_reason_per_line() {
        let report = FailureReport::new();
        report.record("First Video", "Network error: timed out").await;
        report.record("Second Video", "no downloadable streams available").await;

        let summary = report.summary().await.unwrap();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "First Video Reason: Network error: timed out");
        assert_eq!(
            lines[1],
            "Second Video Reason: no downloadable streams available"
        );
    }

    #[tokio::test]
    async fn concurrent_records_all_land() {
        let report = FailureReport::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let report = report.clone();
            handles.push(tokio::spawn(async move {
                report.record(format!("video-{}", i), "boom").await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(report.records().await.len(), 16);
    }
}
