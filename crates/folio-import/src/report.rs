//! Outcome reporting for a batch run.
//!
//! [`OutcomeReporter`] is shared by every record task: counters are atomics
//! so a progress bar can poll them while the batch runs, and the result list
//! sits behind a lock taken once per record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{ImportResult, RecordError};

/// Final status of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Created,
    Updated,
    Skipped,
    Failed,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Created => write!(f, "created"),
            RecordStatus::Updated => write!(f, "updated"),
            RecordStatus::Skipped => write!(f, "skipped"),
            RecordStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of reconciling one input record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    /// Line of the record in the input file.
    pub line: usize,
    /// Match key value, when the record got far enough to have one.
    pub key: Option<String>,
    pub status: RecordStatus,
    /// Id of the remote record written or matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// Failure detail or skip reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error class for failed records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl ReconciliationResult {
    #[must_use]
    pub fn created(line: usize, key: impl Into<String>, remote_id: Option<String>) -> Self {
        Self::new(line, Some(key.into()), RecordStatus::Created, remote_id, None)
    }

    #[must_use]
    pub fn updated(line: usize, key: impl Into<String>, remote_id: Option<String>) -> Self {
        Self::new(line, Some(key.into()), RecordStatus::Updated, remote_id, None)
    }

    #[must_use]
    pub fn skipped(line: usize, key: Option<String>, reason: impl Into<String>) -> Self {
        Self::new(line, key, RecordStatus::Skipped, None, Some(reason.into()))
    }

    #[must_use]
    pub fn failed(line: usize, key: Option<String>, error: &RecordError) -> Self {
        let mut result = Self::new(
            line,
            key,
            RecordStatus::Failed,
            None,
            Some(error.to_string()),
        );
        result.error_kind = Some(error.kind().to_string());
        result
    }

    #[must_use]
    pub fn with_remote_id(mut self, remote_id: Option<String>) -> Self {
        self.remote_id = remote_id;
        self
    }

    fn new(
        line: usize,
        key: Option<String>,
        status: RecordStatus,
        remote_id: Option<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            line,
            key,
            status,
            remote_id,
            message,
            error_kind: None,
        }
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Thread-safe accumulator for one batch run.
pub struct OutcomeReporter {
    /// Human label for the resource, e.g. "Users".
    label: String,
    total: AtomicUsize,
    created: AtomicUsize,
    updated: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    results: RwLock<Vec<ReconciliationResult>>,
    started_at: DateTime<Utc>,
}

impl OutcomeReporter {
    pub fn new(label: impl Into<String>, total: usize) -> Self {
        Self {
            label: label.into(),
            total: AtomicUsize::new(total),
            created: AtomicUsize::new(0),
            updated: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            results: RwLock::new(Vec::with_capacity(total)),
            started_at: Utc::now(),
        }
    }

    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
    }

    /// Record one finished record and emit its log line.
    pub fn record(&self, result: ReconciliationResult) {
        let counter = match result.status {
            RecordStatus::Created => &self.created,
            RecordStatus::Updated => &self.updated,
            RecordStatus::Skipped => &self.skipped,
            RecordStatus::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);

        let key = result.key.as_deref().unwrap_or("-");
        match result.status {
            RecordStatus::Failed => warn!(
                line = result.line,
                key,
                error = result.message.as_deref().unwrap_or(""),
                "Record failed"
            ),
            RecordStatus::Skipped => info!(
                line = result.line,
                key,
                reason = result.message.as_deref().unwrap_or(""),
                "Record skipped"
            ),
            status => info!(
                line = result.line,
                key,
                remote_id = result.remote_id.as_deref().unwrap_or(""),
                "Record {status}"
            ),
        }

        if let Ok(mut results) = self.results.write() {
            results.push(result);
        }
    }

    #[must_use]
    pub fn progress(&self) -> Progress {
        let created = self.created.load(Ordering::SeqCst);
        let updated = self.updated.load(Ordering::SeqCst);
        let skipped = self.skipped.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        Progress {
            total: self.total.load(Ordering::SeqCst),
            processed: created + updated + skipped + failed,
            created,
            updated,
            skipped,
            failed,
        }
    }

    /// Running totals in the operator-facing form used between chunks.
    #[must_use]
    pub fn progress_line(&self) -> String {
        let p = self.progress();
        format!(
            "{label} created: {} - {label} updated: {} - {label} failed: {}",
            p.created,
            p.updated,
            p.failed,
            label = self.label
        )
    }

    pub fn log_progress(&self) {
        let p = self.progress();
        info!(processed = p.processed, total = p.total, "{}", self.progress_line());
    }

    /// Freeze the run into a report. Results are ordered by input line.
    #[must_use]
    pub fn finish(&self, cancelled: bool, not_started: usize, elapsed: Duration) -> BatchReport {
        let p = self.progress();
        let mut results = self
            .results
            .read()
            .map(|r| r.clone())
            .unwrap_or_default();
        results.sort_by_key(|r| r.line);

        BatchReport {
            label: self.label.clone(),
            total: p.total,
            created: p.created,
            updated: p.updated,
            skipped: p.skipped,
            failed: p.failed,
            not_started,
            cancelled,
            started_at: self.started_at,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            results,
        }
    }
}

/// Aggregate outcome of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub label: String,
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Records never dispatched because the batch was cancelled.
    pub not_started: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub results: Vec<ReconciliationResult>,
}

impl BatchReport {
    /// Records that produced a result.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.created + self.updated + self.skipped + self.failed
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.created + self.updated
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReconciliationResult> {
        self.results
            .iter()
            .filter(|r| r.status == RecordStatus::Failed)
    }

    /// One row per record: `line,key,status,remote_id,message`.
    pub fn write_results_csv<W: Write>(&self, writer: W) -> ImportResult<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(["line", "key", "status", "remote_id", "message"])?;
        for r in &self.results {
            csv.write_record([
                r.line.to_string().as_str(),
                r.key.as_deref().unwrap_or(""),
                r.status.to_string().as_str(),
                r.remote_id.as_deref().unwrap_or(""),
                r.message.as_deref().unwrap_or(""),
            ])?;
        }
        csv.flush()?;
        Ok(())
    }

    /// One line per failed record.
    pub fn write_error_log<W: Write>(&self, mut writer: W) -> ImportResult<()> {
        for r in self.failures() {
            writeln!(
                writer,
                "line {}: {} [{}] {}",
                r.line,
                r.key.as_deref().unwrap_or("-"),
                r.error_kind.as_deref().unwrap_or("error"),
                r.message.as_deref().unwrap_or("")
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Counts without the per-record list.
    #[must_use]
    pub fn summary_json(&self) -> serde_json::Value {
        serde_json::json!({
            "label": self.label,
            "total": self.total,
            "created": self.created,
            "updated": self.updated,
            "skipped": self.skipped,
            "failed": self.failed,
            "not_started": self.not_started,
            "cancelled": self.cancelled,
            "started_at": self.started_at,
            "duration_ms": self.duration_ms,
        })
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} created, {} updated, {} skipped, {} failed of {}",
            self.label, self.created, self.updated, self.skipped, self.failed, self.total
        )?;
        if self.cancelled {
            write!(f, " (cancelled, {} not started)", self.not_started)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> BatchReport {
        let reporter = OutcomeReporter::new("Users", 4);
        reporter.record(ReconciliationResult::updated(3, "u2", Some("id-2".into())));
        reporter.record(ReconciliationResult::created(2, "u1", Some("id-1".into())));
        reporter.record(ReconciliationResult::failed(
            4,
            None,
            &RecordError::Validation("missing required field 'username'".into()),
        ));
        reporter.record(ReconciliationResult::skipped(
            5,
            Some("u4".into()),
            "cancelled before write",
        ));
        reporter.finish(false, 0, Duration::from_millis(42))
    }

    #[test]
    fn test_counters_and_ordering() {
        let report = sample_report();
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.processed(), 4);
        assert_eq!(report.succeeded(), 2);
        assert!(report.has_failures());
        let lines: Vec<usize> = report.results.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_progress_line() {
        let reporter = OutcomeReporter::new("Users", 3);
        reporter.record(ReconciliationResult::created(2, "a", None));
        reporter.record(ReconciliationResult::created(3, "b", None));
        reporter.record(ReconciliationResult::updated(4, "c", None));
        assert_eq!(
            reporter.progress_line(),
            "Users created: 2 - Users updated: 1 - Users failed: 0"
        );
        assert_eq!(reporter.progress().processed, 3);
    }

    #[test]
    fn test_results_csv() {
        let mut out = Vec::new();
        sample_report().write_results_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "line,key,status,remote_id,message");
        assert_eq!(lines[1], "2,u1,created,id-1,");
        assert_eq!(
            lines[3],
            "4,,failed,,validation failed: missing required field 'username'"
        );
    }

    #[test]
    fn test_error_log_lists_failures_only() {
        let mut out = Vec::new();
        sample_report().write_error_log(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("line 4: - [validation]"));
    }

    #[test]
    fn test_summary_and_display() {
        let report = sample_report();
        let summary = report.summary_json();
        assert_eq!(summary["created"], 1);
        assert_eq!(summary["cancelled"], false);
        assert!(summary.get("results").is_none());
        assert_eq!(
            report.to_string(),
            "Users: 1 created, 1 updated, 1 skipped, 1 failed of 4"
        );
    }
}
