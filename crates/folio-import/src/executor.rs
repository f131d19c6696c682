//! Bounded concurrency executor.
//!
//! Runs one task per input record with at most `concurrency` in flight,
//! chunk by chunk. Cancellation is cooperative: tasks already running
//! finish, nothing new is dispatched.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use folio_client::FolioClientError;

use crate::error::RecordError;
use crate::normalize::InputRow;
use crate::report::{BatchReport, OutcomeReporter, ReconciliationResult};

/// Default number of records in flight.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default number of records per chunk.
pub const DEFAULT_BATCH_SIZE: usize = 250;

/// Executor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Maximum records processed at the same time.
    pub concurrency: usize,
    /// Records per chunk; a chunk drains before the next one starts.
    pub batch_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Shared cancel request, settable from a signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing flag (e.g. the one a Ctrl+C handler sets).
    #[must_use]
    pub fn from_arc(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The underlying flag.
    #[must_use]
    pub fn handle(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

#[derive(Debug, Default)]
struct GateState {
    strikes: u32,
    pause_until: Option<Instant>,
}

/// Slows dispatch down when Okapi pushes back with 429 or 503.
///
/// Each trip doubles the pause (capped). A successful call takes one strike
/// off, so the pause keeps growing while some requests are still being
/// throttled. An active pause always runs out on its own.
#[derive(Debug)]
pub struct BackpressureGate {
    state: Mutex<GateState>,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for BackpressureGate {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

impl BackpressureGate {
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            base_delay,
            max_delay,
        }
    }

    /// Trip the gate if `error` is a backpressure signal.
    pub fn observe(&self, error: &FolioClientError) {
        if !error.is_backpressure() {
            return;
        }
        let retry_after = match error {
            FolioClientError::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        };
        self.trip(retry_after);
    }

    /// Pause new dispatches for `retry_after`, or for an exponentially
    /// growing delay when the server gave none.
    pub fn trip(&self, retry_after: Option<Duration>) {
        if let Ok(mut state) = self.state.lock() {
            state.strikes = state.strikes.saturating_add(1);
            let exp = state.strikes.saturating_sub(1).min(16);
            let delay = retry_after
                .unwrap_or_else(|| self.base_delay.saturating_mul(1 << exp))
                .min(self.max_delay);
            let until = Instant::now() + delay;
            state.pause_until = Some(state.pause_until.map_or(until, |current| current.max(until)));
            warn!(
                strikes = state.strikes,
                pause_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Remote is pushing back, pausing dispatch"
            );
        }
    }

    /// Note a successful call.
    pub fn record_success(&self) {
        if let Ok(mut state) = self.state.lock() {
            if state.strikes > 0 {
                state.strikes -= 1;
                if state.strikes == 0 {
                    debug!("Backpressure eased");
                }
            }
        }
    }

    #[cfg(test)]
    fn strikes(&self) -> u32 {
        self.state.lock().map_or(0, |s| s.strikes)
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused_until().is_some()
    }

    fn paused_until(&self) -> Option<Instant> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.pause_until)
            .filter(|until| *until > Instant::now())
    }

    /// Wait until the gate is open.
    pub async fn wait(&self) {
        while let Some(until) = self.paused_until() {
            tokio::time::sleep_until(until).await;
        }
    }
}

/// Runs a per-record async function over a batch.
pub struct BatchExecutor {
    config: ExecutorConfig,
    cancel: CancelFlag,
    gate: Arc<BackpressureGate>,
}

impl BatchExecutor {
    #[must_use]
    pub fn new(config: ExecutorConfig, cancel: CancelFlag, gate: Arc<BackpressureGate>) -> Self {
        Self {
            config,
            cancel,
            gate,
        }
    }

    #[must_use]
    pub fn config(&self) -> ExecutorConfig {
        self.config
    }

    /// Process every row with `per_record` and return the finished report.
    ///
    /// Results are recorded into `reporter` as they complete, so callers may
    /// poll it for progress while this runs. Each row yields exactly one
    /// result, unless the batch is cancelled before the row is dispatched.
    pub async fn run<F, Fut>(
        &self,
        rows: Vec<InputRow>,
        reporter: Arc<OutcomeReporter>,
        per_record: F,
    ) -> BatchReport
    where
        F: Fn(InputRow) -> Fut,
        Fut: Future<Output = ReconciliationResult> + Send + 'static,
    {
        let started = std::time::Instant::now();
        let total = rows.len();
        reporter.set_total(total);

        let concurrency = self.config.concurrency.max(1);
        let batch_size = self.config.batch_size.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut not_started = 0usize;
        let mut pending = rows.into_iter();

        info!(total, concurrency, batch_size, "Starting batch");

        loop {
            let chunk: Vec<InputRow> = pending.by_ref().take(batch_size).collect();
            if chunk.is_empty() {
                break;
            }

            let mut tasks = JoinSet::new();
            let mut chunk = chunk.into_iter();
            while let Some(row) = chunk.next() {
                if self.cancel.is_cancelled() {
                    not_started += 1 + chunk.len();
                    break;
                }

                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    not_started += 1 + chunk.len();
                    break;
                };
                // A record that just finished may have tripped the gate.
                self.gate.wait().await;
                // Either wait may have outlasted a cancel request.
                if self.cancel.is_cancelled() {
                    drop(permit);
                    not_started += 1 + chunk.len();
                    break;
                }

                // Built here, in input order, so per-record setup runs in
                // dispatch order.
                let line = row.line;
                let record_future = per_record(row);
                let reporter = reporter.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    let result = AssertUnwindSafe(record_future)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            ReconciliationResult::failed(
                                line,
                                None,
                                &RecordError::Fatal("record task panicked".to_string()),
                            )
                        });
                    reporter.record(result);
                });
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Record task failed to complete");
                }
            }
            reporter.log_progress();

            if self.cancel.is_cancelled() {
                not_started += pending.len();
                break;
            }
        }

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            warn!(not_started, "Batch cancelled");
        }
        reporter.finish(cancelled, not_started, started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RecordStatus;
    use std::sync::atomic::AtomicUsize;

    fn rows(n: usize) -> Vec<InputRow> {
        (0..n).map(|i| InputRow::new(i + 2)).collect()
    }

    #[tokio::test]
    async fn test_every_row_gets_one_result() {
        let executor = BatchExecutor::new(
            ExecutorConfig {
                concurrency: 4,
                batch_size: 7,
            },
            CancelFlag::new(),
            Arc::new(BackpressureGate::default()),
        );
        let reporter = Arc::new(OutcomeReporter::new("Users", 0));

        let report = executor
            .run(rows(20), reporter, |row| async move {
                if row.line % 5 == 0 {
                    ReconciliationResult::failed(
                        row.line,
                        None,
                        &RecordError::Validation("bad".into()),
                    )
                } else {
                    ReconciliationResult::created(row.line, row.line.to_string(), None)
                }
            })
            .await;

        assert_eq!(report.total, 20);
        assert_eq!(report.results.len(), 20);
        assert_eq!(report.failed, 4);
        assert_eq!(report.created, 16);
        assert!(!report.cancelled);
        assert_eq!(report.not_started, 0);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let executor = BatchExecutor::new(
            ExecutorConfig {
                concurrency: 3,
                batch_size: 100,
            },
            CancelFlag::new(),
            Arc::new(BackpressureGate::default()),
        );

        let (in_flight_c, peak_c) = (in_flight.clone(), peak.clone());
        let report = executor
            .run(rows(30), Arc::new(OutcomeReporter::new("Users", 0)), move |row| {
                let in_flight = in_flight_c.clone();
                let peak = peak_c.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    ReconciliationResult::updated(row.line, "k", None)
                }
            })
            .await;

        assert_eq!(report.updated, 30);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_cancel_before_start_dispatches_nothing() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let executor = BatchExecutor::new(
            ExecutorConfig::default(),
            cancel,
            Arc::new(BackpressureGate::default()),
        );
        let report = executor
            .run(rows(5), Arc::new(OutcomeReporter::new("Users", 0)), |row| async move {
                ReconciliationResult::created(row.line, "k", None)
            })
            .await;

        assert!(report.cancelled);
        assert_eq!(report.not_started, 5);
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_task_becomes_failed_result() {
        let executor = BatchExecutor::new(
            ExecutorConfig::default(),
            CancelFlag::new(),
            Arc::new(BackpressureGate::default()),
        );
        let report = executor
            .run(rows(2), Arc::new(OutcomeReporter::new("Users", 0)), |row| async move {
                assert!(row.line != 3, "boom");
                ReconciliationResult::created(row.line, "k", None)
            })
            .await;

        assert_eq!(report.results.len(), 2);
        let panicked = report.results.iter().find(|r| r.line == 3).unwrap();
        assert_eq!(panicked.status, RecordStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_pauses_and_expires() {
        let gate = BackpressureGate::new(Duration::from_millis(100), Duration::from_secs(1));
        gate.observe(&FolioClientError::Http {
            status: 503,
            detail: String::new(),
        });
        assert!(gate.is_paused());

        let before = Instant::now();
        gate.wait().await;
        assert!(before.elapsed() >= Duration::from_millis(100));
        assert!(!gate.is_paused());

        gate.observe(&FolioClientError::RateLimited {
            retry_after_secs: Some(5),
        });
        assert!(gate.is_paused());
        gate.record_success();
        assert!(gate.is_paused());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!gate.is_paused());

        gate.observe(&FolioClientError::Http {
            status: 500,
            detail: String::new(),
        });
        assert!(!gate.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_decays_strikes_instead_of_clearing() {
        let gate = BackpressureGate::new(Duration::from_millis(100), Duration::from_secs(10));
        gate.trip(None);
        gate.trip(None);
        gate.record_success();
        assert_eq!(gate.strikes(), 1);

        gate.wait().await;
        let before = Instant::now();
        gate.trip(None);
        gate.wait().await;
        assert!(before.elapsed() >= Duration::from_millis(200));
        assert_eq!(gate.strikes(), 2);

        gate.record_success();
        gate.record_success();
        gate.record_success();
        assert_eq!(gate.strikes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_record_delays_next_dispatch() {
        let gate = Arc::new(BackpressureGate::new(
            Duration::from_millis(250),
            Duration::from_secs(5),
        ));
        let executor = BatchExecutor::new(
            ExecutorConfig {
                concurrency: 1,
                batch_size: 10,
            },
            CancelFlag::new(),
            gate.clone(),
        );
        let origin = Instant::now();
        let started = Arc::new(Mutex::new(Vec::new()));

        let started_c = started.clone();
        let report = executor
            .run(rows(2), Arc::new(OutcomeReporter::new("Users", 0)), move |row| {
                let gate = gate.clone();
                let started = started_c.clone();
                async move {
                    started.lock().unwrap().push((row.line, origin.elapsed()));
                    if row.line == 2 {
                        gate.observe(&FolioClientError::RateLimited {
                            retry_after_secs: None,
                        });
                    }
                    ReconciliationResult::created(row.line, "k", None)
                }
            })
            .await;

        assert_eq!(report.created, 2);
        let started = started.lock().unwrap();
        let (_, second) = started.iter().find(|(line, _)| *line == 3).copied().unwrap();
        assert!(second >= Duration::from_millis(250));
    }
}
