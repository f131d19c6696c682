//! One import run: a profile, its configuration and the executor wired
//! together.

use folio_client::{RemoteCollection, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::engine::{ReconcileOptions, Reconciler};
use crate::error::{ImportError, ImportResult};
use crate::executor::{
    BackpressureGate, BatchExecutor, CancelFlag, ExecutorConfig, DEFAULT_BATCH_SIZE,
    DEFAULT_CONCURRENCY,
};
use crate::matcher::MatchKey;
use crate::normalize::InputRow;
use crate::profile::ResourceProfile;
use crate::protect::ProtectionSet;
use crate::report::{BatchReport, OutcomeReporter};

/// Upper bound on records in flight; FOLIO modules degrade well before this.
pub const MAX_CONCURRENCY: usize = 64;

/// Configuration of one import run.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub match_key: MatchKey,
    pub protection: ProtectionSet,
    pub concurrency: usize,
    pub batch_size: usize,
    pub retry: RetryPolicy,
    pub resolve_references: bool,
}

impl ImportConfig {
    /// Defaults for `profile`.
    #[must_use]
    pub fn for_profile(profile: &ResourceProfile) -> Self {
        let options = ReconcileOptions::for_profile(profile);
        Self {
            match_key: options.match_key,
            protection: options.protection,
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: options.retry,
            resolve_references: options.resolve_references,
        }
    }

    /// Reject settings the run cannot start with.
    pub fn validate(&self) -> ImportResult<()> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(ImportError::InvalidConfig(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                self.concurrency
            )));
        }
        if self.batch_size == 0 {
            return Err(ImportError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ImportError::InvalidConfig(format!(
                "retry base delay ({} ms) exceeds max delay ({} ms)",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// A validated, ready-to-run import.
pub struct ImportJob {
    reconciler: Arc<Reconciler>,
    executor: BatchExecutor,
}

impl ImportJob {
    pub fn new(
        remote: Arc<dyn RemoteCollection>,
        profile: ResourceProfile,
        config: ImportConfig,
        cancel: CancelFlag,
    ) -> ImportResult<Self> {
        config.validate()?;

        let gate = Arc::new(BackpressureGate::new(
            Duration::from_millis(config.retry.base_delay_ms),
            Duration::from_millis(config.retry.max_delay_ms),
        ));
        let executor = BatchExecutor::new(
            ExecutorConfig {
                concurrency: config.concurrency,
                batch_size: config.batch_size,
            },
            cancel.clone(),
            gate.clone(),
        );

        info!(
            profile = %profile.name,
            match_key = %config.match_key,
            protection = %config.protection,
            resolve_references = config.resolve_references,
            "Import configured"
        );

        let options = ReconcileOptions {
            match_key: config.match_key,
            protection: config.protection,
            retry: config.retry,
            resolve_references: config.resolve_references,
        };
        let reconciler = Arc::new(Reconciler::new(remote, profile, options, gate, cancel));

        Ok(Self {
            reconciler,
            executor,
        })
    }

    #[must_use]
    pub fn profile(&self) -> &ResourceProfile {
        self.reconciler.profile()
    }

    /// A reporter labelled for this job's profile.
    #[must_use]
    pub fn reporter(&self, total: usize) -> Arc<OutcomeReporter> {
        Arc::new(OutcomeReporter::new(self.profile().label.clone(), total))
    }

    /// Run the batch, recording into `reporter` as records complete.
    pub async fn run_with(&self, rows: Vec<InputRow>, reporter: Arc<OutcomeReporter>) -> BatchReport {
        let reconciler = self.reconciler.clone();
        self.executor
            .run(rows, reporter, move |row| {
                let reconciler = reconciler.clone();
                let prepared = reconciler.prepare(row);
                async move { reconciler.reconcile_prepared(prepared).await }
            })
            .await
    }

    pub async fn run(&self, rows: Vec<InputRow>) -> BatchReport {
        let reporter = self.reporter(rows.len());
        self.run_with(rows, reporter).await
    }
}
