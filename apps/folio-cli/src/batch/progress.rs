//! Progress reporting for import runs
//!
//! Polls the shared [`OutcomeReporter`] and mirrors its counters on an
//! indicatif progress bar.

use folio_import::OutcomeReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Progress indicator for a running import
pub struct BatchProgress {
    bar: ProgressBar,
    poller: JoinHandle<()>,
}

impl BatchProgress {
    /// Start polling `reporter`. Must be called inside a tokio runtime.
    pub fn start(reporter: Arc<OutcomeReporter>, total: u64) -> Self {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("█▓▒░"));
        }
        bar.enable_steady_tick(Duration::from_millis(100));

        let polled = bar.clone();
        let poller = tokio::spawn(async move {
            loop {
                Self::refresh(&polled, &reporter);
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        });

        Self { bar, poller }
    }

    fn refresh(bar: &ProgressBar, reporter: &OutcomeReporter) {
        let progress = reporter.progress();
        bar.set_position(progress.processed as u64);
        bar.set_message(reporter.progress_line());
    }

    /// Current bar position.
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Stop polling and clear the bar
    pub fn finish_and_clear(self) {
        self.poller.abort();
        self.bar.finish_and_clear();
    }
}
