//! Import runs: read the file, check the tenant, reconcile, report.

pub mod progress;

use folio_client::{OkapiAuth, OkapiClient};
use folio_import::{
    read_rows, BatchReport, CancelFlag, CsvDelimiter, ImportConfig, ImportJob, InputFormat,
    MatchKey, ProtectionSet, ResourceProfile,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::batch::progress::BatchProgress;
use crate::config::{Config, Connection};
use crate::error::{CliError, CliResult};

/// Failures listed in the human summary before eliding the rest.
const MAX_LISTED_FAILURES: usize = 10;

/// What to import and how, independent of where the values came from.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub file: PathBuf,
    pub format: Option<InputFormat>,
    /// Defaults to tab for `.tsv` files and comma otherwise.
    pub delimiter: Option<CsvDelimiter>,
    pub match_key: Option<MatchKey>,
    pub protect: Vec<String>,
    pub no_default_protection: bool,
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub results: Option<PathBuf>,
    pub error_log: Option<PathBuf>,
    pub json: bool,
    pub no_resolve_references: bool,
    pub allow_failures: bool,
    /// Draw a progress bar while the batch runs.
    pub show_progress: bool,
}

impl RunOptions {
    /// The engine configuration: profile defaults, then config file values,
    /// then these options.
    pub fn import_config(&self, profile: &ResourceProfile, config: &Config) -> ImportConfig {
        let mut protection = if self.no_default_protection {
            ProtectionSet::default()
        } else {
            ProtectionSet::new(&profile.default_protection)
        };
        protection.extend(&self.protect);

        let defaults = ImportConfig::for_profile(profile);
        ImportConfig {
            match_key: self.match_key.clone().unwrap_or(defaults.match_key),
            protection,
            concurrency: self.concurrency.unwrap_or(config.concurrency),
            batch_size: self.batch_size.unwrap_or(config.batch_size),
            retry: config.retry_policy(),
            resolve_references: defaults.resolve_references && !self.no_resolve_references,
        }
    }
}

/// Run one import and return its report. Output files are written before
/// returning.
pub async fn run_import(
    profile: ResourceProfile,
    options: &RunOptions,
    config: &Config,
    cancel: CancelFlag,
) -> CliResult<BatchReport> {
    let connection = config.connection()?;
    let import_config = options.import_config(&profile, config);
    import_config.validate()?;

    let format = match options.format {
        Some(format) => format,
        None => InputFormat::from_path(&options.file)?,
    };
    let delimiter = options
        .delimiter
        .unwrap_or_else(|| CsvDelimiter::for_path(&options.file));
    let rows = read_rows(&options.file, format, delimiter)?;
    if rows.is_empty() {
        return Err(CliError::Validation(format!(
            "{} contains no records",
            options.file.display()
        )));
    }
    info!(file = %options.file.display(), %format, records = rows.len(), "Input loaded");

    let client = Arc::new(connect(&connection)?);
    preflight(&client, &profile).await?;

    let total = rows.len();
    let job = ImportJob::new(client, profile, import_config, cancel)?;
    let reporter = job.reporter(total);
    let progress = options
        .show_progress
        .then(|| BatchProgress::start(reporter.clone(), total as u64));

    let report = job.run_with(rows, reporter).await;

    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    write_outputs(&report, options)?;
    Ok(report)
}

fn connect(connection: &Connection) -> CliResult<OkapiClient> {
    let auth = OkapiAuth::new(&connection.tenant, &connection.token)?;
    Ok(OkapiClient::new(
        connection.okapi_url.clone(),
        auth,
        connection.timeout,
    )?)
}

/// One cheap request so that a bad URL or token fails the run up front
/// instead of failing every record.
async fn preflight(client: &OkapiClient, profile: &ResourceProfile) -> CliResult<()> {
    let page = client.list(&profile.collection, None, 1, 0).await?;
    debug!(
        collection = %profile.collection,
        total_records = ?page.total_records,
        tenant = client.tenant(),
        "Preflight succeeded"
    );
    Ok(())
}

fn write_outputs(report: &BatchReport, options: &RunOptions) -> CliResult<()> {
    if let Some(path) = &options.results {
        report.write_results_csv(BufWriter::new(File::create(path)?))?;
        info!(path = %path.display(), "Results written");
    }
    if let Some(path) = &options.error_log {
        report.write_error_log(BufWriter::new(File::create(path)?))?;
        info!(path = %path.display(), failures = report.failed, "Error log written");
    }
    Ok(())
}

/// Print the summary to stdout.
pub fn print_report(report: &BatchReport, json: bool) -> CliResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&report.summary_json())?);
        return Ok(());
    }

    println!();
    println!("{report}");
    println!("Duration: {:.1}s", report.duration_ms as f64 / 1000.0);

    if report.has_failures() {
        println!();
        println!("Failures:");
        for failure in report.failures().take(MAX_LISTED_FAILURES) {
            println!(
                "  line {}: {} {}",
                failure.line,
                failure.key.as_deref().unwrap_or("-"),
                failure.message.as_deref().unwrap_or("")
            );
        }
        if report.failed > MAX_LISTED_FAILURES {
            println!("  ... and {} more", report.failed - MAX_LISTED_FAILURES);
        }
    }
    Ok(())
}

/// Map a finished report to the command result.
pub fn outcome(report: &BatchReport, allow_failures: bool) -> CliResult<()> {
    if report.cancelled {
        return Err(CliError::Cancelled {
            processed: report.processed(),
            total: report.total,
        });
    }
    if report.has_failures() && !allow_failures {
        return Err(CliError::RecordsFailed {
            failed: report.failed,
            total: report.total,
        });
    }
    Ok(())
}

/// What a Ctrl+C should do given how many came before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Stop dispatching and let in-flight records finish.
    Drain,
    /// Already draining: give up and exit.
    Abort,
}

fn on_interrupt(flag: &AtomicBool) -> Interrupt {
    if flag.swap(true, Ordering::SeqCst) {
        Interrupt::Abort
    } else {
        Interrupt::Drain
    }
}

/// Cancel flag set by Ctrl+C. A second Ctrl+C exits with code 130 without
/// waiting. Only the first installed handler is kept.
pub fn install_cancel_handler() -> CancelFlag {
    let cancel = CancelFlag::new();
    let handle = cancel.handle();
    let installed = ctrlc::set_handler(move || match on_interrupt(&handle) {
        Interrupt::Drain => {
            eprintln!("\nCancelling: waiting for in-flight records to finish (Ctrl+C again to exit now)...");
        }
        Interrupt::Abort => {
            eprintln!("\nInterrupted again, exiting without waiting.");
            std::process::exit(130);
        }
    });
    if let Err(e) = installed {
        debug!(error = %e, "Ctrl+C handler not installed");
    }
    cancel
}
