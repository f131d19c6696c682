//! Import-users command - Create or update users from a CSV or JSONL file

use crate::batch::{self, RunOptions};
use crate::commands::GlobalArgs;
use crate::config::ConfigPaths;
use crate::error::CliResult;
use clap::Args;
use folio_import::{CsvDelimiter, InputFormat, MatchKey, ResourceProfile};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Arguments for the import-users command
#[derive(Args, Debug, Clone)]
#[command(about = "Create or update users from a CSV or JSONL file")]
pub struct ImportArgs {
    /// Input file
    #[arg(long, short = 'f', value_name = "PATH")]
    pub file: PathBuf,

    /// Input format (default: from the file extension)
    #[arg(long, value_name = "csv|jsonl")]
    pub format: Option<InputFormat>,

    /// CSV delimiter: comma, semicolon, tab or pipe (default: tab for .tsv, else comma)
    #[arg(long)]
    pub delimiter: Option<CsvDelimiter>,

    /// Field used to find existing records (default: externalSystemId)
    #[arg(long, value_name = "KEY")]
    pub match_key: Option<MatchKey>,

    /// Extra fields never overwritten on update
    #[arg(long, value_delimiter = ',', value_name = "FIELDS")]
    pub protect: Vec<String>,

    /// Do not protect the profile's default fields
    #[arg(long)]
    pub no_default_protection: bool,

    /// Records per dispatch batch
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Records reconciled in parallel
    #[arg(long, short = 'c', value_name = "N")]
    pub concurrency: Option<usize>,

    /// Write one CSV row per record to this file
    #[arg(long, value_name = "PATH")]
    pub results: Option<PathBuf>,

    /// Write failed records to this file
    #[arg(long, value_name = "PATH")]
    pub error_log: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Send patron groups, address types and service points as given
    #[arg(long)]
    pub no_resolve_references: bool,

    /// Exit 0 even when some records failed
    #[arg(long)]
    pub allow_failures: bool,
}

impl ImportArgs {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            file: self.file.clone(),
            format: self.format,
            delimiter: self.delimiter,
            match_key: self.match_key.clone(),
            protect: self.protect.clone(),
            no_default_protection: self.no_default_protection,
            batch_size: self.batch_size,
            concurrency: self.concurrency,
            results: self.results.clone(),
            error_log: self.error_log.clone(),
            json: self.json,
            no_resolve_references: self.no_resolve_references,
            allow_failures: self.allow_failures,
            show_progress: !self.json && std::io::stderr().is_terminal(),
        }
    }
}

/// Execute the import-users command
pub async fn execute(args: ImportArgs, globals: &GlobalArgs) -> CliResult<()> {
    run_profile(ResourceProfile::users(), args.run_options(), globals).await
}

/// Shared by import-users and sync.
pub(crate) async fn run_profile(
    profile: ResourceProfile,
    options: RunOptions,
    globals: &GlobalArgs,
) -> CliResult<()> {
    let paths = ConfigPaths::new()?;
    let config = globals.load_config(&paths)?;
    let cancel = batch::install_cancel_handler();

    let report = batch::run_import(profile, &options, &config, cancel).await?;
    batch::print_report(&report, options.json)?;
    batch::outcome(&report, options.allow_failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ImportArgs,
    }

    #[test]
    fn test_parse_full_flag_set() {
        let cli = TestCli::try_parse_from([
            "test",
            "--file",
            "users.tsv",
            "--format",
            "csv",
            "--delimiter",
            "tab",
            "--match-key",
            "barcode",
            "--protect",
            "personal.lastName,departments",
            "--no-default-protection",
            "--concurrency",
            "4",
            "--json",
            "--allow-failures",
        ])
        .unwrap();

        let options = cli.args.run_options();
        assert_eq!(options.format, Some(InputFormat::Csv));
        assert_eq!(options.delimiter, Some(CsvDelimiter::Tab));
        assert_eq!(options.match_key, Some(MatchKey::Barcode));
        assert_eq!(options.protect, vec!["personal.lastName", "departments"]);
        assert_eq!(options.concurrency, Some(4));
        assert!(options.no_default_protection);
        assert!(options.allow_failures);
        assert!(!options.show_progress);
    }

    #[test]
    fn test_delimiter_left_to_file_extension() {
        let cli = TestCli::try_parse_from(["test", "--file", "users.tsv"]).unwrap();
        assert_eq!(cli.args.run_options().delimiter, None);
    }

    #[test]
    fn test_file_is_required_and_format_checked() {
        assert!(TestCli::try_parse_from(["test"]).is_err());
        assert!(TestCli::try_parse_from(["test", "--file", "a.csv", "--format", "xlsx"]).is_err());
    }
}
