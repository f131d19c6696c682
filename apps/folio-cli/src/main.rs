//! folio-migrate - Bulk user import for FOLIO tenants
//!
//! This CLI lets library staff:
//! - Create or update patron records from CSV or JSONL exports
//! - Sync departments and patron groups the same way
//! - Keep locally edited fields untouched on re-import
//! - Save connection settings for repeated runs

use clap::{Parser, Subcommand};
use folio_cli::commands::{self, GlobalArgs};
use folio_cli::error::CliResult;
use folio_cli::logging::init_logging;

/// folio-migrate - FOLIO bulk import
#[derive(Parser)]
#[command(name = "folio-migrate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    globals: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update users from a CSV or JSONL file
    ImportUsers(commands::import_users::ImportArgs),

    /// Create or update any supported record type from a file
    Sync(commands::sync::SyncArgs),

    /// Show or change saved settings
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() {
    // A missing .env is fine; real environment variables still win.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let result = run(cli).await;

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    init_logging(cli.globals.verbose, cli.globals.log_file.as_deref())?;

    match cli.command {
        Commands::ImportUsers(args) => commands::import_users::execute(args, &cli.globals).await,
        Commands::Sync(args) => commands::sync::execute(args, &cli.globals).await,
        Commands::Config(args) => commands::config::execute(args, &cli.globals).await,
    }
}
