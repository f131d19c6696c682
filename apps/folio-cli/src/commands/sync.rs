//! Sync command - Reconcile any supported record type from a file

use crate::commands::import_users::{run_profile, ImportArgs};
use crate::commands::GlobalArgs;
use crate::error::{CliError, CliResult};
use clap::Args;
use folio_import::profile::PROFILE_NAMES;
use folio_import::ResourceProfile;

/// Arguments for the sync command
#[derive(Args, Debug, Clone)]
#[command(about = "Create or update users, departments or patron groups from a file")]
pub struct SyncArgs {
    /// Record type: users, departments or patron-groups
    #[arg(long, short = 'p')]
    pub profile: String,

    #[command(flatten)]
    pub import: ImportArgs,
}

/// Execute the sync command
pub async fn execute(args: SyncArgs, globals: &GlobalArgs) -> CliResult<()> {
    let profile = resolve_profile(&args.profile)?;
    run_profile(profile, args.import.run_options(), globals).await
}

fn resolve_profile(name: &str) -> CliResult<ResourceProfile> {
    ResourceProfile::by_name(name).ok_or_else(|| {
        CliError::Validation(format!(
            "unknown profile '{name}'. Valid profiles: {}",
            PROFILE_NAMES.join(", ")
        ))
    })
}
