//! Subcommands and the options they share.

pub mod config;
pub mod import_users;
pub mod sync;

use crate::config::{Config, ConfigPaths};
use crate::error::CliResult;
use clap::Args;
use std::path::PathBuf;

/// Connection and logging options accepted by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Okapi gateway URL
    #[arg(long, global = true, env = "FOLIO_OKAPI_URL")]
    pub okapi_url: Option<String>,

    /// Tenant id sent as x-okapi-tenant
    #[arg(long, global = true, env = "FOLIO_TENANT")]
    pub tenant: Option<String>,

    /// Okapi token sent as x-okapi-token
    #[arg(long, global = true, env = "FOLIO_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl GlobalArgs {
    /// The saved config with these connection values applied on top.
    pub fn load_config(&self, paths: &ConfigPaths) -> CliResult<Config> {
        Ok(Config::load(paths)?.with_overrides(
            self.okapi_url.as_deref(),
            self.tenant.as_deref(),
            self.token.as_deref(),
        ))
    }
}
