//! Config command - Show or change saved settings

use crate::commands::GlobalArgs;
use crate::config::{Config, ConfigPaths};
use crate::error::CliResult;
use clap::{Args, Subcommand};

/// Configuration commands
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective settings
    Show(ConfigShowArgs),
    /// Save one setting to config.json
    Set(ConfigSetArgs),
}

/// Arguments for the config show command
#[derive(Args, Debug)]
pub struct ConfigShowArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config set command
#[derive(Args, Debug)]
pub struct ConfigSetArgs {
    /// Setting name, e.g. okapi_url or concurrency
    pub key: String,
    pub value: String,
}

/// Execute config commands
pub async fn execute(args: ConfigArgs, globals: &GlobalArgs) -> CliResult<()> {
    let paths = ConfigPaths::new()?;
    match args.command {
        ConfigCommands::Show(show) => execute_show(&paths, globals, show.json),
        ConfigCommands::Set(set) => execute_set(&paths, &set.key, &set.value),
    }
}

fn execute_show(paths: &ConfigPaths, globals: &GlobalArgs, json: bool) -> CliResult<()> {
    let config = globals.load_config(paths)?.redacted();

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let unset = || "(not set)".to_string();
    println!("Configuration ({}):", paths.config_file.display());
    println!("  okapi_url:           {}", config.okapi_url.clone().unwrap_or_else(unset));
    println!("  tenant:              {}", config.tenant.clone().unwrap_or_else(unset));
    println!("  token:               {}", config.token.clone().unwrap_or_else(unset));
    println!("  timeout_secs:        {}", config.timeout_secs);
    println!("  concurrency:         {}", config.concurrency);
    println!("  batch_size:          {}", config.batch_size);
    println!("  max_retries:         {}", config.max_retries);
    println!("  retry_base_delay_ms: {}", config.retry_base_delay_ms);
    println!("  retry_max_delay_ms:  {}", config.retry_max_delay_ms);
    Ok(())
}

/// Saved values only: flags and environment variables are not persisted.
fn execute_set(paths: &ConfigPaths, key: &str, value: &str) -> CliResult<()> {
    let mut config = Config::load(paths)?;
    config.set(key, value)?;
    config.save(paths)?;

    let shown = if key == "token" { "********" } else { value };
    println!("Set {key} = {shown}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_persists_and_show_reads_back() {
        let dir = TempDir::new().unwrap();
        let paths = ConfigPaths::at(dir.path());

        execute_set(&paths, "tenant", "diku").unwrap();
        execute_set(&paths, "token", "secret").unwrap();
        execute_show(&paths, &GlobalArgs::default(), true).unwrap();

        let saved = Config::load(&paths).unwrap();
        assert_eq!(saved.tenant.as_deref(), Some("diku"));
        assert_eq!(saved.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_set_unknown_key_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let paths = ConfigPaths::at(dir.path());

        let err = execute_set(&paths, "colour", "blue").unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(!paths.config_file.exists());
    }
}
