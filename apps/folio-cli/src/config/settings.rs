//! Persistent settings and their overrides.
//!
//! Precedence, lowest first: `config.json`, `.env`, environment variables,
//! command-line flags. The last two arrive together through clap's `env`
//! support, so [`Config::with_overrides`] only has to apply flag values.

use crate::config::ConfigPaths;
use crate::error::{CliError, CliResult};
use folio_client::RetryPolicy;
use folio_import::executor::{DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Keys accepted by `config set`.
pub const CONFIG_KEYS: &[&str] = &[
    "okapi_url",
    "tenant",
    "token",
    "timeout_secs",
    "concurrency",
    "batch_size",
    "max_retries",
    "retry_base_delay_ms",
    "retry_max_delay_ms",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub okapi_url: Option<String>,
    pub tenant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            okapi_url: None,
            tenant: None,
            token: None,
            timeout_secs: 30,
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: retry.max_retries,
            retry_base_delay_ms: retry.base_delay_ms,
            retry_max_delay_ms: retry.max_delay_ms,
        }
    }
}

/// Everything needed to reach one tenant.
#[derive(Clone, PartialEq, Eq)]
pub struct Connection {
    pub okapi_url: String,
    pub tenant: String,
    pub token: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("okapi_url", &self.okapi_url)
            .field("tenant", &self.tenant)
            .field("token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Config {
    /// Load config.json, or defaults when it does not exist yet.
    pub fn load(paths: &ConfigPaths) -> CliResult<Self> {
        if !paths.config_file.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&paths.config_file)?;
        serde_json::from_str(&content).map_err(|e| {
            CliError::Config(format!(
                "{} is not valid: {e}",
                paths.config_file.display()
            ))
        })
    }

    pub fn save(&self, paths: &ConfigPaths) -> CliResult<()> {
        paths.ensure_dir_exists()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&paths.config_file, content)?;
        Ok(())
    }

    /// Apply connection values given on the command line or in the
    /// environment.
    #[must_use]
    pub fn with_overrides(
        mut self,
        okapi_url: Option<&str>,
        tenant: Option<&str>,
        token: Option<&str>,
    ) -> Self {
        if let Some(url) = okapi_url {
            self.okapi_url = Some(url.to_string());
        }
        if let Some(tenant) = tenant {
            self.tenant = Some(tenant.to_string());
        }
        if let Some(token) = token {
            self.token = Some(token.to_string());
        }
        self
    }

    /// Set one key from its string form.
    pub fn set(&mut self, key: &str, value: &str) -> CliResult<()> {
        let value = value.trim();
        match key {
            "okapi_url" => self.okapi_url = non_empty(value),
            "tenant" => self.tenant = non_empty(value),
            "token" => self.token = non_empty(value),
            "timeout_secs" => self.timeout_secs = parse_number(key, value)?,
            "concurrency" => self.concurrency = parse_number(key, value)?,
            "batch_size" => self.batch_size = parse_number(key, value)?,
            "max_retries" => self.max_retries = parse_number(key, value)?,
            "retry_base_delay_ms" => self.retry_base_delay_ms = parse_number(key, value)?,
            "retry_max_delay_ms" => self.retry_max_delay_ms = parse_number(key, value)?,
            _ => {
                return Err(CliError::Validation(format!(
                    "unknown config key '{key}'. Valid keys: {}",
                    CONFIG_KEYS.join(", ")
                )))
            }
        }
        Ok(())
    }

    /// The tenant connection, or a configuration error naming what is
    /// missing.
    pub fn connection(&self) -> CliResult<Connection> {
        let okapi_url = required(&self.okapi_url, "Okapi URL", "--okapi-url", "FOLIO_OKAPI_URL", "okapi_url")?;
        let tenant = required(&self.tenant, "tenant", "--tenant", "FOLIO_TENANT", "tenant")?;
        let token = required(&self.token, "token", "--token", "FOLIO_TOKEN", "token")?;
        if self.timeout_secs == 0 {
            return Err(CliError::Config("timeout_secs must be at least 1".to_string()));
        }
        Ok(Connection {
            okapi_url,
            tenant,
            token,
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay_ms: self.retry_base_delay_ms,
            max_delay_ms: self.retry_max_delay_ms,
        }
    }

    /// Copy for display, with the token masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        if shown.token.is_some() {
            shown.token = Some("********".to_string());
        }
        shown
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> CliResult<T> {
    value
        .parse()
        .map_err(|_| CliError::Validation(format!("{key} must be a non-negative integer, got '{value}'")))
}

fn required(
    value: &Option<String>,
    what: &str,
    flag: &str,
    env: &str,
    key: &str,
) -> CliResult<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            CliError::Config(format!(
                "{what} is not set. Use {flag}, {env} or 'folio-migrate config set {key} <value>'"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&ConfigPaths::at(dir.path())).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_set_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let paths = ConfigPaths::at(dir.path().join("nested"));

        let mut config = Config::default();
        config.set("okapi_url", "https://okapi.example.org").unwrap();
        config.set("tenant", "diku").unwrap();
        config.set("concurrency", "4").unwrap();
        config.save(&paths).unwrap();

        let loaded = Config::load(&paths).unwrap();
        assert_eq!(loaded.okapi_url.as_deref(), Some("https://okapi.example.org"));
        assert_eq!(loaded.concurrency, 4);
        assert!(loaded.token.is_none());
    }

    #[test]
    fn test_set_rejects_unknown_key_and_bad_number() {
        let mut config = Config::default();
        assert!(config.set("color", "blue").is_err());
        assert!(config.set("batch_size", "-1").is_err());
    }

    #[test]
    fn test_connection_requires_all_values() {
        let config = Config::default().with_overrides(Some("https://okapi"), Some("diku"), None);
        let err = config.connection().unwrap_err();
        assert!(err.to_string().contains("FOLIO_TOKEN"));

        let connection = config
            .with_overrides(None, None, Some("secret"))
            .connection()
            .unwrap();
        assert_eq!(connection.tenant, "diku");
        assert!(!format!("{connection:?}").contains("secret"));
    }

    #[test]
    fn test_redacted_masks_token() {
        let config = Config::default().with_overrides(None, None, Some("secret"));
        assert_eq!(config.redacted().token.as_deref(), Some("********"));
    }
}
