//! CLI error types and exit codes

use folio_client::FolioClientError;
use folio_import::ImportError;
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General error
/// - 2: Authentication failed
/// - 3: Network error
/// - 4: Validation error, or records failed
/// - 5: Server error
/// - 130: Cancelled by the operator
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed: {0}\n\nTroubleshooting:\n  - Check the Okapi URL\n  - Verify the gateway is reachable from this machine\n  - Try again in a few moments")]
    ConnectionFailed(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{failed} of {total} records failed")]
    RecordsFailed { failed: usize, total: usize },

    #[error("Import cancelled after {processed} of {total} records")]
    Cancelled { processed: usize, total: usize },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::AuthenticationFailed(_) => 2,
            CliError::Network(_) | CliError::ConnectionFailed(_) => 3,
            CliError::Validation(_) | CliError::NotFound(_) => 4,
            CliError::RecordsFailed { .. } => 4,
            CliError::Server(_) => 5,
            CliError::Config(_) | CliError::Io(_) => 1,
            CliError::Cancelled { .. } => 130,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {}", suggestion);
            } else {
                eprintln!("\nSuggestion: {}", suggestion);
            }
        }
    }

    /// Get a suggested action for this error
    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::AuthenticationFailed(_) => {
                Some("Check the tenant id and refresh the token (--token or FOLIO_TOKEN).")
            }
            CliError::ConnectionFailed(_) => Some("Check your network connection and try again."),
            CliError::RecordsFailed { .. } => {
                Some("See --error-log or --results for per-record details; re-run to retry them.")
            }
            CliError::Cancelled { .. } => {
                Some("Re-run the same file: records already written will be updated in place.")
            }
            _ => None,
        }
    }
}

impl From<FolioClientError> for CliError {
    fn from(e: FolioClientError) -> Self {
        match e {
            FolioClientError::AuthError(msg) => CliError::AuthenticationFailed(msg),
            FolioClientError::Unreachable(msg) => CliError::ConnectionFailed(msg),
            retry @ (FolioClientError::RateLimited { .. }
            | FolioClientError::MaxRetriesExceeded { .. }) => CliError::Network(retry.to_string()),
            FolioClientError::NotFound(msg) => CliError::NotFound(msg),
            FolioClientError::Validation { detail, .. } => CliError::Validation(detail),
            FolioClientError::InvalidConfig(msg) => CliError::Config(msg),
            FolioClientError::ParseError(msg) => CliError::Server(msg),
            FolioClientError::Http { status, detail } if status >= 500 => {
                CliError::Server(format!("HTTP {status}: {detail}"))
            }
            FolioClientError::Http { status, detail } => {
                CliError::Validation(format!("HTTP {status}: {detail}"))
            }
        }
    }
}

impl From<ImportError> for CliError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::InvalidConfig(msg) => CliError::Config(msg),
            ImportError::Io(err) => CliError::Io(err.to_string()),
            other => CliError::Validation(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Config(format!("JSON error: {}", e))
    }
}
