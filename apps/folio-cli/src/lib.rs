//! folio-migrate CLI library
//!
//! The binary in main.rs is a thin clap front end over these modules; they
//! are public so the integration tests can drive an import end to end.

pub mod batch;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
