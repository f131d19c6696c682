//! Configuration management for folio-migrate

mod paths;
mod settings;

pub use paths::ConfigPaths;
pub use settings::{Config, Connection, CONFIG_KEYS};
