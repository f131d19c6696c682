//! Okapi REST client for FOLIO tenants.
//!
//! - [`client::OkapiClient`]: CQL lookups, create and update against module
//!   collections behind an Okapi gateway.
//! - [`remote::RemoteCollection`]: the trait the import engine is written
//!   against.
//! - [`retry::RetryPolicy`]: exponential backoff for transient failures.

pub mod auth;
pub mod client;
pub mod collection;
pub mod error;
pub mod remote;
pub mod retry;

pub use auth::OkapiAuth;
pub use client::{cql_exact, OkapiClient};
pub use collection::Collection;
pub use error::{FolioClientError, FolioClientResult};
pub use remote::RemoteCollection;
pub use retry::RetryPolicy;
