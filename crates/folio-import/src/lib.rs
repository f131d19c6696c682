//! Bulk record reconciler for FOLIO collections.
//!
//! Each input row is normalized into a canonical record, matched against the
//! tenant by one key, and then created or updated. Updates merge into the
//! existing record and keep the fields a [`ProtectionSet`] guards. The batch
//! runs with bounded concurrency and every row ends up in the
//! [`BatchReport`].
//!
//! ```text
//! source::read_rows -> ImportJob::run -> Reconciler::prepare + reconcile_prepared (per row)
//!                                          normalize -> references -> match
//!                                          -> create | merge + update
//!                                          -> sidecars
//! ```

pub mod engine;
pub mod error;
pub mod executor;
pub mod job;
pub mod matcher;
pub mod normalize;
pub mod profile;
pub mod protect;
pub mod record;
pub mod reference;
pub mod report;
pub mod source;

pub use engine::{Prepared, ReconcileOptions, Reconciler};
pub use error::{ImportError, ImportResult, RecordError};
pub use executor::{BackpressureGate, BatchExecutor, CancelFlag, ExecutorConfig};
pub use job::{ImportConfig, ImportJob};
pub use matcher::MatchKey;
pub use normalize::{normalize, InputRow, SchemaRules};
pub use profile::{ResourceProfile, Sidecar};
pub use protect::{merge, ProtectionSet};
pub use record::CanonicalRecord;
pub use reference::{ReferenceResolver, ReferenceRule, ReferenceTarget};
pub use report::{BatchReport, OutcomeReporter, Progress, ReconciliationResult, RecordStatus};
pub use source::{read_rows, CsvDelimiter, InputFormat};
