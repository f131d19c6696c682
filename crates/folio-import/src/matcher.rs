//! Match resolver: find the remote counterpart of a record by one key.

use folio_client::{Collection, RemoteCollection, RetryPolicy};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::RecordError;
use crate::executor::BackpressureGate;
use crate::record::CanonicalRecord;

/// The field used to correlate input records with remote ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchKey {
    ExternalSystemId,
    Username,
    Email,
    Barcode,
    /// Any other dotted path.
    Custom(String),
}

impl MatchKey {
    pub fn custom(path: impl Into<String>) -> Self {
        MatchKey::Custom(path.into())
    }

    /// Dotted path of the key in both the canonical and the remote record.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            MatchKey::ExternalSystemId => "externalSystemId",
            MatchKey::Username => "username",
            MatchKey::Email => "personal.email",
            MatchKey::Barcode => "barcode",
            MatchKey::Custom(path) => path,
        }
    }

    /// The key value carried by `record`, as the string sent in the query.
    #[must_use]
    pub fn value_in(&self, record: &CanonicalRecord) -> Option<String> {
        match record.get(self.path())? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for MatchKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "" => Err("match key must not be empty".to_string()),
            "externalSystemId" => Ok(MatchKey::ExternalSystemId),
            "username" => Ok(MatchKey::Username),
            "email" | "personal.email" => Ok(MatchKey::Email),
            "barcode" => Ok(MatchKey::Barcode),
            other if other.split('.').any(str::is_empty) => {
                Err(format!("invalid match key path '{other}'"))
            }
            other => Ok(MatchKey::Custom(other.to_string())),
        }
    }
}

/// Look up the single remote record whose `field` equals `value`.
///
/// Asks for two records so that duplicates are detected rather than picked
/// from arbitrarily.
pub async fn resolve(
    remote: &dyn RemoteCollection,
    collection: &Collection,
    field: &str,
    value: &str,
    retry: &RetryPolicy,
    gate: &BackpressureGate,
) -> Result<Option<Value>, RecordError> {
    let mut found = retry
        .execute_observed(
            "lookup",
            |e| gate.observe(e),
            move || remote.find(collection, field, value, 2),
        )
        .await
        .map_err(|e| RecordError::from_remote("lookup", e))?;
    gate.record_success();

    debug!(
        collection = %collection,
        field,
        value,
        matches = found.len(),
        "Resolved match key"
    );

    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        count => Err(RecordError::AmbiguousMatch {
            field: field.to_string(),
            value: value.to_string(),
            count,
        }),
    }
}
