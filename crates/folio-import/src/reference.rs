//! Reference data resolution.
//!
//! Input files may name patron groups, departments, address types and
//! service points by their human code instead of their UUID. Before a record
//! is matched, each such value is looked up once per run and replaced by the
//! id of the single remote record that carries it.

use folio_client::{Collection, RemoteCollection, RetryPolicy};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::RecordError;
use crate::executor::BackpressureGate;
use crate::matcher;
use crate::record::CanonicalRecord;

/// Which remote collection a reference points into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTarget {
    /// Name used in error messages, e.g. "patron group".
    pub label: String,
    pub collection: Collection,
    /// Fields tried in order until one matches.
    pub lookup_fields: Vec<String>,
}

impl ReferenceTarget {
    pub fn new(label: impl Into<String>, collection: Collection, lookup_fields: &[&str]) -> Self {
        Self {
            label: label.into(),
            collection,
            lookup_fields: lookup_fields.iter().map(|f| (*f).to_string()).collect(),
        }
    }

    #[must_use]
    pub fn patron_group() -> Self {
        Self::new("patron group", Collection::patron_groups(), &["group"])
    }

    #[must_use]
    pub fn department() -> Self {
        Self::new("department", Collection::departments(), &["name", "code"])
    }

    #[must_use]
    pub fn address_type() -> Self {
        Self::new("address type", Collection::address_types(), &["addressType"])
    }

    #[must_use]
    pub fn service_point() -> Self {
        Self::new("service point", Collection::service_points(), &["code"])
    }
}

/// A record field holding one or more references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRule {
    /// Leaf path in the canonical record. The value may be a string or an
    /// array of strings.
    pub path: String,
    /// For arrays of objects: the field inside each element that holds the
    /// reference.
    pub element_field: Option<String>,
    pub target: ReferenceTarget,
}

impl ReferenceRule {
    pub fn new(path: impl Into<String>, target: ReferenceTarget) -> Self {
        Self {
            path: path.into(),
            element_field: None,
            target,
        }
    }

    #[must_use]
    pub fn in_elements(mut self, field: impl Into<String>) -> Self {
        self.element_field = Some(field.into());
        self
    }

    /// Reference fields of a FOLIO user record.
    #[must_use]
    pub fn users() -> Vec<Self> {
        vec![
            Self::new("patronGroup", ReferenceTarget::patron_group()),
            Self::new("departments", ReferenceTarget::department()),
            Self::new("personal.addresses", ReferenceTarget::address_type())
                .in_elements("addressTypeId"),
            Self::new(
                "servicePointsUser.servicePointsIds",
                ReferenceTarget::service_point(),
            ),
            Self::new(
                "servicePointsUser.defaultServicePointId",
                ReferenceTarget::service_point(),
            ),
        ]
    }
}

type CacheKey = (String, String);

/// Resolves reference codes to ids with a per-run cache.
pub struct ReferenceResolver {
    remote: Arc<dyn RemoteCollection>,
    rules: Vec<ReferenceRule>,
    retry: RetryPolicy,
    gate: Arc<BackpressureGate>,
    cache: RwLock<HashMap<CacheKey, Option<String>>>,
}

impl ReferenceResolver {
    pub fn new(
        remote: Arc<dyn RemoteCollection>,
        rules: Vec<ReferenceRule>,
        retry: RetryPolicy,
        gate: Arc<BackpressureGate>,
    ) -> Self {
        Self {
            remote,
            rules,
            retry,
            gate,
            cache: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn rules(&self) -> &[ReferenceRule] {
        &self.rules
    }

    /// Replace every reference in `record` with its id.
    pub async fn resolve(&self, record: &mut CanonicalRecord) -> Result<(), RecordError> {
        for rule in &self.rules {
            let Some(current) = record.get(&rule.path).cloned() else {
                continue;
            };
            let resolved = self.resolve_value(rule, current).await?;
            record.insert(rule.path.clone(), resolved);
        }
        Ok(())
    }

    async fn resolve_value(&self, rule: &ReferenceRule, value: Value) -> Result<Value, RecordError> {
        match (value, &rule.element_field) {
            (Value::String(s), None) => Ok(Value::String(self.lookup(&rule.target, &s).await?)),
            (Value::Array(items), field) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve_item(rule, field.as_deref(), item).await?);
                }
                Ok(Value::Array(out))
            }
            (other, _) => Ok(other),
        }
    }

    async fn resolve_item(
        &self,
        rule: &ReferenceRule,
        field: Option<&str>,
        item: Value,
    ) -> Result<Value, RecordError> {
        match (item, field) {
            (Value::String(s), None) => Ok(Value::String(self.lookup(&rule.target, &s).await?)),
            (Value::Object(mut element), Some(field)) => {
                if let Some(Value::String(s)) = element.get(field).cloned() {
                    let id = self.lookup(&rule.target, &s).await?;
                    element.insert(field.to_string(), Value::String(id));
                }
                Ok(Value::Object(element))
            }
            (other, _) => Ok(other),
        }
    }

    /// Id for `value` in `target`. UUIDs pass through untouched.
    async fn lookup(&self, target: &ReferenceTarget, value: &str) -> Result<String, RecordError> {
        let value = value.trim();
        if Uuid::parse_str(value).is_ok() {
            return Ok(value.to_string());
        }

        let key = (target.collection.path.clone(), value.to_string());
        if let Some(cached) = self.cache.read().await.get(&key) {
            return cached
                .clone()
                .ok_or_else(|| unknown_reference(target, value));
        }

        let mut found = None;
        for field in &target.lookup_fields {
            let hit = matcher::resolve(
                self.remote.as_ref(),
                &target.collection,
                field,
                value,
                &self.retry,
                &self.gate,
            )
            .await
            .map_err(|e| match e {
                RecordError::AmbiguousMatch { count, .. } => RecordError::Validation(format!(
                    "{} '{value}' matches {count} records by {field}",
                    target.label
                )),
                other => other,
            })?;
            if let Some(id) = hit.as_ref().and_then(|r| r.get("id")).and_then(Value::as_str) {
                found = Some(id.to_string());
                break;
            }
        }

        debug!(
            reference = %target.label,
            value,
            resolved = found.as_deref().unwrap_or("<none>"),
            "Resolved reference"
        );
        self.cache.write().await.insert(key, found.clone());
        found.ok_or_else(|| unknown_reference(target, value))
    }
}

fn unknown_reference(target: &ReferenceTarget, value: &str) -> RecordError {
    RecordError::Validation(format!("unknown {} '{value}'", target.label))
}
