//! Reconciliation engine.
//!
//! Drives one input record through
//! `Pending -> Normalized -> {New | Matched} -> {Created | Updated} -> Done`,
//! ending in `Failed` at whichever step goes wrong, or in `Skipped` when a
//! cancel request is seen before the write. Every call produces exactly one
//! [`ReconciliationResult`].
//!
//! Rows sharing a match key are written in the order they were prepared, so
//! the last row in the input wins at any concurrency.

use folio_client::{Collection, RemoteCollection, RetryPolicy};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::RecordError;
use crate::executor::{BackpressureGate, CancelFlag};
use crate::matcher::{self, MatchKey};
use crate::normalize::{normalize, InputRow};
use crate::profile::{ResourceProfile, Sidecar};
use crate::protect::{merge, ProtectionSet};
use crate::record::CanonicalRecord;
use crate::reference::ReferenceResolver;
use crate::report::{ReconciliationResult, RecordStatus};

/// Per-run engine settings.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub match_key: MatchKey,
    pub protection: ProtectionSet,
    pub retry: RetryPolicy,
    /// Translate reference codes (patron group, department, ...) to ids.
    pub resolve_references: bool,
}

impl ReconcileOptions {
    /// The profile's defaults: its match key and protection, default retry,
    /// references resolved when the profile declares any.
    #[must_use]
    pub fn for_profile(profile: &ResourceProfile) -> Self {
        Self {
            match_key: profile.default_match_key.clone(),
            protection: ProtectionSet::new(&profile.default_protection),
            retry: RetryPolicy::default(),
            resolve_references: !profile.references.is_empty(),
        }
    }
}

/// What a write step did.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Written {
    Created(Option<String>),
    Updated(String),
}

impl Written {
    fn status(&self) -> RecordStatus {
        match self {
            Written::Created(_) => RecordStatus::Created,
            Written::Updated(_) => RecordStatus::Updated,
        }
    }

    fn id(&self) -> Option<&str> {
        match self {
            Written::Created(id) => id.as_deref(),
            Written::Updated(id) => Some(id),
        }
    }
}

const CANCELLED: &str = "cancelled before write";

/// Hands out turns per match key in the order they are requested.
#[derive(Debug, Default)]
struct KeyQueue {
    tails: Mutex<HashMap<String, oneshot::Receiver<()>>>,
}

impl KeyQueue {
    fn enqueue(&self, key: &str) -> Turn {
        let (done, next) = oneshot::channel();
        let previous = match self.tails.lock() {
            Ok(mut tails) => tails.insert(key.to_string(), next),
            Err(_) => None,
        };
        Turn {
            previous,
            _done: done,
        }
    }
}

/// A place in a key's queue. Dropping it lets the next row for the key go.
#[derive(Debug)]
struct Turn {
    previous: Option<oneshot::Receiver<()>>,
    _done: oneshot::Sender<()>,
}

impl Turn {
    async fn ready(&mut self) {
        if let Some(previous) = self.previous.take() {
            // Err just means the earlier row finished.
            let _ = previous.await;
        }
    }
}

/// A row that has been normalized and queued behind earlier rows with the
/// same key. Run it with [`Reconciler::reconcile_prepared`].
#[derive(Debug)]
pub struct Prepared(Stage);

#[derive(Debug)]
enum Stage {
    Done(ReconciliationResult),
    Queued {
        line: usize,
        record: CanonicalRecord,
        key: String,
        turn: Turn,
    },
}

/// Reconciles records of one resource profile against a remote collection.
pub struct Reconciler {
    remote: Arc<dyn RemoteCollection>,
    profile: ResourceProfile,
    options: ReconcileOptions,
    references: Option<ReferenceResolver>,
    gate: Arc<BackpressureGate>,
    cancel: CancelFlag,
    queue: KeyQueue,
}

impl Reconciler {
    pub fn new(
        remote: Arc<dyn RemoteCollection>,
        profile: ResourceProfile,
        options: ReconcileOptions,
        gate: Arc<BackpressureGate>,
        cancel: CancelFlag,
    ) -> Self {
        let references = (options.resolve_references && !profile.references.is_empty()).then(|| {
            ReferenceResolver::new(
                remote.clone(),
                profile.references.clone(),
                options.retry.clone(),
                gate.clone(),
            )
        });
        Self {
            remote,
            profile,
            options,
            references,
            gate,
            cancel,
            queue: KeyQueue::default(),
        }
    }

    #[must_use]
    pub fn profile(&self) -> &ResourceProfile {
        &self.profile
    }

    #[must_use]
    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Reconcile one input row.
    pub async fn reconcile(&self, row: InputRow) -> ReconciliationResult {
        let prepared = self.prepare(row);
        self.reconcile_prepared(prepared).await
    }

    /// Normalize `row` and take its place in the queue for its match key.
    ///
    /// Call this in input order; the writes for a key then happen in the
    /// same order however the returned values are awaited.
    pub fn prepare(&self, row: InputRow) -> Prepared {
        let line = row.line;
        let path = self.options.match_key.path();

        if self.cancel.is_cancelled() {
            let skipped = ReconciliationResult::skipped(line, raw_key(&row, path), CANCELLED);
            return Prepared(Stage::Done(skipped));
        }

        // Pending -> Normalized
        let record = match normalize(&row, &self.profile.rules) {
            Ok(record) => record,
            Err(e) => {
                let failed = ReconciliationResult::failed(line, raw_key(&row, path), &e);
                return Prepared(Stage::Done(failed));
            }
        };
        let Some(key) = self.options.match_key.value_in(&record) else {
            return Prepared(Stage::Done(ReconciliationResult::failed(
                line,
                None,
                &RecordError::Validation(format!("match key '{path}' has no value")),
            )));
        };

        let turn = self.queue.enqueue(&key);
        Prepared(Stage::Queued {
            line,
            record,
            key,
            turn,
        })
    }

    /// Finish a row returned by [`Reconciler::prepare`].
    pub async fn reconcile_prepared(&self, prepared: Prepared) -> ReconciliationResult {
        match prepared.0 {
            Stage::Done(result) => result,
            Stage::Queued {
                line,
                record,
                key,
                mut turn,
            } => self.process(line, record, key, &mut turn).await,
        }
    }

    async fn process(
        &self,
        line: usize,
        mut record: CanonicalRecord,
        key: String,
        turn: &mut Turn,
    ) -> ReconciliationResult {
        if let Some(references) = &self.references {
            if let Err(e) = references.resolve(&mut record).await {
                return ReconciliationResult::failed(line, Some(key), &e);
            }
        }

        turn.ready().await;

        let sidecars: Vec<(&Sidecar, CanonicalRecord)> = self
            .profile
            .sidecars
            .iter()
            .filter_map(|s| record.take_subtree(&s.path).map(|sub| (s, sub)))
            .collect();

        // Normalized -> {New | Matched} -> {Created | Updated}
        let written = match self
            .upsert(
                &self.profile.collection,
                self.options.match_key.path(),
                &key,
                &record,
                &self.options.protection,
                true,
            )
            .await
        {
            Ok(Some(written)) => written,
            Ok(None) => return ReconciliationResult::skipped(line, Some(key), CANCELLED),
            Err(e) => return ReconciliationResult::failed(line, Some(key), &e),
        };

        let status = written.status();
        let mut remote_id = written.id().map(str::to_string);

        if !sidecars.is_empty() {
            let primary_id = match remote_id.clone() {
                Some(id) => Ok(id),
                None => self.lookup_id(&key).await,
            };
            let outcome = match primary_id {
                Ok(id) => {
                    remote_id = Some(id.clone());
                    self.sync_sidecars(sidecars, &id).await
                }
                Err(e) => Err(("id lookup".to_string(), e)),
            };
            if let Err((what, e)) = outcome {
                let mut failed =
                    ReconciliationResult::failed(line, Some(key), &e).with_remote_id(remote_id);
                failed.message = Some(format!("record {status}, but {what} failed: {e}"));
                return failed;
            }
        }

        match status {
            RecordStatus::Created => ReconciliationResult::created(line, key, remote_id),
            _ => ReconciliationResult::updated(line, key, remote_id),
        }
    }

    /// Match, then create or update. `Ok(None)` means a cancel request was
    /// seen before the write.
    async fn upsert(
        &self,
        collection: &Collection,
        field: &str,
        value: &str,
        record: &CanonicalRecord,
        protection: &ProtectionSet,
        cancellable: bool,
    ) -> Result<Option<Written>, RecordError> {
        let existing = self.lookup(collection, field, value).await?;

        if cancellable && self.cancel.is_cancelled() {
            return Ok(None);
        }

        match existing {
            Some(existing) => {
                let id = self.update(collection, record, &existing, protection).await?;
                Ok(Some(Written::Updated(id)))
            }
            None => match self.create(collection, record).await {
                Ok(id) => Ok(Some(Written::Created(id))),
                Err(RecordError::Conflict(detail)) => {
                    // One retry as update: a concurrent task or an earlier
                    // run may have created it between lookup and create.
                    debug!(%collection, field, value, %detail, "Create conflicted, retrying as update");
                    match self.lookup(collection, field, value).await? {
                        Some(existing) => {
                            let id = self.update(collection, record, &existing, protection).await?;
                            Ok(Some(Written::Updated(id)))
                        }
                        None => Err(RecordError::Conflict(detail)),
                    }
                }
                Err(e) => Err(e),
            },
        }
    }

    async fn lookup(
        &self,
        collection: &Collection,
        field: &str,
        value: &str,
    ) -> Result<Option<Value>, RecordError> {
        matcher::resolve(
            self.remote.as_ref(),
            collection,
            field,
            value,
            &self.options.retry,
            &self.gate,
        )
        .await
    }

    async fn create(
        &self,
        collection: &Collection,
        record: &CanonicalRecord,
    ) -> Result<Option<String>, RecordError> {
        let payload = record.to_json();
        let payload = &payload;
        let remote = self.remote.as_ref();

        let echoed = self
            .options
            .retry
            .execute_observed(
                "create",
                |e| self.gate.observe(e),
                move || remote.create(collection, payload),
            )
            .await
            .map_err(|e| RecordError::from_remote("create", e))?;
        self.gate.record_success();

        debug!(%collection, "Created record");
        Ok(echoed
            .as_ref()
            .and_then(|v| v.get("id"))
            .or_else(|| record.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn update(
        &self,
        collection: &Collection,
        record: &CanonicalRecord,
        existing: &Value,
        protection: &ProtectionSet,
    ) -> Result<String, RecordError> {
        let id = existing
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| RecordError::Fatal(format!("matched record in {collection} has no id")))?
            .to_string();

        let merged = merge(record, existing, protection);
        let merged = &merged;
        let id_ref = id.as_str();
        let remote = self.remote.as_ref();

        self.options
            .retry
            .execute_observed(
                "update",
                |e| self.gate.observe(e),
                move || remote.update(collection, id_ref, merged),
            )
            .await
            .map_err(|e| RecordError::from_remote("update", e))?;
        self.gate.record_success();

        debug!(%collection, id = %id, "Updated record");
        Ok(id)
    }

    /// Id of the primary record when the create response did not echo it.
    async fn lookup_id(&self, key: &str) -> Result<String, RecordError> {
        self.lookup(&self.profile.collection, self.options.match_key.path(), key)
            .await?
            .as_ref()
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                RecordError::Fatal(format!(
                    "created record not found by {} == \"{key}\"",
                    self.options.match_key
                ))
            })
    }

    async fn sync_sidecars(
        &self,
        sidecars: Vec<(&Sidecar, CanonicalRecord)>,
        primary_id: &str,
    ) -> Result<(), (String, RecordError)> {
        for (sidecar, mut sub) in sidecars {
            sub.insert(
                sidecar.link_field.clone(),
                Value::String(primary_id.to_string()),
            );
            let protection = self.options.protection.scoped(&sidecar.path);
            self.upsert(
                &sidecar.collection,
                &sidecar.link_field,
                primary_id,
                &sub,
                &protection,
                false,
            )
            .await
            .map_err(|e| (sidecar.path.clone(), e))?;
        }
        Ok(())
    }
}

/// Match key value straight from the input, for rows that fail before
/// normalization completes.
fn raw_key(row: &InputRow, path: &str) -> Option<String> {
    row.cell(path)
        .and_then(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
}
