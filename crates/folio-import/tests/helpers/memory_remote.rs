//! In-memory FOLIO tenant for engine tests.
//!
//! Stores records per collection path, enforces unique fields with a 422
//! like the users module does, and can inject failures or request
//! cancellation after a number of creates.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use folio_client::{Collection, FolioClientError, FolioClientResult, RemoteCollection};
use folio_import::record::value_at;
use folio_import::CancelFlag;

#[derive(Default)]
pub struct MemoryRemote {
    records: Mutex<HashMap<String, Vec<Value>>>,
    unique: HashMap<String, Vec<String>>,
    next_id: AtomicUsize,
    finds: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
    cancel_after: Mutex<Option<(usize, CancelFlag)>>,
    failing_finds: AtomicUsize,
    write_failures: Mutex<Vec<(String, String, u16, String)>>,
    yield_on_find: bool,
}

impl MemoryRemote {
    /// A tenant whose `users` collection enforces unique `externalSystemId`,
    /// `username` and `barcode`.
    pub fn users() -> Self {
        Self::default().with_unique("users", &["externalSystemId", "username", "barcode"])
    }

    pub fn with_unique(mut self, collection: &str, fields: &[&str]) -> Self {
        self.unique.insert(
            collection.to_string(),
            fields.iter().map(|f| (*f).to_string()).collect(),
        );
        self
    }

    /// Yield to the scheduler on every lookup so concurrent records interleave.
    pub fn interleaved(mut self) -> Self {
        self.yield_on_find = true;
        self
    }

    /// Request cancellation once `creates` records have been created.
    pub fn cancel_after_creates(&self, creates: usize, cancel: CancelFlag) {
        *self.cancel_after.lock().unwrap() = Some((creates, cancel));
    }

    /// Answer the next `n` lookups with 503.
    pub fn fail_next_finds(&self, n: usize) {
        self.failing_finds.store(n, Ordering::SeqCst);
    }

    /// Fail every write of a record whose `field` equals `value` with the
    /// given status (422 becomes a validation error).
    pub fn fail_writes_where(&self, field: &str, value: &str, status: u16, detail: &str) {
        self.write_failures.lock().unwrap().push((
            field.to_string(),
            value.to_string(),
            status,
            detail.to_string(),
        ));
    }

    pub fn seed(&self, collection: &str, records: Vec<Value>) {
        self.records
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .extend(records);
    }

    pub fn records(&self, collection: &str) -> Vec<Value> {
        self.records
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn injected_failure(&self, record: &Value) -> Option<FolioClientError> {
        self.write_failures
            .lock()
            .unwrap()
            .iter()
            .find(|(field, value, _, _)| text_at(record, field).as_deref() == Some(value.as_str()))
            .map(|(_, _, status, detail)| match status {
                422 => FolioClientError::Validation {
                    status: *status,
                    detail: detail.clone(),
                },
                _ => FolioClientError::Http {
                    status: *status,
                    detail: detail.clone(),
                },
            })
    }

    fn check_unique(
        &self,
        collection: &str,
        stored: &[Value],
        record: &Value,
        skip_id: Option<&str>,
    ) -> FolioClientResult<()> {
        for field in self.unique.get(collection).into_iter().flatten() {
            let Some(value) = text_at(record, field) else {
                continue;
            };
            let taken = stored.iter().any(|other| {
                other.get("id").and_then(Value::as_str) != skip_id
                    && text_at(other, field).as_deref() == Some(value.as_str())
            });
            if taken {
                return Err(FolioClientError::Validation {
                    status: 422,
                    detail: format!("User with this {field} already exists"),
                });
            }
        }
        Ok(())
    }
}

fn text_at(record: &Value, path: &str) -> Option<String> {
    match value_at(record, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl RemoteCollection for MemoryRemote {
    async fn find(
        &self,
        collection: &Collection,
        field: &str,
        value: &str,
        limit: u32,
    ) -> FolioClientResult<Vec<Value>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        if self.yield_on_find {
            tokio::task::yield_now().await;
        }
        let failing = self.failing_finds.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_finds.store(failing - 1, Ordering::SeqCst);
            return Err(FolioClientError::Http {
                status: 503,
                detail: "Service Unavailable".to_string(),
            });
        }

        let records = self.records.lock().unwrap();
        Ok(records
            .get(&collection.path)
            .into_iter()
            .flatten()
            .filter(|r| text_at(r, field).as_deref() == Some(value))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        collection: &Collection,
        record: &Value,
    ) -> FolioClientResult<Option<Value>> {
        if let Some(error) = self.injected_failure(record) {
            return Err(error);
        }

        let created = {
            let mut records = self.records.lock().unwrap();
            let stored = records.entry(collection.path.clone()).or_default();
            self.check_unique(&collection.path, stored, record, None)?;

            let mut created = record.clone();
            if created.get("id").is_none() {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                created["id"] = json!(format!("{}-{n:04}", collection.path));
            }
            stored.push(created.clone());
            created
        };

        let count = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, cancel)) = self.cancel_after.lock().unwrap().as_ref() {
            if count >= *after {
                cancel.cancel();
            }
        }
        Ok(Some(created))
    }

    async fn update(
        &self,
        collection: &Collection,
        id: &str,
        record: &Value,
    ) -> FolioClientResult<()> {
        if let Some(error) = self.injected_failure(record) {
            return Err(error);
        }

        let mut records = self.records.lock().unwrap();
        let stored = records.entry(collection.path.clone()).or_default();
        self.check_unique(&collection.path, stored, record, Some(id))?;

        let slot = stored
            .iter_mut()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| FolioClientError::NotFound(format!("{collection}/{id}")))?;
        *slot = record.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
