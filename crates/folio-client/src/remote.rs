//! The seam between the reconciler and the remote system.
//!
//! The reconciler only needs three verbs against a collection. Keeping them
//! behind a trait lets the engine run against Okapi in production and an
//! in-memory store in tests.

use async_trait::async_trait;
use serde_json::Value;

use crate::collection::Collection;
use crate::error::FolioClientResult;

/// Exact-match lookup, create and full-replace update on a collection.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    /// Records whose `field` equals `value` exactly, at most `limit` of them.
    async fn find(
        &self,
        collection: &Collection,
        field: &str,
        value: &str,
        limit: u32,
    ) -> FolioClientResult<Vec<Value>>;

    /// Create a record. Returns the stored record when the server echoes it.
    async fn create(&self, collection: &Collection, record: &Value)
        -> FolioClientResult<Option<Value>>;

    /// Replace the record identified by `id`.
    async fn update(&self, collection: &Collection, id: &str, record: &Value)
        -> FolioClientResult<()>;
}
