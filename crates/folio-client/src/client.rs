//! Okapi HTTP client (reqwest-based).
//!
//! Provides an `OkapiClient` that talks to FOLIO collection endpoints through
//! the Okapi gateway: CQL lookups, record creation and full-record updates.

use crate::auth::OkapiAuth;
use crate::collection::Collection;
use crate::error::{FolioClientError, FolioClientResult};
use crate::remote::RemoteCollection;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// One page of a collection listing.
#[derive(Debug, Clone, Default)]
pub struct CollectionPage {
    /// Records in the page.
    pub records: Vec<Value>,
    /// `totalRecords` as reported by the module, when present.
    pub total_records: Option<u64>,
}

/// HTTP client for an Okapi gateway.
///
/// Wraps `reqwest::Client` with tenant headers, collection-aware response
/// parsing and FOLIO error classification.
#[derive(Debug, Clone)]
pub struct OkapiClient {
    /// Gateway base URL (e.g. "<https://okapi.example.org>"), no trailing slash.
    base_url: String,
    auth: OkapiAuth,
    http_client: Client,
}

impl OkapiClient {
    /// Create a new client.
    pub fn new(base_url: String, auth: OkapiAuth, timeout: Duration) -> FolioClientResult<Self> {
        let base_url = normalize_base_url(&base_url)?;
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("folio-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                FolioClientError::InvalidConfig(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            base_url,
            auth,
            http_client,
        })
    }

    /// Create a client with a pre-built `reqwest::Client` (for testing).
    pub fn with_http_client(
        base_url: String,
        auth: OkapiAuth,
        http_client: Client,
    ) -> FolioClientResult<Self> {
        Ok(Self {
            base_url: normalize_base_url(&base_url)?,
            auth,
            http_client,
        })
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the tenant the client acts for.
    #[must_use]
    pub fn tenant(&self) -> &str {
        self.auth.tenant()
    }

    fn collection_url(&self, collection: &Collection) -> String {
        format!("{}/{}", self.base_url, collection.path)
    }

    fn record_url(&self, collection: &Collection, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection.path, id)
    }

    // ── Reads ─────────────────────────────────────────────────────────

    /// List a collection with an optional CQL query.
    pub async fn list(
        &self,
        collection: &Collection,
        query: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> FolioClientResult<CollectionPage> {
        let url = self.collection_url(collection);
        debug!("Okapi GET {} (query={:?})", url, query);

        let mut params: Vec<(&str, String)> =
            vec![("limit", limit.to_string()), ("offset", offset.to_string())];
        if let Some(q) = query {
            params.push(("query", q.to_string()));
        }

        let builder = self.auth.apply(self.http_client.get(&url)).query(&params);
        let response = builder.header("Accept", "application/json").send().await?;
        let body: Value = self.handle_response(response).await?;
        parse_collection_page(collection, body)
    }

    /// Records whose `field` equals `value` exactly.
    pub async fn find_by(
        &self,
        collection: &Collection,
        field: &str,
        value: &str,
        limit: u32,
    ) -> FolioClientResult<Vec<Value>> {
        let query = cql_exact(field, value);
        Ok(self.list(collection, Some(&query), limit, 0).await?.records)
    }

    /// Get a record by id.
    pub async fn get(&self, collection: &Collection, id: &str) -> FolioClientResult<Value> {
        let url = self.record_url(collection, id);
        debug!("Okapi GET {}", url);
        let response = self
            .auth
            .apply(self.http_client.get(&url))
            .header("Accept", "application/json")
            .send()
            .await?;
        self.handle_response(response).await
    }

    // ── Writes ────────────────────────────────────────────────────────

    /// Create a record (POST /{collection}).
    pub async fn create<B: Serialize + ?Sized>(
        &self,
        collection: &Collection,
        body: &B,
    ) -> FolioClientResult<Option<Value>> {
        let url = self.collection_url(collection);
        debug!("Okapi POST {}", url);
        let response = self
            .auth
            .apply(self.http_client.post(&url))
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return self.handle_error_response(response).await;
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        // Some modules answer 201 with a text body; only JSON echoes are kept.
        Ok(serde_json::from_str(&text).ok())
    }

    /// Replace a record (PUT /{collection}/{id}).
    pub async fn update<B: Serialize + ?Sized>(
        &self,
        collection: &Collection,
        id: &str,
        body: &B,
    ) -> FolioClientResult<()> {
        let url = self.record_url(collection, id);
        debug!("Okapi PUT {}", url);
        let response = self
            .auth
            .apply(self.http_client.put(&url))
            .header("Accept", "application/json, text/plain")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status.is_success() {
            Ok(())
        } else {
            self.handle_error_response(response).await
        }
    }

    // ── Response Handling ─────────────────────────────────────────────

    async fn handle_response(&self, response: reqwest::Response) -> FolioClientResult<Value> {
        if response.status().is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body)
                .map_err(|e| FolioClientError::ParseError(format!("Failed to parse response: {e}")))
        } else {
            self.handle_error_response(response).await
        }
    }

    async fn handle_error_response<T>(&self, response: reqwest::Response) -> FolioClientResult<T> {
        let status = response.status();

        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        let detail = folio_error_message(&body).unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                body.trim().to_string()
            }
        });

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(FolioClientError::AuthError(format!("{status}: {detail}")))
            }
            StatusCode::NOT_FOUND => Err(FolioClientError::NotFound(detail)),
            StatusCode::UNPROCESSABLE_ENTITY | StatusCode::CONFLICT => {
                Err(FolioClientError::Validation {
                    status: status.as_u16(),
                    detail,
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Okapi rate limited, retry after {:?}s", retry_after);
                Err(FolioClientError::RateLimited {
                    retry_after_secs: retry_after,
                })
            }
            _ => Err(FolioClientError::Http {
                status: status.as_u16(),
                detail,
            }),
        }
    }
}

#[async_trait]
impl RemoteCollection for OkapiClient {
    async fn find(
        &self,
        collection: &Collection,
        field: &str,
        value: &str,
        limit: u32,
    ) -> FolioClientResult<Vec<Value>> {
        self.find_by(collection, field, value, limit).await
    }

    async fn create(
        &self,
        collection: &Collection,
        record: &Value,
    ) -> FolioClientResult<Option<Value>> {
        OkapiClient::create(self, collection, record).await
    }

    async fn update(&self, collection: &Collection, id: &str, record: &Value) -> FolioClientResult<()> {
        OkapiClient::update(self, collection, id, record).await
    }
}

fn normalize_base_url(base_url: &str) -> FolioClientResult<String> {
    let trimmed = base_url.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(FolioClientError::InvalidConfig(format!(
            "Okapi URL must start with http:// or https://, got '{base_url}'"
        )));
    }
    Ok(trimmed.to_string())
}

fn parse_collection_page(collection: &Collection, body: Value) -> FolioClientResult<CollectionPage> {
    let total_records = body.get("totalRecords").and_then(Value::as_u64);
    let records = match body {
        Value::Object(mut map) => match map.remove(&collection.records_key) {
            Some(Value::Array(records)) => records,
            Some(_) | None => {
                return Err(FolioClientError::ParseError(format!(
                    "response from {collection} has no '{}' array",
                    collection.records_key
                )))
            }
        },
        _ => {
            return Err(FolioClientError::ParseError(format!(
                "response from {collection} is not a JSON object"
            )))
        }
    };
    Ok(CollectionPage {
        records,
        total_records,
    })
}

/// First message of a FOLIO `{"errors":[{"message":...}]}` body.
#[must_use]
pub fn folio_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("errors")?
        .as_array()?
        .iter()
        .find_map(|e| e.get("message").and_then(Value::as_str))
        .map(str::to_string)
}

/// Exact-match CQL clause `field=="value"`.
#[must_use]
pub fn cql_exact(field: &str, value: &str) -> String {
    format!("{field}==\"{}\"", escape_cql_value(value))
}

/// Escape a value for use inside a quoted CQL term.
///
/// Backslash and double-quote would end the term; `*`, `?` and `^` are
/// masking/anchoring characters and must match literally.
fn escape_cql_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '*' | '?' | '^') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
