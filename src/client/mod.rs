//! HTTP access to the backend collections.
//!
//! The backend is the source of truth; everything here is a thin typed wrapper that
//! maps status codes onto [`ServiceError`] and validates payloads at the boundary.

use std::marker::PhantomData;
use std::time::Duration;

use reqwest::{header::AUTHORIZATION, Client, Method, RequestBuilder};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::errors::{ServiceError, ServiceResult};
use crate::models::{DocumentKind, ListQuery, Page, Record};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base: Url,
    token: Option<String>,
}

impl ApiClient {
    /// Build a client using a default reqwest client with the given timeout.
    pub fn new(base_url: &str, timeout: Duration) -> ServiceResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Config(format!("failed to construct http client: {}", e)))?;
        let base = Url::parse(base_url)
            .map_err(|e| ServiceError::Config(format!("invalid api base url {}: {}", base_url, e)))?;
        Ok(Self::with_client(base, http))
    }

    /// Build a client from an existing reqwest client (useful for testing).
    pub fn with_client(base: Url, http: Client) -> Self {
        Self {
            http,
            base,
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn collection<T: Record>(&self, path: impl Into<String>) -> RemoteCollection<T> {
        RemoteCollection {
            client: self.clone(),
            path: path.into(),
            _record: PhantomData,
        }
    }

    fn url(&self, path: &str, extra: &[&str]) -> ServiceResult<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ServiceError::Config(format!("api base url cannot be a base: {}", self.base))
            })?;
            segments.pop_if_empty();
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
            segments.extend(extra.iter().copied());
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut builder = self
            .http
            .request(method, url)
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());
        if let Some(token) = &self.token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        builder
    }

    /// Sends and returns the parsed JSON body; an empty body yields `Value::Null`.
    async fn send(&self, builder: RequestBuilder) -> ServiceResult<Value> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(%status, "backend rejected request");
            return Err(ServiceError::from_status(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

/// What a create call returned: the id when present, and the record when the body
/// was a complete one.
#[derive(Debug, Clone)]
pub struct Created<T: Record> {
    pub id: Option<T::Id>,
    pub record: Option<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLink {
    pub url: String,
}

/// Read access to a listing; the seam used by search and reconciliation.
#[async_trait::async_trait]
pub trait CollectionSource<T: Record>: Send + Sync {
    async fn list(&self, query: &ListQuery) -> ServiceResult<Page<T>>;
}

/// Existence probe for documents attached to a catalog code.
#[async_trait::async_trait]
pub trait DocumentSource: Send + Sync {
    async fn document(&self, key: &str, kind: DocumentKind) -> ServiceResult<DocumentLink>;
}

/// Typed handle on one backend collection.
#[derive(Debug)]
pub struct RemoteCollection<T> {
    client: ApiClient,
    path: String,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for RemoteCollection<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            path: self.path.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> RemoteCollection<T> {
    pub fn path(&self) -> &str {
        &self.path
    }

    #[instrument(skip(self), fields(collection = %self.path))]
    pub async fn fetch(&self, query: &ListQuery) -> ServiceResult<Page<T>> {
        let url = self.client.url(&self.path, &[])?;
        let body = self
            .client
            .send(self.client.request(Method::GET, url).query(query))
            .await?;
        decode_page(&self.path, body)
    }

    #[instrument(skip(self, draft), fields(collection = %self.path))]
    pub async fn create<D: Serialize + Sync>(&self, draft: &D) -> ServiceResult<Created<T>> {
        let url = self.client.url(&self.path, &[])?;
        let body = self
            .client
            .send(self.client.request(Method::POST, url).json(draft))
            .await?;
        Ok(decode_created(body))
    }

    #[instrument(skip(self, patch), fields(collection = %self.path))]
    pub async fn update<P: Serialize + Sync>(
        &self,
        id: &T::Id,
        patch: &P,
    ) -> ServiceResult<Option<T>> {
        let id = id.to_string();
        let url = self.client.url(&self.path, &[&id])?;
        let body = self
            .client
            .send(self.client.request(Method::PUT, url).json(patch))
            .await?;
        Ok(serde_json::from_value(body).ok())
    }

    #[instrument(skip(self), fields(collection = %self.path))]
    pub async fn delete(&self, id: &T::Id) -> ServiceResult<()> {
        let id = id.to_string();
        let url = self.client.url(&self.path, &[&id])?;
        self.client
            .send(self.client.request(Method::DELETE, url))
            .await
            .map(|_| ())
    }

    /// Applies a signed stock delta and returns the resulting quantity.
    #[instrument(skip(self), fields(collection = %self.path))]
    pub async fn adjust(&self, id: &T::Id, delta: Decimal) -> ServiceResult<Decimal> {
        let id = id.to_string();
        let url = self.client.url(&self.path, &[&id])?;
        let body = self
            .client
            .send(
                self.client
                    .request(Method::PATCH, url)
                    .json(&serde_json::json!({ "delta": delta })),
            )
            .await?;
        let quantity = match body {
            Value::Object(mut map) => map.remove("existing_quantity").unwrap_or(Value::Null),
            other => other,
        };
        serde_json::from_value(quantity).map_err(|e| {
            ServiceError::Decode(format!("stock adjustment response without quantity: {}", e))
        })
    }

    /// Replaces one named sub-resource of a record.
    #[instrument(skip(self, body), fields(collection = %self.path))]
    pub async fn put_section(&self, id: &T::Id, section: &str, body: &Value) -> ServiceResult<()> {
        let id = id.to_string();
        let url = self.client.url(&self.path, &[&id, section])?;
        self.client
            .send(self.client.request(Method::PUT, url).json(body))
            .await
            .map(|_| ())
    }

    pub async fn fetch_document(&self, key: &str, kind: DocumentKind) -> ServiceResult<DocumentLink> {
        let url = self.client.url(&self.path, &[key, kind.as_ref()])?;
        let body = self.client.send(self.client.request(Method::GET, url)).await?;
        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait::async_trait]
impl<T: Record> CollectionSource<T> for RemoteCollection<T> {
    async fn list(&self, query: &ListQuery) -> ServiceResult<Page<T>> {
        self.fetch(query).await
    }
}

#[async_trait::async_trait]
impl<T: Record> DocumentSource for RemoteCollection<T> {
    async fn document(&self, key: &str, kind: DocumentKind) -> ServiceResult<DocumentLink> {
        self.fetch_document(key, kind).await
    }
}

/// Accepts a bare array or `{rows, total}`. Rows that do not match the record
/// shape are dropped and logged rather than failing the whole listing.
pub fn decode_page<T: Record>(collection: &str, body: Value) -> ServiceResult<Page<T>> {
    let (rows, total) = match body {
        Value::Array(rows) => (rows, None),
        Value::Object(mut map) => {
            let rows = match map.remove("rows") {
                Some(Value::Array(rows)) => rows,
                _ => {
                    return Err(ServiceError::Decode(format!(
                        "listing of {} has no rows array",
                        collection
                    )))
                }
            };
            let total = map.get("total").and_then(Value::as_u64);
            (rows, total)
        }
        Value::Null => (Vec::new(), None),
        other => {
            return Err(ServiceError::Decode(format!(
                "unexpected listing payload for {}: {}",
                collection, other
            )))
        }
    };

    let mut decoded = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        match serde_json::from_value::<T>(row) {
            Ok(record) => decoded.push(record),
            Err(e) => warn!(collection, index, error = %e, "dropping malformed row"),
        }
    }
    Ok(Page {
        rows: decoded,
        total,
    })
}

fn decode_created<T: Record>(body: Value) -> Created<T> {
    let id = body
        .get("id")
        .cloned()
        .and_then(|id| serde_json::from_value::<T::Id>(id).ok());
    let record = serde_json::from_value::<T>(body).ok();
    Created { id, record }
}
