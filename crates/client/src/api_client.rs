//! HTTP client for the resource API.
//!
//! Every endpoint answers with the `{success, data, message}` envelope;
//! [`ApiClient`] unwraps it so callers deal in records or [`ApiError`].
//! Records are validated here, at the fetch boundary, by deserializing into
//! their typed shape.

use std::marker::PhantomData;

use async_trait::async_trait;
use labgate_shared::{ApiError, ApiResponse, Record, ScanResult};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Resource paths relative to the API base.
pub mod paths {
    pub const CARDS: &str = "/api/cards";
    pub const ACCESS_LOGS: &str = "/api/access-logs";
    pub const LABS: &str = "/api/labs";
    pub const CLASSES: &str = "/api/classes";
    pub const USERS: &str = "/api/users";
    pub const LATEST_SCAN: &str = "/api/cards/scan/latest";
}

/// HTTP client for making authenticated API requests.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            token: None,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attach a bearer credential to every request
    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    fn authorize(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    /// Send the request and return the raw body of a 2xx response.
    async fn execute(&self, rb: RequestBuilder) -> Result<String, ApiError> {
        let resp = self
            .authorize(rb)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }
        Ok(text)
    }

    /// GET and unwrap the envelope
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<Option<TRes>, ApiError> {
        let text = self.execute(self.client.get(self.url(path))).await?;
        unwrap_envelope(&text)
    }

    /// POST a JSON body and unwrap the envelope
    pub async fn post_json<TReq: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<Option<TRes>, ApiError> {
        let text = self
            .execute(self.client.post(self.url(path)).json(body))
            .await?;
        unwrap_envelope(&text)
    }

    /// PUT a JSON body and unwrap the envelope
    pub async fn put_json<TReq: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<Option<TRes>, ApiError> {
        let text = self
            .execute(self.client.put(self.url(path)).json(body))
            .await?;
        unwrap_envelope(&text)
    }

    /// DELETE and check the envelope
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let text = self.execute(self.client.delete(self.url(path))).await?;
        unwrap_envelope::<Value>(&text).map(|_| ())
    }

    /// Typed access to one resource collection.
    pub fn resource<R: Record>(&self, path: &str) -> HttpResource<R> {
        HttpResource {
            client: self.clone(),
            path: path.trim_end_matches('/').to_string(),
            _record: PhantomData,
        }
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode `{success, data, message}`. An empty body counts as success
/// without data.
pub fn unwrap_envelope<T: DeserializeOwned>(text: &str) -> Result<Option<T>, ApiError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let envelope: ApiResponse<T> =
        serde_json::from_str(text).map_err(|e| ApiError::Deserialize(e.to_string()))?;
    if !envelope.success {
        return Err(ApiError::Rejected {
            message: envelope
                .message
                .unwrap_or_else(|| "request was rejected".to_string()),
        });
    }
    Ok(envelope.data)
}

/// Request/response operations for one resource type.
#[async_trait]
pub trait ResourceApi<R: Record>: Send + Sync {
    async fn list(&self) -> Result<Vec<R>, ApiError>;
    async fn get(&self, id: &R::Id) -> Result<R, ApiError>;
    async fn create(&self, body: &Value) -> Result<R, ApiError>;
    /// Returns the updated record when the server echoes it.
    async fn update(&self, id: &R::Id, body: &Value) -> Result<Option<R>, ApiError>;
    async fn delete(&self, id: &R::Id) -> Result<(), ApiError>;
    /// Remove every record of this type in one request.
    async fn delete_all(&self) -> Result<(), ApiError>;
}

/// Source of the most recent tag read at the enrollment reader.
#[async_trait]
pub trait ScanSource: Send + Sync {
    async fn latest_scan(&self) -> Result<Option<ScanResult>, ApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpResource<R> {
    client: ApiClient,
    path: String,
    _record: PhantomData<fn() -> R>,
}

impl<R> HttpResource<R> {
    fn item_path(&self, id: &impl std::fmt::Display) -> String {
        format!("{}/{}", self.path, id)
    }
}

#[async_trait]
impl<R: Record> ResourceApi<R> for HttpResource<R> {
    async fn list(&self) -> Result<Vec<R>, ApiError> {
        Ok(self.client.get_json(&self.path).await?.unwrap_or_default())
    }

    async fn get(&self, id: &R::Id) -> Result<R, ApiError> {
        self.client
            .get_json(&self.item_path(id))
            .await?
            .ok_or(ApiError::MissingData)
    }

    async fn create(&self, body: &Value) -> Result<R, ApiError> {
        self.client
            .post_json(&self.path, body)
            .await?
            .ok_or(ApiError::MissingData)
    }

    async fn update(&self, id: &R::Id, body: &Value) -> Result<Option<R>, ApiError> {
        self.client.put_json(&self.item_path(id), body).await
    }

    async fn delete(&self, id: &R::Id) -> Result<(), ApiError> {
        self.client.delete(&self.item_path(id)).await
    }

    async fn delete_all(&self) -> Result<(), ApiError> {
        self.client.delete(&format!("{}/all", self.path)).await
    }
}

#[async_trait]
impl ScanSource for ApiClient {
    async fn latest_scan(&self) -> Result<Option<ScanResult>, ApiError> {
        self.get_json(paths::LATEST_SCAN).await
    }
}
