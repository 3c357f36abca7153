//! Firestore REST API client.
//!
//! One authorized-request helper carries the token cache, the
//! expired-token retry and error mapping for every verb; the public
//! operations are thin wrappers over it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, Method, StatusCode};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::token_cache::TokenCache;
use crate::types::{Document, RunQueryRequest, RunQueryResponse, StructuredQuery, Value};

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                StoreError::auth_error("GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set")
            })?;

        if project_id.is_empty() {
            return Err(StoreError::auth_error("GCP_PROJECT_ID cannot be empty"));
        }

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
        })
    }
}

/// Firestore REST API client.
pub struct StoreClient {
    http: Client,
    base_url: String,
    token_cache: Arc<TokenCache>,
}

impl Clone for StoreClient {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token_cache: Arc::clone(&self.token_cache),
        }
    }
}

impl StoreClient {
    /// Create a new client.
    pub async fn new(config: StoreConfig) -> StoreResult<Self> {
        let auth = Self::create_auth_provider()?;

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("ephem-store/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StoreError::Network)?;

        let base_url = format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/{}/documents",
            config.project_id, config.database_id
        );

        Ok(Self {
            http,
            base_url,
            token_cache: Arc::new(TokenCache::new(auth)),
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StoreResult<Self> {
        Self::new(StoreConfig::from_env()?).await
    }

    fn create_auth_provider() -> StoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env()
            .map_err(|e| StoreError::auth_error(format!("Failed to load service account: {e}")))?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(StoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set",
            )),
        }
    }

    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    /// Send an authorized request, retrying once after an expired-token 401.
    async fn send_authorized(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> StoreResult<(StatusCode, String)> {
        let mut token = self.token_cache.get_token().await?;

        for attempt in 0..2 {
            let mut req = self.http.request(method.clone(), url).bearer_auth(&token);
            if let Some(json) = body {
                req = req.json(json);
            }
            let response = req.send().await?;
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            if status == StatusCode::UNAUTHORIZED
                && attempt == 0
                && Self::is_access_token_expired(&text)
            {
                self.token_cache.invalidate().await;
                token = self.token_cache.get_token().await?;
                continue;
            }
            return Ok((status, text));
        }
        unreachable!("send_authorized loop always returns")
    }

    fn parse_document(text: &str) -> StoreResult<Document> {
        serde_json::from_str(text).map_err(StoreError::Json)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Get a document. Returns `None` when it does not exist.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> StoreResult<Option<Document>> {
        let url = self.document_path(collection, doc_id);
        let (status, text) = self.send_authorized(Method::GET, &url, None).await?;

        match status {
            StatusCode::OK => Ok(Some(Self::parse_document(&text)?)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(StoreError::from_http_status(
                status.as_u16(),
                format!("{url} failed: {text}"),
            )),
        }
    }

    /// Create a document; fails if it already exists.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> StoreResult<Document> {
        let url = format!("{}/{}?documentId={}", self.base_url, collection, doc_id);
        let body = serde_json::to_value(Document::new(fields))?;
        let (status, text) = self.send_authorized(Method::POST, &url, Some(&body)).await?;

        match status {
            StatusCode::OK | StatusCode::CREATED => Self::parse_document(&text),
            StatusCode::CONFLICT => {
                Err(StoreError::AlreadyExists(format!("{collection}/{doc_id}")))
            }
            _ => Err(StoreError::from_http_status(
                status.as_u16(),
                format!("{url} failed: {text}"),
            )),
        }
    }

    /// Patch a document, merging only the masked fields.
    ///
    /// When `update_time` is given the write carries a precondition and
    /// fails with [`StoreError::PreconditionFailed`] if the document changed
    /// since that time. This backs the compare-and-set state transitions.
    pub async fn patch_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Vec<String>,
        update_time: Option<&str>,
    ) -> StoreResult<Document> {
        let mut params: Vec<String> = update_mask
            .iter()
            .map(|f| format!("updateMask.fieldPaths={f}"))
            .collect();
        if let Some(ts) = update_time {
            params.push(format!(
                "currentDocument.updateTime={}",
                urlencoding::encode(ts)
            ));
        }
        let url = format!(
            "{}?{}",
            self.document_path(collection, doc_id),
            params.join("&")
        );

        let body = serde_json::to_value(Document::new(fields))?;
        let (status, text) = self
            .send_authorized(Method::PATCH, &url, Some(&body))
            .await?;

        match status {
            StatusCode::OK => Self::parse_document(&text),
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => Err(
                StoreError::PreconditionFailed(format!("{collection}/{doc_id}: {text}")),
            ),
            StatusCode::NOT_FOUND => Err(StoreError::not_found(format!("{collection}/{doc_id}"))),
            _ => Err(StoreError::from_http_status(
                status.as_u16(),
                format!("{url} failed: {text}"),
            )),
        }
    }

    /// Delete a document. Deleting an absent document is not an error.
    pub async fn delete_document(&self, collection: &str, doc_id: &str) -> StoreResult<()> {
        let url = self.document_path(collection, doc_id);
        let (status, text) = self.send_authorized(Method::DELETE, &url, None).await?;

        match status {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!("document {collection}/{doc_id} already deleted");
                Ok(())
            }
            _ => Err(StoreError::from_http_status(
                status.as_u16(),
                format!("{url} failed: {text}"),
            )),
        }
    }

    /// Run a structured query against a top-level collection.
    pub async fn run_query(&self, query: StructuredQuery) -> StoreResult<Vec<Document>> {
        let url = format!("{}:runQuery", self.base_url);
        let body = serde_json::to_value(RunQueryRequest {
            structured_query: query,
        })?;
        let (status, text) = self.send_authorized(Method::POST, &url, Some(&body)).await?;

        if status != StatusCode::OK {
            return Err(StoreError::from_http_status(
                status.as_u16(),
                format!("{url} failed: {text}"),
            ));
        }

        // runQuery returns a JSON array of per-document responses
        let responses: Vec<RunQueryResponse> = serde_json::from_str(&text).map_err(|e| {
            StoreError::request_failed(format!(
                "failed to parse runQuery response: {e} (body prefix: {})",
                body_prefix(&text)
            ))
        })?;

        Ok(responses.into_iter().filter_map(|r| r.document).collect())
    }
}

/// First 200 characters of a response body, for error messages. Truncates
/// on character boundaries, so multibyte error bodies are safe.
fn body_prefix(text: &str) -> String {
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_prefix_respects_char_boundaries() {
        let body = "é".repeat(300);
        let prefix = body_prefix(&body);
        assert_eq!(prefix.chars().count(), 200);
        assert!(body.starts_with(&prefix));
    }

    #[test]
    fn test_body_prefix_short_body_unchanged() {
        assert_eq!(body_prefix("oops"), "oops");
    }
}
