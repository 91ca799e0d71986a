//! OpenSearchStore: the shared document store used in production.
//!
//! Every scaler process in the cluster talks to the same index, which makes
//! the Operation State document visible to whichever process becomes
//! leader next.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{StateError, StateResult};
use crate::store::{DocumentStore, INDEX_NAME, STATE_MAPPING};

/// Document store backed by an OpenSearch index.
#[derive(Debug, Clone)]
pub struct OpenSearchStore {
    http: Client,
    base_url: String,
    index: String,
    username: String,
    password: String,
    timeout: Duration,
}

impl OpenSearchStore {
    /// Build a client for the cluster at `base_url`.
    ///
    /// No request is made until the first store call.
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> StateResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StateError::Open(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: INDEX_NAME.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            timeout,
        })
    }

    /// Use a different index name.
    pub fn with_index(mut self, index: &str) -> Self {
        self.index = index.to_string();
        self
    }

    fn doc_url(&self, key: &str) -> String {
        format!("{}/{}/_doc/{}", self.base_url, self.index, key)
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.base_url, self.index)
    }

    async fn send(&self, request: RequestBuilder) -> StateResult<Response> {
        request
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, e: reqwest::Error) -> StateError {
        if e.is_timeout() {
            StateError::Timeout(self.timeout)
        } else if e.is_decode() {
            StateError::Deserialize(e.to_string())
        } else {
            StateError::Transport(e.to_string())
        }
    }
}

async fn status_error(response: Response) -> StateError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StateError::Status { status, body }
}

#[async_trait]
impl DocumentStore for OpenSearchStore {
    async fn ensure_index(&self) -> StateResult<()> {
        let exists = self.send(self.http.head(self.index_url())).await?;
        if exists.status().is_success() {
            debug!(index = %self.index, "index already exists");
            return Ok(());
        }
        if exists.status() != StatusCode::NOT_FOUND {
            return Err(status_error(exists).await);
        }

        let create = self
            .send(
                self.http
                    .put(self.index_url())
                    .header("content-type", "application/json")
                    .body(STATE_MAPPING),
            )
            .await?;
        if create.status().is_success() {
            info!(index = %self.index, "index created");
            return Ok(());
        }
        match status_error(create).await {
            // Another process created it between the check and the create.
            StateError::Status { body, .. }
                if body.contains("resource_already_exists_exception") =>
            {
                debug!(index = %self.index, "index created concurrently");
                Ok(())
            }
            other => Err(other),
        }
    }

    async fn get(&self, key: &str) -> StateResult<Option<Value>> {
        let response = self.send(self.http.get(self.doc_url(key))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let mut body: Value = response.json().await.map_err(|e| self.transport_error(e))?;
        match body.get_mut("_source") {
            Some(source) => Ok(Some(source.take())),
            None => Err(StateError::Deserialize(format!(
                "document {key} has no _source"
            ))),
        }
    }

    async fn upsert(&self, key: &str, document: &Value) -> StateResult<()> {
        let response = self
            .send(
                self.http
                    .put(self.doc_url(key))
                    .query(&[("refresh", "true")])
                    .json(document),
            )
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        debug!(%key, index = %self.index, "document stored");
        Ok(())
    }
}
