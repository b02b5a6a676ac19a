//! Durable store backed by a site-scoped HTTP blob API.
//!
//! Layout: `{api_url}/{site_id}/{store_name}/{key}`. `GET` reads a blob, `PUT`
//! writes one, a 404 on read is a missing key.

use crate::backend::{KeyValueStore, StoreError};
use crate::config::{DurableStoreConfig, Environment};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpBlobStore {
    /// Fails when no site identifier can be resolved from config or environment.
    pub fn new(config: &DurableStoreConfig, env: &dyn Environment) -> Result<Self, StoreError> {
        let site_id = config
            .site_id
            .clone()
            .or_else(|| env.var("SITE_ID"))
            .filter(|id| !id.is_empty())
            .ok_or(StoreError::MissingSiteId)?;

        let token = config
            .token
            .clone()
            .or_else(|| env.var("NETLIFY_AUTH_TOKEN"))
            .or_else(|| env.var("NETLIFY_API_TOKEN"))
            .filter(|t| !t.is_empty());

        if token.is_none() {
            tracing::warn!("no auth token for the durable store, requests are unauthenticated");
        }

        let mut base_url =
            Url::parse(&config.api_url).map_err(|e| StoreError::InvalidUrl(e.to_string()))?;
        base_url
            .path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(config.api_url.clone()))?
            .pop_if_empty()
            .push(&site_id)
            .push(&config.store_name);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        tracing::info!(%site_id, store = %config.store_name, "created durable blob store");

        Ok(HttpBlobStore {
            client,
            base_url,
            token,
        })
    }

    // The key is pushed as one segment, so `/` inside a key is percent-encoded.
    fn key_url(&self, key: &str) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.base_url.to_string()))?
            .push(key);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl KeyValueStore for HttpBlobStore {
    fn name(&self) -> &'static str {
        "blob"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let url = self.key_url(key)?;
        let response = self.authorize(self.client.get(url)).send().await?;

        match response.status() {
            status if status.is_success() => Ok(Some(response.text().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(StoreError::UnexpectedStatus {
                key: key.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let url = self.key_url(key)?;
        let response = self
            .authorize(self.client.put(url))
            .body(value.to_string())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::UnexpectedStatus {
                key: key.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
