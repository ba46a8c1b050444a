//! reqwest-backed HTTP request helper

use std::time::Duration;

use async_trait::async_trait;

use super::{HttpClient, HttpResponse};
use crate::error::Result;

/// Timeout for individual gateway requests
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Build a client with a cookie store, so the gateway's session cookie is
    /// replayed on every request
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn into_response(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(name = "http.get", skip(self))]
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self.client.get(url).send().await?;
        Self::into_response(response).await
    }

    #[tracing::instrument(name = "http.post", skip(self, body))]
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse> {
        let response = self.client.post(url).json(body).send().await?;
        Self::into_response(response).await
    }
}
