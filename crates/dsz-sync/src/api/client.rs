//! HTTP API client for the Dropshipzone API
//!
//! Sends exactly one request per call and hands back the raw status, the
//! `retry-after` header and the body text. Classification (retry, refresh,
//! fail) is done by the callers.

use crate::api::{endpoints, types::AuthRequest};
use crate::config::SyncConfig;
use crate::error::Result;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Response};
use std::time::Duration;

/// Status, rate-limit hint and body of one HTTP exchange
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// Raw `retry-after` header value, if present
    pub retry_after: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// API client for the auth and catalog endpoints
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Create from a loaded configuration
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Self::new(
            config.api.base_url.trim(),
            &config.api.user_agent,
            config.sync.timeout(),
        )
    }

    /// POST credentials to the auth endpoint
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<RawResponse, reqwest::Error> {
        let url = endpoints::auth_url(&self.base_url);
        let request = AuthRequest { email, password };

        let response = self.client.post(&url).json(&request).send().await?;
        Self::read(response).await
    }

    /// GET one catalog page
    pub async fn get_products(
        &self,
        page: u32,
        limit: u32,
        token: &str,
    ) -> std::result::Result<RawResponse, reqwest::Error> {
        let url = endpoints::products_url(&self.base_url, page, limit);

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("jwt {}", token))
            .send()
            .await?;
        Self::read(response).await
    }

    async fn read(response: Response) -> std::result::Result<RawResponse, reqwest::Error> {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string());
        let body = response.text().await?;

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
