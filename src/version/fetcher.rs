//! HTTP JSON fetching with bounded retries on malformed bodies

use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{FETCH_MAX_RETRIES, FETCH_TIMEOUT_MS};
use crate::version::error::FetchError;

const USER_AGENT: &str = concat!("pkgmeta/", env!("CARGO_PKG_VERSION"));

/// Trait for fetching a JSON document from a URL
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait JsonFetcher: Send + Sync {
    /// Fetches `url` and decodes the body as JSON
    ///
    /// # Returns
    /// * `Ok(Value)` - The decoded body of a successful response
    /// * `Err(FetchError::Status)` - Non-success status with the raw body
    /// * `Err(FetchError::Timeout)` - The attempt exceeded its time bound
    /// * `Err(FetchError::Parse)` - Every attempt returned a malformed body
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError>;
}

/// `reqwest`-backed fetcher retrying only on malformed JSON bodies
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: usize,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_headers(HeaderMap::new())
    }

    /// Creates a fetcher sending `headers` with every request
    pub fn with_headers(headers: HeaderMap) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            // Building only fails when the TLS backend cannot initialise
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            timeout: Duration::from_millis(FETCH_TIMEOUT_MS),
            max_retries: FETCH_MAX_RETRIES,
        }
    }

    /// Creates a fetcher for the GitHub REST API
    pub fn github(token: Option<&str>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Some(token) = token {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(e) => warn!("Ignoring GitHub token with invalid characters: {}", e),
            }
        }
        Self::with_headers(headers)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch_once(&self, url: &str) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| FetchError::Parse(e.to_string()))
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl JsonFetcher for HttpFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        let mut attempt = 0;
        loop {
            debug!("Fetching {} (attempt {})", url, attempt + 1);
            match self.fetch_once(url).await {
                Err(FetchError::Parse(e)) if attempt < self.max_retries => {
                    warn!("Malformed JSON from {}, retrying: {}", url, e);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
