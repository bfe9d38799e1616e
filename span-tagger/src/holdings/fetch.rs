//! Holdings download
//!
//! [`Fetch`] is the seam between the cache and the network so the cache can
//! be exercised without HTTP. [`HttpFetcher`] retries transient failures
//! with exponential backoff.

use async_trait::async_trait;
use span_common::{Error, Result};
use std::time::Duration;

use crate::utils::{retry_with_backoff, RetryPolicy};

const USER_AGENT: &str = concat!("span/", env!("CARGO_PKG_VERSION"));

/// Retrieve the bytes behind a link
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, link: &str) -> Result<Vec<u8>>;
}

/// HTTP client for holdings links
pub struct HttpFetcher {
    http_client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            policy,
        })
    }

    async fn fetch_once(&self, link: &str) -> Result<Vec<u8>> {
        tracing::debug!(link, "Downloading holdings file");

        let network = |e: reqwest::Error| Error::Network {
            link: link.to_string(),
            message: e.to_string(),
        };

        let response = self.http_client.get(link).send().await.map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                link: link.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(network)?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, link: &str) -> Result<Vec<u8>> {
        retry_with_backoff("holdings download", link, &self.policy, || {
            self.fetch_once(link)
        })
        .await
    }
}
