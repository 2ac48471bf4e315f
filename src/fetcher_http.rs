//! HTTP-based page fetcher using reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Proxy as ReqwestProxy};
use tracing::debug;

use crate::fetcher::{Page, PageFetcher};
use crate::proxy::Proxy;
use crate::{DorkError, Result};

/// A page fetcher that builds one reqwest client per request, bound to the
/// request's proxy and user agent.
///
/// Free proxies use the short request timeout. The paid gateway re-signs TLS
/// traffic, so its client skips certificate verification and gets the longer
/// paid timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
    paid_timeout: Duration,
}

impl HttpFetcher {
    /// Creates an `HttpFetcher` with a 4s free-proxy timeout and 60s paid timeout.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(4),
            paid_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_paid_timeout(mut self, timeout: Duration) -> Self {
        self.paid_timeout = timeout;
        self
    }

    fn client_for(&self, proxy: Option<&Proxy>, user_agent: &str) -> Result<Client> {
        let mut builder = Client::builder()
            .user_agent(user_agent)
            .timeout(self.timeout);

        if let Some(proxy) = proxy {
            debug!("Using proxy: {}", proxy);
            let reqwest_proxy = ReqwestProxy::all(proxy.url())
                .map_err(|e| DorkError::Transport(format!("Failed to create proxy: {}", e)))?;
            builder = builder.proxy(reqwest_proxy);

            if proxy.is_paid() {
                builder = builder
                    .timeout(self.paid_timeout)
                    .danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| DorkError::Transport(format!("Failed to create HTTP client: {}", e)))
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, proxy: Option<&Proxy>, user_agent: &str) -> Result<Page> {
        let client = self.client_for(proxy, user_agent)?;
        let response = client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(Page { status, body })
    }

    async fn probe(&self, url: &str, proxy: Option<&Proxy>, user_agent: &str) -> Result<u16> {
        let client = self.client_for(proxy, user_agent)?;
        let response = client.get(url).send().await?;
        Ok(response.status().as_u16())
    }
}
