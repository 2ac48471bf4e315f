//! Page fetcher abstraction for proxied HTTP requests.

use async_trait::async_trait;

use crate::proxy::Proxy;
use crate::Result;

/// A fetched page: status code plus body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub status: u16,
    pub body: String,
}

impl Page {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// True for 2xx responses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for fetching a URL, optionally through a proxy.
///
/// An `Err` means the request never produced a response (timeout, refused
/// connection, proxy failure). Any response, whatever its status, is `Ok`.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url` with the given user agent, routed through `proxy` if set.
    async fn fetch(&self, url: &str, proxy: Option<&Proxy>, user_agent: &str) -> Result<Page>;

    /// Fetches only the status code. Implementations may skip reading the body.
    async fn probe(&self, url: &str, proxy: Option<&Proxy>, user_agent: &str) -> Result<u16> {
        Ok(self.fetch(url, proxy, user_agent).await?.status)
    }
}
