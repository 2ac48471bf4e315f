//! ProxyScrape plain-text proxy list.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::DEFAULT_USER_AGENT;
use crate::fetcher::PageFetcher;
use crate::proxy::{parse_proxy_list, Proxy, ProxyProvider};
use crate::{DorkError, Result};

const PROXYSCRAPE_URL: &str = "https://api.proxyscrape.com/v2/?request=getproxies&protocol=http&timeout=10000&country=all&ssl=all&anonymity=all&limit=5000";

/// HTTP proxies from the ProxyScrape API, one `host:port` per line.
pub struct ProxyScrape {
    fetcher: Arc<dyn PageFetcher>,
    url: String,
}

impl ProxyScrape {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            url: PROXYSCRAPE_URL.to_string(),
        }
    }

    /// Overrides the list URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl ProxyProvider for ProxyScrape {
    fn name(&self) -> &str {
        "ProxyScrape"
    }

    async fn fetch_proxies(&self) -> Result<Vec<Proxy>> {
        let page = self
            .fetcher
            .fetch(&self.url, None, DEFAULT_USER_AGENT)
            .await
            .map_err(|e| DorkError::ProviderFetch {
                provider: self.name().to_string(),
                reason: e.to_string(),
            })?;

        if !page.is_success() {
            return Err(DorkError::ProviderFetch {
                provider: self.name().to_string(),
                reason: format!("status {}", page.status),
            });
        }

        Ok(parse_proxy_list(&page.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::Page;

    struct StubFetcher(std::result::Result<Page, String>);

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &str, proxy: Option<&Proxy>, _ua: &str) -> Result<Page> {
            assert!(proxy.is_none());
            assert!(url.starts_with("https://api.proxyscrape.com/") || url.starts_with("http://mirror.example/"));
            self.0.clone().map_err(DorkError::Transport)
        }
    }

    #[tokio::test]
    async fn test_fetch_parses_lines() {
        let provider = ProxyScrape::new(Arc::new(StubFetcher(Ok(Page::new(
            200,
            "1.2.3.4:80\r\n5.6.7.8:3128\r\n\r\n",
        )))));
        let proxies = provider.fetch_proxies().await.unwrap();
        assert_eq!(proxies, vec![Proxy::new("1.2.3.4", 80), Proxy::new("5.6.7.8", 3128)]);
    }

    #[tokio::test]
    async fn test_fetch_bad_status() {
        let provider = ProxyScrape::new(Arc::new(StubFetcher(Ok(Page::new(503, "")))));
        let err = provider.fetch_proxies().await.unwrap_err();
        assert!(matches!(err, DorkError::ProviderFetch { .. }));
        assert!(err.to_string().contains("status 503"));
    }

    #[tokio::test]
    async fn test_fetch_transport_failure() {
        let provider = ProxyScrape::new(Arc::new(StubFetcher(Err("dns failure".into()))));
        let err = provider.fetch_proxies().await.unwrap_err();
        assert!(matches!(err, DorkError::ProviderFetch { .. }));
    }

    #[tokio::test]
    async fn test_fetch_from_custom_url() {
        let provider = ProxyScrape::new(Arc::new(StubFetcher(Ok(Page::new(200, "9.9.9.9:8080")))))
            .with_url("http://mirror.example/proxies.txt");
        let proxies = provider.fetch_proxies().await.unwrap();
        assert_eq!(proxies, vec![Proxy::new("9.9.9.9", 8080)]);
    }
}
