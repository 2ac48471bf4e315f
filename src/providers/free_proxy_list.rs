//! free-proxy-list.net HTML table.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;

use crate::agents::DEFAULT_USER_AGENT;
use crate::fetcher::PageFetcher;
use crate::proxy::{Proxy, ProxyProvider};
use crate::{DorkError, Result};

const FREE_PROXY_LIST_URL: &str = "https://free-proxy-list.net/";

/// Proxies scraped from the table on free-proxy-list.net.
///
/// The table has moved between layouts over time; rows are taken from the
/// historical `#proxylisttable` and from the current `.fpl-list` wrapper.
pub struct FreeProxyList {
    fetcher: Arc<dyn PageFetcher>,
    url: String,
}

impl FreeProxyList {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            url: FREE_PROXY_LIST_URL.to_string(),
        }
    }

    /// Overrides the page URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn parse_table(&self, html: &str) -> Result<Vec<Proxy>> {
        let document = Html::parse_document(html);
        let row_selector = Selector::parse("#proxylisttable tbody tr, .fpl-list table tbody tr")
            .map_err(|e| DorkError::Parse(format!("Failed to parse selector: {:?}", e)))?;
        let cell_selector = Selector::parse("td")
            .map_err(|e| DorkError::Parse(format!("Failed to parse selector: {:?}", e)))?;

        let mut proxies = Vec::new();
        for row in document.select(&row_selector) {
            let cells: Vec<String> = row
                .select(&cell_selector)
                .take(2)
                .map(|cell| cell.text().collect::<String>().trim().to_string())
                .collect();

            let [ip, port] = cells.as_slice() else {
                continue;
            };

            match Proxy::parse(&format!("{}:{}", ip, port)) {
                Ok(proxy) => proxies.push(proxy),
                Err(e) => debug!("Skipping proxy row: {}", e),
            }
        }

        Ok(proxies)
    }
}

#[async_trait]
impl ProxyProvider for FreeProxyList {
    fn name(&self) -> &str {
        "FreeProxyList"
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

        self.parse_table(&page.body)
    }
}
