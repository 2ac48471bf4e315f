//! Single search request through a proxy, plus result-link extraction.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::fetcher::PageFetcher;
use crate::proxy::Proxy;
use crate::{DorkError, Result};

/// Google web search endpoint.
pub const SEARCH_URL: &str = "https://www.google.com/search";

/// Anchors of organic results on Google's result page.
pub const RESULT_LINK_SELECTOR: &str = ".yuRUbf a";

static TRANSLATE_WRAPPER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://translate\.google\.com/translate\?.*?&u=")
        .expect("translate wrapper pattern is valid")
});

/// Removes the Google Translate passthrough prefix from `url`, if present.
pub fn strip_translate_wrapper(url: &str) -> String {
    TRANSLATE_WRAPPER.replace_all(url, "").into_owned()
}

/// Unwraps Google's `/url?q=` redirect and the translate passthrough.
pub fn normalize_link(href: &str) -> String {
    let href = href.trim();
    let unwrapped = match href.strip_prefix("/url?q=") {
        Some(rest) => {
            let target = rest.split('&').next().unwrap_or(rest);
            urlencoding::decode(target)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| target.to_string())
        }
        None => href.to_string(),
    };
    strip_translate_wrapper(&unwrapped)
}

fn looks_blocked(html: &str) -> bool {
    html.contains("/sorry/index") || html.contains("recaptcha")
}

/// Issues one search for a dork through a given proxy.
pub struct SearchClient {
    fetcher: Arc<dyn PageFetcher>,
    num_results: usize,
    selector: String,
}

impl SearchClient {
    /// Creates a client keeping at most `num_results` links per search.
    pub fn new(fetcher: Arc<dyn PageFetcher>, num_results: usize) -> Self {
        Self {
            fetcher,
            num_results,
            selector: RESULT_LINK_SELECTOR.to_string(),
        }
    }

    /// Overrides the result-anchor selector.
    pub fn with_selector(mut self, css: impl Into<String>) -> Self {
        self.selector = css.into();
        self
    }

    pub fn num_results(&self) -> usize {
        self.num_results
    }

    /// Search URL for `dork`.
    pub fn query_url(dork: &str) -> String {
        format!("{}?q={}", SEARCH_URL, urlencoding::encode(dork))
    }

    /// Runs one search through `proxy`.
    ///
    /// Returns `Err` only when no response arrived. A non-success status
    /// yields an empty list.
    pub async fn search(&self, dork: &str, proxy: &Proxy, user_agent: &str) -> Result<Vec<String>> {
        let url = Self::query_url(dork);
        let page = self.fetcher.fetch(&url, Some(proxy), user_agent).await?;

        if !page.is_success() {
            debug!("Search for '{}' via {} returned status {}", dork, proxy, page.status);
            return Ok(Vec::new());
        }

        if looks_blocked(&page.body) {
            warn!("Search for '{}' via {} hit a bot-check page", dork, proxy);
        }

        self.extract_links(&page.body)
    }

    /// Extracts, truncates and normalizes result links from a result page.
    pub fn extract_links(&self, html: &str) -> Result<Vec<String>> {
        let document = Html::parse_document(html);
        let selector = Selector::parse(&self.selector)
            .map_err(|e| DorkError::Parse(format!("Failed to parse selector: {:?}", e)))?;

        Ok(document
            .select(&selector)
            .filter_map(|anchor| anchor.value().attr("href"))
            .filter(|href| !href.trim().is_empty())
            .take(self.num_results)
            .map(normalize_link)
            .collect())
    }
}
