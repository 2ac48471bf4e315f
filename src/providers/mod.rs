//! Proxy list providers.

mod free_proxy_list;
mod proxyscrape;

pub use free_proxy_list::FreeProxyList;
pub use proxyscrape::ProxyScrape;

use std::sync::Arc;

use crate::fetcher::PageFetcher;
use crate::proxy::ProxyProvider;

/// The built-in providers, queried when no proxy cache exists.
pub fn default_providers(fetcher: Arc<dyn PageFetcher>) -> Vec<Arc<dyn ProxyProvider>> {
    vec![
        Arc::new(ProxyScrape::new(Arc::clone(&fetcher))),
        Arc::new(FreeProxyList::new(fetcher)),
    ]
}
