//! Proxy pool: loading, health-checking and random selection.
//!
//! Free proxies come from a persisted cache or from the configured
//! [`ProxyProvider`]s, are probed once at startup, and then form an
//! immutable pool. The paid gateway is a [`Proxy`] tagged [`ProxyKind::Paid`]
//! and is never probed.

use std::collections::BTreeSet;
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::agents::UserAgents;
use crate::fetcher::PageFetcher;
use crate::store::write_atomic;
use crate::{DorkError, Result};

/// Host of the paid scraping gateway.
pub const PAID_GATEWAY_HOST: &str = "proxy-server.scraperapi.com";
/// Port of the paid scraping gateway.
pub const PAID_GATEWAY_PORT: u16 = 8001;
const PAID_GATEWAY_USER: &str = "scraperapi";

/// Proxy protocol type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ProxyProtocol {
    /// HTTP proxy
    #[default]
    Http,
    /// HTTPS proxy
    Https,
    /// SOCKS5 proxy
    Socks5,
}

impl ProxyProtocol {
    fn scheme(self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks5 => "socks5",
        }
    }

    fn from_scheme(scheme: &str) -> Result<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyProtocol::Http),
            "https" => Ok(ProxyProtocol::Https),
            "socks5" => Ok(ProxyProtocol::Socks5),
            other => Err(DorkError::InvalidProxy(format!(
                "unsupported proxy protocol: {}",
                other
            ))),
        }
    }
}

/// Whether a proxy is a free candidate or the credentialed paid gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ProxyKind {
    #[default]
    Free,
    Paid,
}

/// A single proxy endpoint.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Proxy {
    /// Proxy host (IP or domain)
    pub host: String,
    /// Proxy port
    pub port: u16,
    /// Free or paid; fixed at construction
    pub kind: ProxyKind,
    /// Proxy protocol
    pub protocol: ProxyProtocol,
    /// Optional username for authentication
    pub username: Option<String>,
    /// Optional password for authentication
    pub password: Option<String>,
}

impl Proxy {
    /// Creates a free HTTP proxy.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            kind: ProxyKind::Free,
            protocol: ProxyProtocol::Http,
            username: None,
            password: None,
        }
    }

    /// The paid gateway endpoint, authenticated with `api_key`.
    pub fn paid_gateway(api_key: &str) -> Self {
        Self {
            host: PAID_GATEWAY_HOST.to_string(),
            port: PAID_GATEWAY_PORT,
            kind: ProxyKind::Paid,
            protocol: ProxyProtocol::Http,
            username: Some(PAID_GATEWAY_USER.to_string()),
            password: Some(api_key.to_string()),
        }
    }

    /// Parses `host:port`, optionally prefixed with `http://`, `https://` or `socks5://`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (protocol, rest) = match input.split_once("://") {
            Some((scheme, rest)) => (ProxyProtocol::from_scheme(scheme)?, rest),
            None => (ProxyProtocol::Http, input),
        };

        let (host, port) = rest
            .trim_end_matches('/')
            .rsplit_once(':')
            .ok_or_else(|| DorkError::InvalidProxy(input.to_string()))?;

        if host.is_empty()
            || host.contains(|c: char| c.is_whitespace() || c == '/' || c == '@')
        {
            return Err(DorkError::InvalidProxy(input.to_string()));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| DorkError::InvalidProxy(input.to_string()))?;
        if port == 0 {
            return Err(DorkError::InvalidProxy(input.to_string()));
        }

        Ok(Proxy::new(host, port).with_protocol(protocol))
    }

    /// Sets the proxy protocol.
    pub fn with_protocol(mut self, protocol: ProxyProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn is_paid(&self) -> bool {
        self.kind == ProxyKind::Paid
    }

    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the proxy URL string, credentials included.
    pub fn url(&self) -> String {
        let scheme = self.protocol.scheme();
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                format!("{}://{}:{}@{}:{}", scheme, user, pass, self.host, self.port)
            }
            _ => format!("{}://{}:{}", scheme, self.host, self.port),
        }
    }

    /// Line written to the proxy cache; the scheme is omitted for plain HTTP.
    pub fn cache_line(&self) -> String {
        match self.protocol {
            ProxyProtocol::Http => self.address(),
            protocol => format!("{}://{}", protocol.scheme(), self.address()),
        }
    }
}

// Credentials stay out of logs.
impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ProxyKind::Free => write!(f, "{}", self.cache_line()),
            ProxyKind::Paid => write!(f, "paid gateway {}", self.address()),
        }
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("kind", &self.kind)
            .field("protocol", &self.protocol)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Parses a newline-separated proxy list, skipping lines that do not parse.
pub fn parse_proxy_list(text: &str) -> Vec<Proxy> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match Proxy::parse(line) {
            Ok(proxy) => Some(proxy),
            Err(e) => {
                debug!("Skipping proxy line: {}", e);
                None
            }
        })
        .collect()
}

/// Trait for sources of candidate proxies.
#[async_trait]
pub trait ProxyProvider: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Fetches a list of candidate proxies.
    async fn fetch_proxies(&self) -> Result<Vec<Proxy>>;
}

/// A static proxy provider that returns a fixed list of proxies.
pub struct StaticProxyProvider {
    name: String,
    proxies: Vec<Proxy>,
}

impl StaticProxyProvider {
    /// Creates a new static proxy provider.
    pub fn new(name: impl Into<String>, proxies: Vec<Proxy>) -> Self {
        Self {
            name: name.into(),
            proxies,
        }
    }
}

#[async_trait]
impl ProxyProvider for StaticProxyProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_proxies(&self) -> Result<Vec<Proxy>> {
        Ok(self.proxies.clone())
    }
}

/// Settings for the startup health check.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Known-stable reachability target.
    pub url: String,
    /// Per-probe deadline.
    pub timeout: Duration,
    /// Concurrent probes.
    pub concurrency: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: "https://bing.com/".to_string(),
            timeout: Duration::from_secs(4),
            concurrency: 100,
        }
    }
}

/// The validated, immutable set of proxies used for searching.
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    proxies: Vec<Proxy>,
}

impl ProxyPool {
    /// Creates a pool over an already-validated proxy list.
    pub fn with_proxies(proxies: Vec<Proxy>) -> Self {
        Self { proxies }
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn proxies(&self) -> &[Proxy] {
        &self.proxies
    }

    /// Picks a proxy uniformly at random.
    ///
    /// When `exclude` is in the pool and the pool has other entries, the pick
    /// is uniform over the remaining ones instead.
    pub fn choose(&self, exclude: Option<&Proxy>) -> Option<&Proxy> {
        let len = self.proxies.len();
        if len == 0 {
            return None;
        }

        let mut rng = rand::thread_rng();
        let skip = exclude
            .filter(|_| len > 1)
            .and_then(|last| self.proxies.iter().position(|p| p == last));

        let index = match skip {
            Some(skip) => {
                let index = rng.gen_range(0..len - 1);
                if index >= skip {
                    index + 1
                } else {
                    index
                }
            }
            None => rng.gen_range(0..len),
        };

        self.proxies.get(index)
    }

    /// Loads candidate proxies from the cache file, or from `providers` when
    /// the cache is missing or empty.
    ///
    /// Providers are queried concurrently; a failing provider contributes no
    /// candidates. The de-duplicated union is written back to `cache`.
    pub async fn load(cache: &Path, providers: &[Arc<dyn ProxyProvider>]) -> Result<Vec<Proxy>> {
        match tokio::fs::read_to_string(cache).await {
            Ok(text) => {
                let proxies = parse_proxy_list(&text);
                if !proxies.is_empty() {
                    info!("Loaded {} proxies from {}", proxies.len(), cache.display());
                    return Ok(dedup(proxies));
                }
                warn!("Proxy cache {} is empty, downloading proxies", cache.display());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No proxy cache at {}, downloading proxies", cache.display());
            }
            Err(e) => return Err(e.into()),
        }

        let fetches = providers.iter().map(|provider| async move {
            (provider.name().to_string(), provider.fetch_proxies().await)
        });

        let mut union = BTreeSet::new();
        for (name, result) in join_all(fetches).await {
            match result {
                Ok(proxies) => {
                    debug!("Provider {} returned {} proxies", name, proxies.len());
                    union.extend(proxies);
                }
                Err(e) => warn!("Provider {} failed: {}", name, e),
            }
        }

        if union.is_empty() {
            return Err(DorkError::NoProxySource);
        }

        let proxies: Vec<Proxy> = union.into_iter().collect();
        let lines: Vec<String> = proxies.iter().map(Proxy::cache_line).collect();
        if let Err(e) = write_atomic(cache, lines.join("\n").as_bytes()).await {
            warn!("Failed to persist proxy cache {}: {}", cache.display(), e);
        } else {
            info!("Saved {} proxies to {}", proxies.len(), cache.display());
        }

        Ok(proxies)
    }

    /// Probes every free candidate concurrently and returns those that answer
    /// the probe URL with a success status within the deadline.
    ///
    /// Paid candidates pass through unprobed. Probe failures of any kind mean
    /// "not working" and are never propagated. The result is sorted and
    /// de-duplicated.
    pub async fn validate(
        candidates: Vec<Proxy>,
        fetcher: Arc<dyn PageFetcher>,
        agents: &UserAgents,
        probe: &ProbeConfig,
    ) -> Vec<Proxy> {
        let total = candidates.len();
        info!("Testing {} proxies against {}", total, probe.url);

        let working: BTreeSet<Proxy> = stream::iter(candidates)
            .map(|proxy| {
                let fetcher = Arc::clone(&fetcher);
                let user_agent = agents.choose().to_string();
                async move {
                    if proxy.is_paid() || probe_proxy(fetcher.as_ref(), &proxy, &user_agent, probe).await {
                        Some(proxy)
                    } else {
                        None
                    }
                }
            })
            .buffer_unordered(probe.concurrency.max(1))
            .filter_map(|proxy| async move { proxy })
            .collect()
            .await;

        info!("{} of {} proxies are working", working.len(), total);
        working.into_iter().collect()
    }
}

fn dedup(proxies: Vec<Proxy>) -> Vec<Proxy> {
    proxies
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

async fn probe_proxy(
    fetcher: &dyn PageFetcher,
    proxy: &Proxy,
    user_agent: &str,
    probe: &ProbeConfig,
) -> bool {
    match tokio::time::timeout(probe.timeout, fetcher.probe(&probe.url, Some(proxy), user_agent))
        .await
    {
        Ok(Ok(status)) => {
            let working = (200..300).contains(&status);
            debug!(
                "Proxy {} is {} (status {})",
                proxy,
                if working { "working" } else { "not working" },
                status
            );
            working
        }
        Ok(Err(e)) => {
            debug!("Proxy {} is not working: {}", proxy, e);
            false
        }
        Err(_) => {
            debug!("Proxy {} timed out", proxy);
            false
        }
    }
}
