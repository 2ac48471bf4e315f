//! # dork-runner
//!
//! Bulk search-engine dorking through rotating free proxies, with an optional
//! paid scraping gateway as fallback.
//!
//! The pieces, leaves first:
//!
//! - [`ProxyPool`] loads candidate proxies (cache or providers), probes them
//!   once and serves random picks.
//! - [`RateLimiter`] paces completed attempts.
//! - [`SearchClient`] runs one search through one proxy and extracts links.
//! - [`RetryScheduler`] retries a dork with exponential backoff, escalating
//!   to the paid gateway on transport failures.
//! - [`DorkRunner`] fans a batch out over a bounded set of workers.
//! - [`ResultStore`] writes one file per dork and a combined aggregate.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dork_runner::{
//!     DorkRunner, HttpFetcher, Proxy, ProxyPool, ResultStore, RetryScheduler, SearchClient,
//!     UserAgents,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fetcher = Arc::new(HttpFetcher::new());
//!     let pool = ProxyPool::with_proxies(vec![Proxy::parse("127.0.0.1:3128")?]);
//!     let scheduler = RetryScheduler::new(
//!         SearchClient::new(fetcher, 30),
//!         Arc::new(pool),
//!         Arc::new(UserAgents::default()),
//!     );
//!     let store = Arc::new(ResultStore::create("results", "all_dorks_results.json").await?);
//!
//!     let runner = DorkRunner::new(scheduler, store, 4)?;
//!     let summary = runner.run(vec!["inurl:admin filetype:php".to_string()], None).await;
//!     print!("{}", summary.render_table());
//!     Ok(())
//! }
//! ```

mod aggregator;
mod agents;
mod client;
mod error;
mod fetcher;
mod fetcher_http;
mod rate_limit;
mod result;
mod retry;
mod runner;
mod store;

pub mod config;
pub mod providers;
pub mod proxy;

pub use aggregator::AggregateResults;
pub use agents::{UserAgents, DEFAULT_USER_AGENT};
pub use client::{normalize_link, strip_translate_wrapper, SearchClient};
pub use config::{RetryPolicy, RunConfig};
pub use error::{DorkError, Result};
pub use fetcher::{Page, PageFetcher};
pub use fetcher_http::HttpFetcher;
pub use proxy::{ProbeConfig, Proxy, ProxyKind, ProxyPool, ProxyProvider};
pub use rate_limit::RateLimiter;
pub use result::{DorkOutcome, DorkReport, RunSummary};
pub use retry::RetryScheduler;
pub use runner::DorkRunner;
pub use store::{sanitize_filename, ResultStore};
