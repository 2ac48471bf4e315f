//! dork-runner CLI - bulk dork searches through rotating proxies.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use dork_runner::config::read_lines;
use dork_runner::providers::default_providers;
use dork_runner::{
    DorkError, DorkReport, DorkRunner, HttpFetcher, ProbeConfig, ProxyPool, RateLimiter,
    ResultStore, RetryPolicy, RetryScheduler, RunConfig, SearchClient, UserAgents,
};

/// Exit status after Ctrl-C.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Search a list of dorks through rotating free proxies
#[derive(Parser)]
#[command(name = "dork-runner")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output (debug logs, raw results)
    #[arg(short, long)]
    verbose: bool,

    /// Number of dorks searched concurrently
    #[arg(short, long, default_value_t = 20)]
    threads: usize,

    /// Number of results to save per dork
    #[arg(short = 'n', long, default_value_t = 30)]
    num_results: usize,

    /// Maximum number of paid-gateway attempts per dork
    #[arg(long, default_value_t = 0)]
    max_paid: u32,

    /// API key for the paid scraping gateway
    #[arg(long, env = "SCRAPER_API_KEY", hide_env_values = true)]
    scraper_api_key: Option<String>,

    /// File with one dork per line
    #[arg(long, default_value = "config/dorks.txt")]
    dorks: PathBuf,

    /// File with one user agent per line
    #[arg(long, default_value = "config/useragents.txt")]
    user_agents: PathBuf,

    /// Proxy cache; downloaded when missing
    #[arg(long, default_value = "config/proxies.txt")]
    proxies: PathBuf,

    /// Directory for per-dork result files
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// Combined results file
    #[arg(long, default_value = "all_dorks_results.json")]
    aggregate_file: PathBuf,

    /// Retries after the first attempt
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Backoff base in seconds
    #[arg(long, default_value_t = 1.0)]
    backoff: f64,

    /// Pacing target in requests per second
    #[arg(long, default_value_t = 100.0)]
    rps: f64,

    /// Request and probe timeout in seconds
    #[arg(long, default_value_t = 4)]
    timeout: u64,

    /// URL used to probe free proxies
    #[arg(long, default_value = "https://bing.com/")]
    probe_url: String,

    /// Concurrent proxy probes
    #[arg(long, default_value_t = 100)]
    probe_concurrency: usize,

    /// Use loaded proxies without probing them
    #[arg(long)]
    skip_validation: bool,
}

impl Cli {
    fn into_config(self) -> RunConfig {
        RunConfig {
            verbose: self.verbose,
            threads: self.threads,
            num_results: self.num_results,
            max_paid: self.max_paid,
            // The key is only meaningful when paid fallback is enabled.
            paid_api_key: self.scraper_api_key.filter(|_| self.max_paid > 0),
            dorks_file: self.dorks,
            user_agents_file: self.user_agents,
            proxies_file: self.proxies,
            results_dir: self.results_dir,
            aggregate_file: self.aggregate_file,
            requests_per_second: self.rps,
            timeout: self.timeout,
            probe_url: self.probe_url,
            probe_concurrency: self.probe_concurrency,
            skip_validation: self.skip_validation,
            retry: RetryPolicy::new(self.max_retries, self.backoff),
            ..RunConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.into_config();
    config.validate()?;

    let dorks = read_lines(&config.dorks_file)
        .await
        .with_context(|| format!("Failed to read dorks from {}", config.dorks_file.display()))?;
    if dorks.is_empty() {
        anyhow::bail!("No dorks found in {}", config.dorks_file.display());
    }

    let agents = match read_lines(&config.user_agents_file).await {
        Ok(agents) => agents,
        Err(e) => {
            warn!(
                "Failed to read user agents from {} ({}), using the default agent",
                config.user_agents_file.display(),
                e
            );
            Vec::new()
        }
    };
    let agents = Arc::new(UserAgents::new(agents));

    let fetcher = Arc::new(
        HttpFetcher::new()
            .with_timeout(config.request_timeout())
            .with_paid_timeout(config.paid_request_timeout()),
    );

    let paid_gateway = config.paid_gateway();
    let pool = build_pool(&config, Arc::clone(&fetcher), &agents, paid_gateway.is_some()).await?;
    info!("Searching with {} working proxies", pool.len());

    let store = Arc::new(
        ResultStore::create(&config.results_dir, &config.aggregate_file)
            .await
            .with_context(|| format!("Failed to create {}", config.results_dir.display()))?,
    );

    let mut scheduler = RetryScheduler::new(
        SearchClient::new(fetcher, config.num_results),
        Arc::new(pool),
        agents,
    )
    .with_rate_limiter(RateLimiter::new(config.requests_per_second))
    .with_policy(config.retry.clone());
    if let Some(gateway) = paid_gateway {
        scheduler = scheduler.with_paid_fallback(gateway, config.max_paid);
    }

    let runner = DorkRunner::new(scheduler, Arc::clone(&store), config.threads)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let observer = tokio::spawn(observe(rx, config.verbose));

    tokio::select! {
        summary = runner.run(dorks, Some(tx)) => {
            let _ = observer.await;
            println!("\n{}", summary.render_table());
            info!(
                "{} of {} dorks returned results ({} links) in {:.1}s",
                summary.found(),
                summary.count,
                summary.total_links(),
                Duration::from_millis(summary.duration_ms).as_secs_f64()
            );
            info!("Combined results saved to {}", store.aggregate_path().display());
            Ok(())
        }
        _ = interrupted(tokio::signal::ctrl_c()) => {
            error!("Interrupted by user. Exiting...");
            if let Err(e) = store.flush().await {
                error!("Failed to flush combined results: {}", e);
            }
            let saved = store.snapshot().await;
            info!("Kept results for {} dorks in {}", saved.len(), store.aggregate_path().display());
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dork_runner={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Resolves when `signal` reports an interrupt. If the handler could not be
/// installed the run goes on uninterruptible instead of ending early.
async fn interrupted<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("Failed to listen for Ctrl-C, interrupts are disabled: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Loads and health-checks free proxies.
///
/// Having no proxy source is fatal only when there is no paid gateway to
/// fall back on.
async fn build_pool(
    config: &RunConfig,
    fetcher: Arc<HttpFetcher>,
    agents: &UserAgents,
    has_paid: bool,
) -> Result<ProxyPool> {
    let providers = default_providers(fetcher.clone());
    let candidates = match ProxyPool::load(&config.proxies_file, &providers).await {
        Ok(candidates) => candidates,
        Err(DorkError::NoProxySource) if has_paid => {
            warn!("No free proxies available, relying on the paid gateway");
            Vec::new()
        }
        Err(e) => return Err(e).context("Failed to load proxies"),
    };

    if config.skip_validation || candidates.is_empty() {
        return Ok(ProxyPool::with_proxies(candidates));
    }

    let probe = ProbeConfig {
        url: config.probe_url.clone(),
        timeout: config.request_timeout(),
        concurrency: config.probe_concurrency,
    };
    let working = ProxyPool::validate(candidates, fetcher, agents, &probe).await;
    Ok(ProxyPool::with_proxies(working))
}

/// Follows completions as they arrive and keeps a running link count.
async fn observe(mut rx: mpsc::UnboundedReceiver<DorkReport>, verbose: bool) {
    let mut links = 0usize;
    while let Some(report) = rx.recv().await {
        links += report.links().len();
        if verbose {
            let raw = serde_json::to_string_pretty(report.links()).unwrap_or_default();
            debug!("Results for '{}':\n{}", report.dork, raw);
        }
        debug!("{} links collected so far", links);
    }
}
