//! Per-dork retry loop with exponential backoff and paid-gateway escalation.

use std::sync::Arc;

use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::agents::UserAgents;
use crate::client::SearchClient;
use crate::config::RetryPolicy;
use crate::proxy::{Proxy, ProxyPool};
use crate::rate_limit::RateLimiter;
use crate::result::{DorkOutcome, DorkReport};
use crate::{DorkError, Result};

/// Drives one dork from its first attempt to a terminal [`DorkOutcome`].
///
/// Each round picks a random free proxy (avoiding the one that just failed
/// for this dork) and a random user agent. A transport failure escalates
/// immediately to the paid gateway while the dork's paid budget lasts. Every
/// completed attempt is paced by the [`RateLimiter`]. Rounds are separated by
/// `backoff_factor * 2^(k-1)` before the k-th retry.
///
/// The loop stops at the first round that yields links; a round that merely
/// gets an empty page keeps retrying. No backoff follows the last round.
pub struct RetryScheduler {
    client: SearchClient,
    pool: Arc<ProxyPool>,
    agents: Arc<UserAgents>,
    limiter: RateLimiter,
    policy: RetryPolicy,
    paid_gateway: Option<Proxy>,
    max_paid: u32,
}

impl RetryScheduler {
    /// Creates a scheduler with default pacing and retry policy and no paid fallback.
    pub fn new(client: SearchClient, pool: Arc<ProxyPool>, agents: Arc<UserAgents>) -> Self {
        Self {
            client,
            pool,
            agents,
            limiter: RateLimiter::default(),
            policy: RetryPolicy::default(),
            paid_gateway: None,
            max_paid: 0,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enables escalation to `gateway`, at most `max_paid` times per dork.
    pub fn with_paid_fallback(mut self, gateway: Proxy, max_paid: u32) -> Self {
        self.paid_gateway = Some(gateway);
        self.max_paid = max_paid;
        self
    }

    pub fn pool(&self) -> &ProxyPool {
        &self.pool
    }

    /// True when a paid gateway is set and may be used at least once.
    pub fn has_paid_fallback(&self) -> bool {
        self.paid_gateway.is_some() && self.max_paid > 0
    }

    /// Runs the retry loop for `dork`.
    pub async fn run(&self, dork: &str) -> DorkReport {
        info!("Searching dork: '{}'", dork);
        let started = Instant::now();

        let mut outcome = DorkOutcome::Exhausted;
        let mut attempts = 0u32;
        let mut paid_attempts = 0u32;
        let mut last_failed: Option<Proxy> = None;

        for retry in 0..self.policy.max_attempts() {
            if retry > 0 {
                let delay = self.policy.backoff_before_retry(retry);
                debug!("Backing off {:?} before retry {} of '{}'", delay, retry, dork);
                sleep(delay).await;
            }

            attempts += 1;
            let proxy = self.pool.choose(last_failed.as_ref()).cloned();
            let user_agent = self.agents.choose().to_string();

            let mut result = self.attempt(dork, proxy.as_ref(), &user_agent).await;
            match &result {
                Ok(_) => last_failed = None,
                Err(e) => {
                    debug!("Attempt {} for '{}' failed: {}", attempts, dork, e);
                    last_failed = proxy;
                }
            }

            if result.is_err() && paid_attempts < self.max_paid {
                if let Some(gateway) = &self.paid_gateway {
                    paid_attempts += 1;
                    debug!("Escalating '{}' to the paid gateway ({}/{})", dork, paid_attempts, self.max_paid);
                    let user_agent = self.agents.choose().to_string();
                    result = self.attempt(dork, Some(gateway), &user_agent).await;
                    if let Err(e) = &result {
                        debug!("Paid attempt for '{}' failed: {}", dork, e);
                    }
                }
            }

            match result {
                Ok(links) if !links.is_empty() => {
                    debug!("Raw results for '{}': {:?}", dork, links);
                    outcome = DorkOutcome::Found(links);
                    break;
                }
                Ok(_) => outcome = DorkOutcome::NotFound,
                Err(_) => {}
            }
        }

        if !outcome.is_found() {
            info!("No results for '{}' after {} attempts ({})", dork, attempts, outcome.label());
        }

        DorkReport {
            dork: dork.to_string(),
            outcome,
            attempts,
            paid_attempts,
            output_file: None,
            elapsed: started.elapsed(),
        }
    }

    /// One search, paced afterwards by the rate limiter. With no proxy the
    /// attempt fails without sending anything.
    async fn attempt(&self, dork: &str, proxy: Option<&Proxy>, user_agent: &str) -> Result<Vec<String>> {
        let started = Instant::now();
        let result = match proxy {
            Some(proxy) => self.client.search(dork, proxy, user_agent).await,
            None => Err(DorkError::Transport("no proxy available".to_string())),
        };
        self.limiter.throttle(started.elapsed()).await;
        result
    }
}
