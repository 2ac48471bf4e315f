//! Batch execution: bounded fan-out of dorks over the retry scheduler.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info};

use crate::result::{DorkOutcome, DorkReport, RunSummary};
use crate::retry::RetryScheduler;
use crate::store::ResultStore;
use crate::{DorkError, Result};

/// Runs a batch of dorks with at most `threads` in flight.
///
/// Completed dorks are persisted and delivered in completion order. Dropping
/// the future returned by [`DorkRunner::run`] aborts every in-flight search;
/// files already written stay intact.
pub struct DorkRunner {
    scheduler: Arc<RetryScheduler>,
    store: Arc<ResultStore>,
    threads: usize,
}

impl DorkRunner {
    /// Fails with [`DorkError::NoUsableProxies`] when the scheduler has neither
    /// a free proxy nor a paid fallback to search with.
    pub fn new(scheduler: RetryScheduler, store: Arc<ResultStore>, threads: usize) -> Result<Self> {
        if scheduler.pool().is_empty() && !scheduler.has_paid_fallback() {
            return Err(DorkError::NoUsableProxies);
        }
        Ok(Self {
            scheduler: Arc::new(scheduler),
            store,
            threads: threads.max(1),
        })
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    /// Searches every dork, persisting each as it completes and forwarding
    /// its report to `events` when given. Duplicate dorks run once.
    ///
    /// The summary lists reports in input order.
    pub async fn run(&self, dorks: Vec<String>, events: Option<UnboundedSender<DorkReport>>) -> RunSummary {
        let started = Instant::now();

        let mut seen = HashSet::new();
        let dorks: Vec<String> = dorks.into_iter().filter(|d| seen.insert(d.clone())).collect();
        let order: HashMap<String, usize> = dorks
            .iter()
            .enumerate()
            .map(|(i, dork)| (dork.clone(), i))
            .collect();
        let total = dorks.len();
        info!("Running {} dorks on {} workers", total, self.threads);

        let mut pending = dorks.into_iter();
        let mut tasks = JoinSet::new();
        for dork in pending.by_ref().take(self.threads) {
            self.spawn(&mut tasks, dork);
        }

        let mut reports = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            if let Some(dork) = pending.next() {
                self.spawn(&mut tasks, dork);
            }

            let mut report = match joined {
                Ok(report) => report,
                // Tasks are only cancelled when the whole run is dropped.
                Err(e) => {
                    error!("Search task failed: {}", e);
                    continue;
                }
            };

            match self.store.record(&report.dork, report.links()).await {
                Ok(path) => report.output_file = Some(path),
                Err(e) => error!("Failed to save results for '{}': {}", report.dork, e),
            }

            info!(
                "[{}/{}] '{}': {} results ({})",
                reports.len() + 1,
                total,
                report.dork,
                report.links().len(),
                report.outcome.label()
            );

            if let Some(events) = &events {
                // The observer may have gone away; the run carries on regardless.
                let _ = events.send(report.clone());
            }
            reports.push(report);
        }

        reports.sort_by_key(|r| order.get(&r.dork).copied().unwrap_or(usize::MAX));
        RunSummary::new(reports, started.elapsed())
    }

    /// A panicking search still yields an `Exhausted` report for its dork.
    fn spawn(&self, tasks: &mut JoinSet<DorkReport>, dork: String) {
        let scheduler = Arc::clone(&self.scheduler);
        tasks.spawn(async move {
            let started = Instant::now();
            let result = AssertUnwindSafe(scheduler.run(&dork)).catch_unwind().await;
            match result {
                Ok(report) => report,
                Err(_) => {
                    error!("Search for '{}' panicked", dork);
                    DorkReport {
                        dork,
                        outcome: DorkOutcome::Exhausted,
                        attempts: 0,
                        paid_attempts: 0,
                        output_file: None,
                        elapsed: started.elapsed(),
                    }
                }
            }
        });
    }
}
