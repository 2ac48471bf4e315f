//! End-to-end runs over stubbed transports.
//!
//! The live provider test is marked with `#[ignore]` because it needs network
//! access. Run it with: `cargo test --test integration -- --ignored`

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_test::assert_ok;

use dork_runner::proxy::StaticProxyProvider;
use dork_runner::{
    DorkError, DorkOutcome, DorkRunner, HttpFetcher, Page, PageFetcher, ProbeConfig, Proxy,
    ProxyPool, ProxyProvider, ResultStore, RetryPolicy, RetryScheduler, SearchClient, UserAgents,
};

const GOOD_HOST: &str = "10.0.0.1";

/// Answers through `GOOD_HOST` with a five-result page and fails every other
/// proxy as if it had timed out.
struct ScriptedFetcher;

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, _url: &str, proxy: Option<&Proxy>, _ua: &str) -> dork_runner::Result<Page> {
        match proxy {
            Some(p) if p.host == GOOD_HOST => {
                let links: String = (0..5)
                    .map(|i| format!(r#"<div class="yuRUbf"><a href="https://site{}.example/">r</a></div>"#, i))
                    .collect();
                Ok(Page::new(200, format!("<html><body>{}</body></html>", links)))
            }
            _ => Err(DorkError::Transport("operation timed out".into())),
        }
    }
}

fn dorks() -> Vec<String> {
    vec![
        "inurl:admin".to_string(),
        "intitle:\"index of\" backup".to_string(),
        "filetype:sql password".to_string(),
    ]
}

async fn runner_for(proxies: Vec<Proxy>, dir: &tempfile::TempDir) -> DorkRunner {
    let scheduler = RetryScheduler::new(
        SearchClient::new(Arc::new(ScriptedFetcher), 30),
        Arc::new(ProxyPool::with_proxies(proxies)),
        Arc::new(UserAgents::new(vec!["test-agent/1.0".to_string()])),
    )
    .with_policy(RetryPolicy::new(3, 0.001));

    let store = ResultStore::create(
        dir.path().join("results"),
        dir.path().join("all_dorks_results.json"),
    )
    .await
    .unwrap();

    DorkRunner::new(scheduler, Arc::new(store), 2).unwrap()
}

#[tokio::test]
async fn test_run_with_one_good_proxy() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner_for(vec![Proxy::new(GOOD_HOST, 8080), Proxy::new("10.0.0.2", 8080)], &dir).await;

    let summary = runner.run(dorks(), None).await;

    assert_eq!(summary.count, 3);
    assert_eq!(summary.found(), 3);
    for report in summary.reports() {
        assert!(matches!(report.outcome, DorkOutcome::Found(_)));
        let path = report.output_file.as_ref().unwrap();
        let saved: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(path).await.unwrap()).unwrap();
        assert_eq!(saved[&report.dork].as_array().unwrap().len(), 5);
    }

    let aggregate: serde_json::Value = serde_json::from_slice(
        &assert_ok!(tokio::fs::read(dir.path().join("all_dorks_results.json")).await),
    )
    .unwrap();
    let keys: BTreeSet<String> = aggregate.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, dorks().into_iter().collect::<BTreeSet<_>>());
}

#[tokio::test]
async fn test_run_with_every_proxy_failing() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner_for(vec![Proxy::new("10.0.0.2", 8080), Proxy::new("10.0.0.3", 8080)], &dir).await;

    let summary = runner.run(dorks(), None).await;

    assert_eq!(summary.count, 3);
    assert_eq!(summary.found(), 0);
    assert_eq!(summary.total_links(), 0);
    for report in summary.reports() {
        assert_eq!(report.outcome, DorkOutcome::Exhausted);
        assert_eq!(report.attempts, 4);
    }

    let snapshot = runner.store().snapshot().await;
    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.iter().all(|(_, links)| links.is_empty()));
}

/// Probes succeed only through the listed hosts.
struct ProbeFetcher {
    working: BTreeSet<String>,
}

#[async_trait]
impl PageFetcher for ProbeFetcher {
    async fn fetch(&self, _url: &str, proxy: Option<&Proxy>, _ua: &str) -> dork_runner::Result<Page> {
        match proxy {
            Some(p) if self.working.contains(&p.host) => Ok(Page::new(200, "ok")),
            Some(p) if p.port % 2 == 0 => Ok(Page::new(403, "forbidden")),
            _ => Err(DorkError::Transport("connection refused".into())),
        }
    }
}

#[tokio::test]
async fn test_load_and_validate_from_providers() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("config").join("proxies.txt");

    let candidates: Vec<Proxy> = (0..100u16)
        .map(|i| Proxy::new(format!("192.168.{}.{}", i / 50, i % 50), 3000 + i))
        .collect();
    let (first, second) = candidates.split_at(60);
    let providers: Vec<Arc<dyn ProxyProvider>> = vec![
        Arc::new(StaticProxyProvider::new("first", first.to_vec())),
        Arc::new(StaticProxyProvider::new("second", second.to_vec())),
    ];

    let loaded = ProxyPool::load(&cache, &providers).await.unwrap();
    assert_eq!(loaded.len(), 100);
    assert!(cache.exists());

    let working: BTreeSet<String> = loaded.iter().step_by(14).map(|p| p.host.clone()).collect();
    assert_eq!(working.len(), 8);
    let working: BTreeSet<String> = working.into_iter().take(7).collect();

    let probe = ProbeConfig {
        url: "https://probe.example/".to_string(),
        timeout: std::time::Duration::from_secs(1),
        concurrency: 16,
    };
    let valid = ProxyPool::validate(
        loaded,
        Arc::new(ProbeFetcher { working: working.clone() }),
        &UserAgents::default(),
        &probe,
    )
    .await;

    assert_eq!(valid.len(), 7);
    assert!(valid.iter().all(|p| working.contains(&p.host)));

    // The cache now short-circuits the providers.
    let cached = ProxyPool::load(&cache, &[]).await.unwrap();
    assert_eq!(cached.len(), 100);
}

#[tokio::test]
async fn test_load_without_any_source() {
    let dir = tempfile::tempdir().unwrap();
    let result = ProxyPool::load(&dir.path().join("proxies.txt"), &[]).await;
    assert!(matches!(result, Err(DorkError::NoProxySource)));
}

#[tokio::test]
#[ignore]
async fn test_live_default_providers() {
    let fetcher = Arc::new(HttpFetcher::new());
    for provider in dork_runner::providers::default_providers(fetcher) {
        match provider.fetch_proxies().await {
            Ok(proxies) => println!("{} returned {} proxies", provider.name(), proxies.len()),
            Err(e) => println!("{} failed: {}", provider.name(), e),
        }
    }
}
