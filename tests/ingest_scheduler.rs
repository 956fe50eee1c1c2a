// tests/ingest_scheduler.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use finance_news_ingest::ingest::providers::xueqiu::{XueqiuProvider, DEFAULT_CATEGORY};
use finance_news_ingest::{
    IngestConfig, IngestScheduler, MemoryNewsStore, NewsItem, NewsProvider, NewsStore,
};

const FIXTURE: &str = include_str!("fixtures/xueqiu_hot.json");

/// Emits one fresh item per cycle and counts its invocations.
struct CountingProvider {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl NewsProvider for CountingProvider {
    async fn fetch_latest(&self, _category: &str) -> Result<Vec<NewsItem>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![NewsItem {
            id: format!("tick-{n}"),
            title: "循环测试".to_string(),
            summary: "摘要".to_string(),
            content: "正文".to_string(),
            source: "测试".to_string(),
            url: format!("https://example.com/tick/{n}"),
            publish_date: Utc::now(),
            image_url: None,
            category: "财经".to_string(),
            tags: vec![],
        }])
    }
    fn name(&self) -> &'static str {
        "counting"
    }
}

fn enabled_config(interval: Duration) -> IngestConfig {
    IngestConfig {
        enabled: true,
        fetch_interval: interval,
        error_backoff: Duration::from_secs(5),
        ..Default::default()
    }
}

fn counting_scheduler(
    interval: Duration,
) -> (IngestScheduler, MemoryNewsStore, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = MemoryNewsStore::new();
    let scheduler = IngestScheduler::new(
        enabled_config(interval),
        Arc::new(store.clone()),
        vec![Arc::new(CountingProvider {
            calls: calls.clone(),
        })],
    );
    (scheduler, store, calls)
}

#[tokio::test(start_paused = true)]
async fn double_start_runs_exactly_one_loop() {
    let (scheduler, _store, calls) = counting_scheduler(Duration::from_secs(60));

    scheduler.start().await;
    scheduler.start().await; // second call must be a no-op
    assert!(scheduler.is_running().await);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1, "one cycle per tick, not two");

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_during_sleep_exits_cleanly_with_no_extra_writes() {
    let (scheduler, store, calls) = counting_scheduler(Duration::from_secs(3600));

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.count().await.unwrap(), 1);

    // The loop is inside its one-hour nap now; stop() must return promptly
    // and leave nothing half-written behind.
    scheduler.stop().await;
    assert!(!scheduler.is_running().await);

    tokio::time::sleep(Duration::from_secs(7200)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_when_not_running_is_a_no_op() {
    let (scheduler, _store, calls) = counting_scheduler(Duration::from_secs(60));
    scheduler.stop().await;
    assert!(!scheduler.is_running().await);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn scheduler_can_be_restarted_after_stop() {
    let (scheduler, _store, calls) = counting_scheduler(Duration::from_secs(60));

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    scheduler.stop().await;
    let after_first_run = calls.load(Ordering::SeqCst);

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(calls.load(Ordering::SeqCst) > after_first_run);
    scheduler.stop().await;
}

#[tokio::test]
async fn disabled_gate_blocks_loop_and_manual_fetch() {
    let store = MemoryNewsStore::new();
    let scheduler = IngestScheduler::new(
        IngestConfig::default(), // enabled: false
        Arc::new(store.clone()),
        vec![Arc::new(XueqiuProvider::from_fixture(FIXTURE))],
    );

    scheduler.start().await;
    assert!(!scheduler.is_running().await);

    let inserted = scheduler.fetch_once(DEFAULT_CATEGORY).await.unwrap();
    assert_eq!(inserted, 0);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn manual_fetch_reports_newly_persisted_count() {
    let store = MemoryNewsStore::new();
    let scheduler = IngestScheduler::new(
        enabled_config(Duration::from_secs(3600)),
        Arc::new(store.clone()),
        vec![Arc::new(XueqiuProvider::from_fixture(FIXTURE))],
    );

    let first = scheduler.fetch_once(DEFAULT_CATEGORY).await.unwrap();
    assert_eq!(first, 4);

    // Unchanged upstream payload: the second manual pass finds nothing new.
    let second = scheduler.fetch_once(DEFAULT_CATEGORY).await.unwrap();
    assert_eq!(second, 0);
    assert_eq!(store.count().await.unwrap(), 4);
}

/// A provider that always fails its fetch must not keep the loop from
/// ticking (the error is absorbed and the loop retries after backoff).
struct NoisyNeighbour;

#[async_trait]
impl NewsProvider for NoisyNeighbour {
    async fn fetch_latest(&self, _category: &str) -> Result<Vec<NewsItem>> {
        anyhow::bail!("503 service unavailable")
    }
    fn name(&self) -> &'static str {
        "noisy"
    }
}

#[tokio::test(start_paused = true)]
async fn failing_provider_does_not_stop_its_loop() {
    let store = MemoryNewsStore::new();
    let scheduler = IngestScheduler::new(
        enabled_config(Duration::from_secs(60)),
        Arc::new(store.clone()),
        vec![Arc::new(NoisyNeighbour)],
    );

    scheduler.start().await;
    tokio::time::sleep(Duration::from_secs(200)).await;
    // Still running, still harmless.
    assert!(scheduler.is_running().await);
    assert_eq!(store.count().await.unwrap(), 0);
    scheduler.stop().await;
}
