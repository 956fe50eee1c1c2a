// src/ingest/mod.rs
pub mod providers;
pub mod scheduler;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;

use crate::config::IngestConfig;
use crate::ingest::providers::{sina::SinaProvider, xueqiu::XueqiuProvider};
use crate::ingest::types::{NewsItem, NewsProvider};
use crate::store::{NewsStore, StoreTx};

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Items produced by provider fetches.");
        describe_counter!("ingest_inserted_total", "Items newly persisted.");
        describe_counter!(
            "ingest_duplicates_total",
            "Items skipped by the dedup gate."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_counter!(
            "ingest_persist_errors_total",
            "Cycles rolled back due to a store error."
        );
        describe_counter!("ingest_cycles_total", "Completed ingest cycles.");
        describe_histogram!("ingest_cycle_ms", "Ingest cycle duration in milliseconds.");
        describe_gauge!("ingest_last_run_ts", "Unix ts of the last finished cycle.");
    });
}

/// Decode HTML entities, strip tags, collapse whitespace.
pub fn strip_markup(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// First `max` characters of `s`, with a trailing ellipsis when clipped.
/// Char-indexed, never byte-sliced.
pub fn truncate_with_ellipsis(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

/// Counters for one fetch→normalize→dedup→persist pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

/// Run one ingest cycle for a single provider: fetch and normalize, then
/// persist everything the dedup gate lets through, as one transaction.
///
/// Provider failures are absorbed into an empty batch here; a store failure
/// rolls the whole cycle back and surfaces as `Err` so the scheduler can
/// apply its backoff.
pub async fn run_cycle(
    provider: &dyn NewsProvider,
    store: &dyn NewsStore,
    category: &str,
) -> Result<CycleOutcome> {
    ensure_metrics_described();
    let t0 = std::time::Instant::now();

    let items = match provider.fetch_latest(category).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(provider = provider.name(), error = ?e, "provider error");
            counter!("ingest_provider_errors_total").increment(1);
            Vec::new()
        }
    };
    counter!("ingest_items_total").increment(items.len() as u64);

    let mut outcome = CycleOutcome {
        fetched: items.len(),
        ..Default::default()
    };

    if !items.is_empty() {
        let mut tx = store.begin().await?;
        match persist_batch(tx.as_mut(), &items, &mut outcome).await {
            Ok(()) => tx.commit().await?,
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    tracing::warn!(error = ?rb, "rollback after failed cycle also failed");
                }
                counter!("ingest_persist_errors_total").increment(1);
                return Err(e);
            }
        }
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_cycle_ms").record(ms);
    counter!("ingest_inserted_total").increment(outcome.inserted as u64);
    counter!("ingest_duplicates_total").increment(outcome.duplicates as u64);
    counter!("ingest_cycles_total").increment(1);
    gauge!("ingest_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);

    tracing::info!(
        target: "ingest",
        provider = provider.name(),
        category,
        fetched = outcome.fetched,
        inserted = outcome.inserted,
        duplicates = outcome.duplicates,
        "ingest cycle finished"
    );

    Ok(outcome)
}

/// Dedup gate + insert, inside the already-open transaction. The existence
/// check and the insert share the transactional scope, so a candidate can
/// never race itself between check and write.
async fn persist_batch(
    tx: &mut (dyn StoreTx + '_),
    items: &[NewsItem],
    outcome: &mut CycleOutcome,
) -> Result<()> {
    for item in items {
        if tx.exists(&item.id).await? {
            tracing::debug!(target: "ingest", id = %item.id, "already stored, skipping");
            outcome.duplicates += 1;
            continue;
        }
        tx.insert(item).await?;
        outcome.inserted += 1;
    }
    Ok(())
}

/// The default provider set: the 雪球 JSON feed and the 新浪财经 scraper.
pub fn default_providers(config: &IngestConfig) -> Result<Vec<Arc<dyn NewsProvider>>> {
    let providers: Vec<Arc<dyn NewsProvider>> = vec![
        Arc::new(XueqiuProvider::from_config(config)?),
        Arc::new(SinaProvider::from_config(config)?),
    ];
    Ok(providers)
}
