// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Canonical news record all providers converge to.
///
/// `id` is derived deterministically from the provider's native id, so
/// re-fetching the same upstream item always yields the same `id`. That is
/// what makes the dedup gate work without a separate lookup table.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub source: String,
    pub url: String,
    pub publish_date: DateTime<Utc>,
    pub image_url: Option<String>,
    pub category: String,
    pub tags: Vec<String>,
}

#[async_trait::async_trait]
pub trait NewsProvider: Send + Sync {
    /// Fetch the latest batch and normalize it into canonical items.
    ///
    /// Transport failures (timeout, non-2xx) and payload-shape failures are
    /// absorbed here into an empty batch; a malformed individual item is
    /// dropped without aborting the rest. `Err` is reserved for unexpected
    /// internal failures.
    async fn fetch_latest(&self, category: &str) -> Result<Vec<NewsItem>>;
    fn name(&self) -> &'static str;
}
