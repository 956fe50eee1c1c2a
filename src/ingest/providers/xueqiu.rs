// src/ingest/providers/xueqiu.rs
//! 雪球 hot-news JSON feed client.
//!
//! The upstream endpoint is category-filtered and paginated by size. Every
//! raw status is decoded individually, so one malformed item never takes
//! down the rest of the batch.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use metrics::counter;
use serde::Deserialize;

use crate::config::IngestConfig;
use crate::ingest::types::{NewsItem, NewsProvider};
use crate::ingest::{strip_markup, truncate_with_ellipsis};

pub const SOURCE_NAME: &str = "雪球";
pub const DEFAULT_CATEGORY: &str = "全部";

const HOT_LIST_URL: &str = "https://xueqiu.com/statuses/hot/listV2.json";
const ITEM_BASE_URL: &str = "https://xueqiu.com";
const TITLE_SYNTH_CHARS: usize = 30;
const SUMMARY_CHARS: usize = 100;

/// Category name → provider-side numeric code. "全部" (and, deliberately,
/// any unrecognized name) sends no category filter at all.
const CATEGORY_CODES: &[(&str, i64)] = &[
    ("股市", 102),
    ("美股", 101),
    ("宏观", 6),
    ("外汇", 111),
    ("商品", 113),
    ("基金", 104),
    ("私募", 105),
    ("房产", 116),
];

pub fn available_categories() -> Vec<&'static str> {
    std::iter::once(DEFAULT_CATEGORY)
        .chain(CATEGORY_CODES.iter().map(|(name, _)| *name))
        .collect()
}

pub fn category_code(name: &str) -> Option<i64> {
    CATEGORY_CODES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, code)| *code)
}

/// Build the outbound query for one fetch.
pub fn query_params(category: &str, limit: u32) -> Vec<(String, String)> {
    let mut params = vec![
        ("since_id".to_string(), "-1".to_string()),
        ("max_id".to_string(), "-1".to_string()),
        ("size".to_string(), limit.to_string()),
    ];
    if let Some(code) = category_code(category) {
        params.push(("category".to_string(), code.to_string()));
    }
    params
}

// Raw payload shapes, decoded explicitly instead of duck-typed access.

#[derive(Debug, Deserialize)]
struct HotList {
    #[serde(default)]
    list: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    id: Option<i64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
    /// Epoch milliseconds upstream.
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    user_id: Option<i64>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    user: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(default)]
    profile_image_url: Option<String>,
}

enum Mode {
    Http { client: reqwest::Client },
    Fixture(String),
}

pub struct XueqiuProvider {
    mode: Mode,
    credential: Option<String>,
    user_agent: String,
    limit: u32,
}

impl XueqiuProvider {
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("building xueqiu http client")?;
        Ok(Self {
            mode: Mode::Http { client },
            credential: config.credential.clone(),
            user_agent: config.user_agent.clone(),
            limit: config.fetch_limit,
        })
    }

    /// Parse a canned response body instead of calling the network.
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
            credential: Some("fixture".to_string()),
            user_agent: String::new(),
            limit: 20,
        }
    }

    fn parse_body(body: &str, category: &str) -> Vec<NewsItem> {
        let hot: HotList = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "xueqiu payload did not match the expected shape");
                counter!("ingest_provider_errors_total").increment(1);
                return Vec::new();
            }
        };

        let mut out = Vec::with_capacity(hot.list.len());
        for value in hot.list {
            if let Some(item) = Self::normalize(value, category) {
                out.push(item);
            }
        }
        out
    }

    /// Map one raw status onto the canonical record. Returns `None` (and
    /// logs) when the item is malformed or carries no usable identity/text.
    fn normalize(value: serde_json::Value, category: &str) -> Option<NewsItem> {
        let raw: RawStatus = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed xueqiu status");
                return None;
            }
        };

        let native_id = match raw.id {
            Some(id) => id,
            None => {
                tracing::debug!("xueqiu status without native id, skipping");
                return None;
            }
        };

        let content = strip_markup(raw.text.as_deref().unwrap_or_default());
        let title = match raw.title.filter(|t| !t.trim().is_empty()) {
            Some(t) => t.trim().to_string(),
            None => truncate_with_ellipsis(&content, TITLE_SYNTH_CHARS),
        };
        if title.is_empty() {
            tracing::debug!(native_id, "xueqiu status with no title or text, skipping");
            return None;
        }

        let publish_date = raw
            .created_at
            .filter(|ms| *ms > 0)
            .and_then(millis_to_utc)
            .unwrap_or_else(Utc::now);

        let author = raw
            .user_id
            .map(|v| v.to_string())
            .unwrap_or_default();

        Some(NewsItem {
            id: format!("xueqiu-{native_id}"),
            title,
            summary: truncate_with_ellipsis(&content, SUMMARY_CHARS),
            content,
            source: SOURCE_NAME.to_string(),
            url: format!("{ITEM_BASE_URL}/{author}/{native_id}"),
            publish_date,
            image_url: raw
                .user
                .and_then(|u| u.profile_image_url)
                .filter(|u| !u.is_empty()),
            category: category.to_string(),
            tags: raw.topics,
        })
    }
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[async_trait]
impl NewsProvider for XueqiuProvider {
    async fn fetch_latest(&self, category: &str) -> Result<Vec<NewsItem>> {
        let body = match &self.mode {
            Mode::Fixture(body) => body.clone(),
            Mode::Http { client } => {
                // A provider without credentials must never fail the cycle.
                let Some(credential) = &self.credential else {
                    tracing::warn!("xueqiu credential not configured, skipping fetch");
                    return Ok(Vec::new());
                };

                let resp = match client
                    .get(HOT_LIST_URL)
                    .query(&query_params(category, self.limit))
                    .header(reqwest::header::USER_AGENT, &self.user_agent)
                    .header(reqwest::header::COOKIE, credential)
                    .header(reqwest::header::ACCEPT, "application/json, text/plain, */*")
                    .send()
                    .await
                {
                    Ok(resp) => resp,
                    Err(e) => {
                        tracing::warn!(error = %e, "xueqiu request failed");
                        counter!("ingest_provider_errors_total").increment(1);
                        return Ok(Vec::new());
                    }
                };

                if !resp.status().is_success() {
                    tracing::warn!(status = %resp.status(), "xueqiu request rejected");
                    counter!("ingest_provider_errors_total").increment(1);
                    return Ok(Vec::new());
                }

                match resp.text().await {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::warn!(error = %e, "reading xueqiu response body failed");
                        counter!("ingest_provider_errors_total").increment(1);
                        return Ok(Vec::new());
                    }
                }
            }
        };

        Ok(Self::parse_body(&body, category))
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }
}
