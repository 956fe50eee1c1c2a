// src/ingest/providers/sina.rs
//! 新浪财经 scraper: discover article links on the stock page, then fetch
//! each article for its body, date and image.
//!
//! This client makes N+1 requests per cycle (one index page, one per
//! article), so every per-article step degrades on its own: a failed fetch
//! falls back to the headline text, a missing image becomes `None`.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::IngestConfig;
use crate::ingest::truncate_with_ellipsis;
use crate::ingest::types::{NewsItem, NewsProvider};

pub const SOURCE_NAME: &str = "新浪财经";
pub const CATEGORY: &str = "财经";

const BASE_URL: &str = "https://finance.sina.com.cn/";
const STOCK_URL: &str = "https://finance.sina.com.cn/stock/";
const SUMMARY_CHARS: usize = 100;

/// Path substrings that mark ads, subject pages and campaign pages.
const LINK_DENYLIST: &[&str] = &["zt_d", "subject", "tousu", "forerunner", "zhongce"];

/// Article links carry a year-prefixed (date-like) path segment.
static ARTICLE_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/20\d{2}").expect("article path regex"));

/// Everything outside the CJK unified block; headlines are reduced to it.
static NON_CJK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\x{4e00}-\x{9fa5}]").expect("cjk regex"));

static ANCHOR_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));
static TIME_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.time, span.date").expect("time selector"));
static SUMMARY_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.summary, p").expect("summary selector"));
static CONTENT_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.article-content, div.article").expect("content selector"));
static IMAGE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img.article-img").expect("image selector"));

/// Lightweight link discovery result (title + absolute link).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headline {
    pub title: String,
    pub link: String,
}

/// One article candidate discovered on the index page.
#[derive(Debug, Clone)]
struct Candidate {
    title: String,
    url: String,
    publish_date: Option<DateTime<Utc>>,
    summary: Option<String>,
}

enum Mode {
    Http { client: reqwest::Client },
    Fixture {
        index: String,
        articles: HashMap<String, String>,
    },
}

pub struct SinaProvider {
    mode: Mode,
    user_agent: String,
    limit: u32,
}

impl SinaProvider {
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("building sina http client")?;
        Ok(Self {
            mode: Mode::Http { client },
            user_agent: config.user_agent.clone(),
            limit: config.fetch_limit,
        })
    }

    /// Serve the index page and articles from canned bodies, keyed by
    /// absolute URL, instead of calling the network.
    pub fn from_fixture(index: &str, articles: HashMap<String, String>) -> Self {
        Self {
            mode: Mode::Fixture {
                index: index.to_string(),
                articles,
            },
            user_agent: String::new(),
            limit: 20,
        }
    }

    /// Fetch one page, absorbing every transport failure into `None`.
    async fn fetch_page(&self, url: &str) -> Option<String> {
        match &self.mode {
            Mode::Fixture { index, articles } => {
                if url == BASE_URL || url == STOCK_URL {
                    Some(index.clone())
                } else {
                    articles.get(url).cloned()
                }
            }
            Mode::Http { client } => {
                let resp = match client
                    .get(url)
                    .header(reqwest::header::USER_AGENT, &self.user_agent)
                    .header(reqwest::header::REFERER, BASE_URL)
                    .header(
                        reqwest::header::ACCEPT,
                        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                    )
                    .send()
                    .await
                {
                    Ok(resp) => resp,
                    Err(e) => {
                        tracing::warn!(%url, error = %e, "sina request failed");
                        counter!("ingest_provider_errors_total").increment(1);
                        return None;
                    }
                };
                if !resp.status().is_success() {
                    tracing::warn!(%url, status = %resp.status(), "sina request rejected");
                    counter!("ingest_provider_errors_total").increment(1);
                    return None;
                }
                resp.text().await.ok()
            }
        }
    }

    /// List the site's section headlines: absolute http(s) links with a
    /// non-empty anchor text, minus the denylisted paths.
    pub async fn fetch_index(&self) -> Result<Vec<Headline>> {
        let Some(html) = self.fetch_page(BASE_URL).await else {
            return Ok(Vec::new());
        };
        Ok(parse_index(&html))
    }

    async fn fetch_article(&self, candidate: Candidate) -> NewsItem {
        let fallback = candidate
            .summary
            .clone()
            .unwrap_or_else(|| candidate.title.clone());

        let (content, image_url) = match self.fetch_page(&candidate.url).await {
            Some(body) => {
                let (content, image) = parse_article(&body);
                (content.unwrap_or_else(|| fallback.clone()), image)
            }
            None => (fallback.clone(), None),
        };

        let summary = candidate
            .summary
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| truncate_with_ellipsis(&content, SUMMARY_CHARS));

        NewsItem {
            id: article_id(&candidate.url),
            title: candidate.title,
            summary,
            content,
            source: SOURCE_NAME.to_string(),
            url: candidate.url,
            publish_date: candidate.publish_date.unwrap_or_else(Utc::now),
            image_url,
            category: CATEGORY.to_string(),
            tags: vec!["财经".to_string(), "股票".to_string()],
        }
    }
}

#[async_trait]
impl NewsProvider for SinaProvider {
    // The scraper ignores the requested category; everything it produces
    // is classified under the fixed "财经" constant.
    async fn fetch_latest(&self, _category: &str) -> Result<Vec<NewsItem>> {
        let Some(html) = self.fetch_page(STOCK_URL).await else {
            return Ok(Vec::new());
        };

        let mut candidates = discover_candidates(&html);
        candidates.truncate(self.limit as usize);

        let mut out = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            out.push(self.fetch_article(candidate).await);
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }
}

fn denylisted(link: &str) -> bool {
    LINK_DENYLIST.iter().any(|part| link.contains(part))
}

fn parse_index(html: &str) -> Vec<Headline> {
    let document = Html::parse_document(html);
    let mut out = Vec::new();
    for anchor in document.select(&ANCHOR_SEL) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let title = anchor.text().collect::<String>().trim().to_string();
        if title.is_empty() || !href.starts_with("http") || denylisted(href) {
            continue;
        }
        out.push(Headline {
            title,
            link: href.to_string(),
        });
    }
    out
}

/// Scan the index page for article links and whatever date/summary hints sit
/// next to them. Candidates are deduplicated by URL within the batch.
fn discover_candidates(html: &str) -> Vec<Candidate> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for anchor in document.select(&ANCHOR_SEL) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !ARTICLE_PATH_RE.is_match(href) || denylisted(href) {
            continue;
        }

        let raw_title = anchor.text().collect::<String>();
        let title = NON_CJK_RE.replace_all(&raw_title, "").to_string();
        if title.is_empty() {
            continue;
        }

        let Some(url) = resolve_link(href) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }

        let parent = anchor.parent().and_then(ElementRef::wrap);
        let publish_date = parent
            .and_then(|p| p.select(&TIME_SEL).next())
            .map(|el| el.text().collect::<String>())
            .and_then(|s| parse_publish_date(s.trim()));
        let summary = parent
            .and_then(|p| p.select(&SUMMARY_SEL).next())
            .map(|el| el.text().collect::<String>())
            .map(|s| NON_CJK_RE.replace_all(&s, "").to_string())
            .filter(|s| !s.is_empty());

        out.push(Candidate {
            title,
            url,
            publish_date,
            summary,
        });
    }
    out
}

/// Body text and lead image of one article page.
fn parse_article(html: &str) -> (Option<String>, Option<String>) {
    let document = Html::parse_document(html);

    let content = document
        .select(&CONTENT_SEL)
        .next()
        .map(|el| {
            el.text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|s| !s.is_empty());

    let image = document
        .select(&IMAGE_SEL)
        .next()
        .and_then(|el| el.value().attr("src"))
        .map(str::to_string);

    (content, image)
}

/// Resolve scraped hrefs to absolute form: protocol-relative (`//host/…`)
/// and root-relative (`/path`) links are anchored to the site base.
fn resolve_link(href: &str) -> Option<String> {
    if href.starts_with("//") {
        return Some(format!("https:{href}"));
    }
    if href.starts_with("http") {
        return Some(href.to_string());
    }
    if href.starts_with('/') {
        static BASE: Lazy<Option<Url>> = Lazy::new(|| Url::parse(BASE_URL).ok());
        return BASE.as_ref()?.join(href).ok().map(|u| u.to_string());
    }
    None
}

/// Site-local date strings, tried most-specific first. Anything else means
/// the caller falls back to ingestion time.
fn parse_publish_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y年%m月%d日 %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Deterministic id from the article's natural key (its absolute URL).
fn article_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut short = String::with_capacity(16);
    for b in digest.iter().take(8) {
        let _ = write!(&mut short, "{:02x}", b);
    }
    format!("sina-{short}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_resolution_handles_all_three_forms() {
        assert_eq!(
            resolve_link("//finance.sina.com.cn/stock/a.shtml").as_deref(),
            Some("https://finance.sina.com.cn/stock/a.shtml")
        );
        assert_eq!(
            resolve_link("/stock/2024-05-06/doc-abc.shtml").as_deref(),
            Some("https://finance.sina.com.cn/stock/2024-05-06/doc-abc.shtml")
        );
        assert_eq!(
            resolve_link("https://finance.sina.com.cn/x.shtml").as_deref(),
            Some("https://finance.sina.com.cn/x.shtml")
        );
        assert_eq!(resolve_link("javascript:void(0)"), None);
    }

    #[test]
    fn year_path_heuristic_matches_date_segments() {
        assert!(ARTICLE_PATH_RE.is_match("/stock/2024-05-06/doc-abc.shtml"));
        assert!(ARTICLE_PATH_RE.is_match("https://finance.sina.com.cn/2025/doc.shtml"));
        assert!(!ARTICLE_PATH_RE.is_match("/stock/index.shtml"));
    }

    #[test]
    fn denylist_blocks_campaign_paths() {
        assert!(denylisted("https://finance.sina.com.cn/zt_d/promo"));
        assert!(denylisted("https://finance.sina.com.cn/subject/x"));
        assert!(!denylisted("https://finance.sina.com.cn/stock/2024-05-06/doc.shtml"));
    }

    #[test]
    fn date_parsing_covers_site_formats() {
        assert!(parse_publish_date("2024-05-06 10:23:45").is_some());
        assert!(parse_publish_date("2024-05-06 10:23").is_some());
        assert!(parse_publish_date("2024年5月6日 10:23").is_some());
        assert!(parse_publish_date("2024-05-06T10:23:45+08:00").is_some());
        assert!(parse_publish_date("昨天").is_none());
    }

    #[test]
    fn article_ids_are_stable_and_prefixed() {
        let a = article_id("https://finance.sina.com.cn/stock/2024-05-06/doc-abc.shtml");
        let b = article_id("https://finance.sina.com.cn/stock/2024-05-06/doc-abc.shtml");
        assert_eq!(a, b);
        assert!(a.starts_with("sina-"));
        assert_eq!(a.len(), "sina-".len() + 16);
    }

    #[test]
    fn headline_titles_keep_only_cjk() {
        let html = r#"<html><body>
            <a href="/stock/2024-05-06/doc-abc.shtml">A股收评：沪指涨1.2%!</a>
        </body></html>"#;
        let candidates = discover_candidates(html);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "股收评沪指涨");
    }
}
