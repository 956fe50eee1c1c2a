// src/store/sqlite.rs
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};

use super::{NewsStore, StoreTx};
use crate::ingest::types::NewsItem;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS news (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        summary TEXT NOT NULL,
        content TEXT NOT NULL,
        source TEXT NOT NULL,
        url TEXT NOT NULL,
        publish_date TEXT NOT NULL,
        image_url TEXT,
        category TEXT NOT NULL,
        tags TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_news_publish_date ON news(publish_date)",
    "CREATE INDEX IF NOT EXISTS idx_news_source ON news(source)",
];

pub struct SqliteNewsStore {
    pool: SqlitePool,
}

impl SqliteNewsStore {
    /// Connect and bootstrap the schema. Accepts `sqlite:path/to.db` and
    /// `sqlite::memory:` URLs; parent directories of file-backed databases
    /// are created on demand.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let path = database_url
            .trim_start_matches("sqlite:")
            .trim_start_matches("//");
        let in_memory = path.starts_with(':');
        if !in_memory {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("parsing database url {database_url}"))?
            .create_if_missing(true);

        // An in-memory database exists per connection; more than one pooled
        // connection would each see their own empty schema.
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(options)
            .await
            .with_context(|| format!("connecting to {database_url}"))?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .context("bootstrapping news schema")?;
        }

        Ok(Self { pool })
    }
}

#[async_trait]
impl NewsStore for SqliteNewsStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.context("opening news transaction")?;
        Ok(Box::new(SqliteTx { tx }))
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news")
            .fetch_one(&self.pool)
            .await
            .context("counting news rows")?;
        Ok(n as u64)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<NewsItem>> {
        let rows = sqlx::query("SELECT * FROM news ORDER BY publish_date DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("listing recent news")?;
        // A row that no longer parses is skipped rather than failing reads.
        Ok(rows.iter().filter_map(item_from_row).collect())
    }
}

struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StoreTx for SqliteTx {
    async fn exists(&mut self, id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM news WHERE id = ? LIMIT 1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .context("news existence check")?;
        Ok(row.is_some())
    }

    async fn insert(&mut self, item: &NewsItem) -> Result<()> {
        let tags = serde_json::to_string(&item.tags).context("encoding tags")?;
        sqlx::query(
            r#"
            INSERT INTO news
            (id, title, summary, content, source, url, publish_date, image_url, category, tags)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.title)
        .bind(&item.summary)
        .bind(&item.content)
        .bind(&item.source)
        .bind(&item.url)
        .bind(item.publish_date.to_rfc3339())
        .bind(item.image_url.as_deref())
        .bind(&item.category)
        .bind(&tags)
        .execute(&mut *self.tx)
        .await
        .with_context(|| format!("inserting news {}", item.id))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.context("committing news transaction")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("rolling back news transaction")
    }
}

fn item_from_row(row: &SqliteRow) -> Option<NewsItem> {
    Some(NewsItem {
        id: row.get("id"),
        title: row.get("title"),
        summary: row.get("summary"),
        content: row.get("content"),
        source: row.get("source"),
        url: row.get("url"),
        publish_date: DateTime::parse_from_rfc3339(&row.get::<String, _>("publish_date"))
            .ok()?
            .with_timezone(&Utc),
        image_url: row.get::<Option<String>, _>("image_url"),
        category: row.get("category"),
        tags: serde_json::from_str(&row.get::<String, _>("tags")).unwrap_or_default(),
    })
}
