// src/store/mod.rs
pub mod memory;
pub mod sqlite;

pub use memory::MemoryNewsStore;
pub use sqlite::SqliteNewsStore;

use anyhow::Result;

use crate::ingest::types::NewsItem;

/// Persistence boundary for ingested news. Each ingest cycle runs against
/// exactly one transaction: rows become visible to the read side only after
/// `commit`, and a failed cycle rolls back to nothing.
#[async_trait::async_trait]
pub trait NewsStore: Send + Sync {
    /// Open the transaction covering one full ingest cycle.
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    async fn count(&self) -> Result<u64>;

    /// Most recently published committed rows, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<NewsItem>>;
}

/// One open transaction. Dropping it without `commit` discards the writes.
#[async_trait::async_trait]
pub trait StoreTx: Send {
    /// Point lookup on the canonical id — the dedup gate.
    async fn exists(&mut self, id: &str) -> Result<bool>;

    async fn insert(&mut self, item: &NewsItem) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
