// src/store/memory.rs
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::{NewsStore, StoreTx};
use crate::ingest::types::NewsItem;

/// In-memory store, substituted for SQLite via dependency injection in
/// tests and offline runs. Writes are staged per transaction and become
/// visible only on commit, mirroring the SQLite backend's semantics.
#[derive(Clone, Default)]
pub struct MemoryNewsStore {
    rows: Arc<Mutex<BTreeMap<String, NewsItem>>>,
}

impl MemoryNewsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, NewsItem>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of all committed rows, for test assertions.
    pub fn items(&self) -> Vec<NewsItem> {
        self.lock().values().cloned().collect()
    }
}

#[async_trait]
impl NewsStore for MemoryNewsStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        Ok(Box::new(MemoryTx {
            store: self.clone(),
            staged: Vec::new(),
        }))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.lock().len() as u64)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<NewsItem>> {
        let mut items = self.items();
        items.sort_by(|a, b| b.publish_date.cmp(&a.publish_date));
        items.truncate(limit);
        Ok(items)
    }
}

struct MemoryTx {
    store: MemoryNewsStore,
    staged: Vec<NewsItem>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn exists(&mut self, id: &str) -> Result<bool> {
        Ok(self.store.lock().contains_key(id) || self.staged.iter().any(|i| i.id == id))
    }

    async fn insert(&mut self, item: &NewsItem) -> Result<()> {
        // Emulate the primary-key constraint.
        if self.exists(&item.id).await? {
            bail!("duplicate news id: {}", item.id);
        }
        self.staged.push(item.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let staged = self.staged;
        let mut rows = self.store.lock();
        for item in &staged {
            if rows.contains_key(&item.id) {
                bail!("duplicate news id at commit: {}", item.id);
            }
        }
        for item in staged {
            rows.insert(item.id.clone(), item);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
