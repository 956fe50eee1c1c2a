// src/ingest/scheduler.rs
//! Background polling loops, one per provider, with cooperative shutdown.
//!
//! The stop signal is a watch channel passed into every loop; `stop()`
//! flips it and then joins the handles, so an in-flight cycle always
//! finishes its transaction before the loop exits.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::ingest::providers::xueqiu::DEFAULT_CATEGORY;
use crate::ingest::types::NewsProvider;
use crate::ingest::{run_cycle, CycleOutcome};
use crate::store::NewsStore;

pub struct IngestScheduler {
    config: IngestConfig,
    store: Arc<dyn NewsStore>,
    providers: Vec<Arc<dyn NewsProvider>>,
    state: tokio::sync::Mutex<Option<RunningLoops>>,
}

struct RunningLoops {
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl IngestScheduler {
    pub fn new(
        config: IngestConfig,
        store: Arc<dyn NewsStore>,
        providers: Vec<Arc<dyn NewsProvider>>,
    ) -> Self {
        Self {
            config,
            store,
            providers,
            state: tokio::sync::Mutex::new(None),
        }
    }

    /// Spawn the polling loops. No-op when the feature is disabled by
    /// configuration or the scheduler is already running.
    pub async fn start(&self) {
        if !self.config.enabled {
            info!("news ingestion disabled, scheduler not started");
            return;
        }

        let mut state = self.state.lock().await;
        if state.is_some() {
            warn!("ingest scheduler already running");
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let handles = self
            .providers
            .iter()
            .map(|provider| {
                tokio::spawn(provider_loop(
                    provider.clone(),
                    self.store.clone(),
                    self.config.clone(),
                    stop_rx.clone(),
                ))
            })
            .collect();

        *state = Some(RunningLoops { stop_tx, handles });
        info!(
            providers = self.providers.len(),
            interval_secs = self.config.fetch_interval.as_secs(),
            "ingest scheduler started"
        );
    }

    /// Signal the loops to stop and wait until every one of them has
    /// exited. No-op when not running.
    pub async fn stop(&self) {
        let running = self.state.lock().await.take();
        let Some(running) = running else {
            return;
        };

        let _ = running.stop_tx.send(true);
        for handle in running.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "ingest loop did not shut down cleanly");
            }
        }
        info!("ingest scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// On-demand single pass over every provider, independent of the loops.
    /// Returns how many items were newly persisted; zero when the master
    /// gate is off.
    pub async fn fetch_once(&self, category: &str) -> Result<usize> {
        if !self.config.enabled {
            info!("news ingestion disabled, manual fetch skipped");
            return Ok(0);
        }

        let mut inserted = 0;
        for provider in &self.providers {
            match run_cycle(provider.as_ref(), self.store.as_ref(), category).await {
                Ok(CycleOutcome { inserted: n, .. }) => inserted += n,
                Err(e) => {
                    warn!(provider = provider.name(), error = ?e, "manual fetch cycle failed")
                }
            }
        }
        Ok(inserted)
    }
}

async fn provider_loop(
    provider: Arc<dyn NewsProvider>,
    store: Arc<dyn NewsStore>,
    config: IngestConfig,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        if *stop_rx.borrow() {
            break;
        }

        // A failed cycle never ends the loop; it only shortens the nap.
        let delay = match run_cycle(provider.as_ref(), store.as_ref(), DEFAULT_CATEGORY).await {
            Ok(_) => config.fetch_interval,
            Err(e) => {
                error!(provider = provider.name(), error = ?e, "ingest cycle failed");
                config.error_backoff
            }
        };

        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
    debug!(provider = provider.name(), "ingest loop exited");
}
