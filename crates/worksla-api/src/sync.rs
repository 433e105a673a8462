//! Cursorless reconciliation of the local cache against upstream.
//!
//! There is no persisted watermark: every pass re-reads from offset 0 up to
//! a page budget and relies on upsert idempotency. Each batch is durable
//! before the next one is fetched, so an aborted pass keeps its partial
//! progress.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::models::WorkItemRecord;
use crate::repo::WorkItemRepo;
use crate::upstream::UpstreamClient;

const STARTUP_DELAY: Duration = Duration::from_secs(2);

/// Paged provider of work items. The engine only needs this one call, so
/// tests can drive it with canned pages.
#[async_trait]
pub trait WorkItemSource: Send + Sync {
    /// One page plus the source's reported total. An empty page means the
    /// source is exhausted at this offset.
    async fn fetch_page(&self, offset: u64, limit: u64) -> (Vec<WorkItemRecord>, u64);
}

#[async_trait]
impl WorkItemSource for UpstreamClient {
    async fn fetch_page(&self, offset: u64, limit: u64) -> (Vec<WorkItemRecord>, u64) {
        self.list_work_items(offset, limit, &BTreeMap::new(), true).await
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SyncOutcome {
    pub processed: u64,
    /// Upstream's total as reported by the first page of this pass. Never
    /// re-read on later pages, so it can go stale mid-pass.
    pub source_total: u64,
}

pub struct SyncEngine {
    source: Arc<dyn WorkItemSource>,
    repo: WorkItemRepo,
    page_budget: u64,
    page_size: u64,
    // serializes manual triggers against the periodic loop
    gate: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn WorkItemSource>,
        repo: WorkItemRepo,
        page_budget: u64,
        page_size: u64,
    ) -> Self {
        Self {
            source,
            repo,
            page_budget,
            page_size,
            gate: Mutex::new(()),
        }
    }

    /// One full pass: fetch pages at increasing offsets, upsert each batch
    /// before advancing. Stops at the page budget, on an empty page, or on
    /// a storage error (logged; progress so far stays committed). At most
    /// one pass runs at a time.
    pub async fn sync_once(&self) -> SyncOutcome {
        let _pass = self.gate.lock().await;
        let mut processed = 0u64;
        let mut source_total = 0u64;
        let mut offset = 0u64;
        let mut first_page = true;

        while processed < self.page_budget {
            let (batch, total) = self.source.fetch_page(offset, self.page_size).await;
            if first_page {
                source_total = total;
                first_page = false;
            }
            if batch.is_empty() {
                break;
            }
            if let Err(err) = self.repo.upsert_batch(&batch).await {
                tracing::error!(error = %err, offset, "sync pass aborted mid-batch");
                break;
            }
            processed += batch.len() as u64;
            offset += self.page_size;
        }

        tracing::info!(processed, source_total, "sync pass finished");
        SyncOutcome {
            processed,
            source_total,
        }
    }

    /// Perpetual background loop: short startup delay, then one pass per
    /// interval. Strictly sequential, so passes never overlap.
    pub async fn run_periodic(self: Arc<Self>, interval: Duration) {
        tokio::time::sleep(STARTUP_DELAY).await;
        loop {
            let outcome = self.sync_once().await;
            tracing::debug!(
                processed = outcome.processed,
                source_total = outcome.source_total,
                "periodic sync pass complete"
            );
            tokio::time::sleep(interval).await;
        }
    }
}
