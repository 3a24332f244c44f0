// src/memory/retention.rs
// Per-scope retention window over stored memory records

use std::sync::Arc;

use tracing::{debug, info};

use crate::memory::store::MemoryStore;
use crate::memory::types::Scope;

/// Bounds the stored record count per scope by pruning oldest records.
///
/// `prune` is idempotent and convergent: repeated runs with no intervening
/// writes change nothing, and a run after concurrent overshoot brings the
/// scope back under the window.
pub struct RetentionManager {
    store: Arc<MemoryStore>,
    keep_last: usize,
}

impl RetentionManager {
    pub fn new(store: Arc<MemoryStore>, keep_last: usize) -> Self {
        Self { store, keep_last }
    }

    pub fn window(&self) -> usize {
        self.keep_last
    }

    /// Delete the oldest records beyond the retention window. Returns the
    /// number of records selected for deletion.
    pub async fn prune(&self, scope: &Scope) -> usize {
        self.prune_to(scope, self.keep_last).await
    }

    /// Prune with an explicit window, for callers that override the default.
    pub async fn prune_to(&self, scope: &Scope, keep_last: usize) -> usize {
        let records = self.store.scope_records(scope).await;
        if records.len() <= keep_last {
            debug!(
                "retention: {} within window ({} <= {})",
                scope,
                records.len(),
                keep_last
            );
            return 0;
        }

        let excess = records.len() - keep_last;
        let ids: Vec<u64> = records[..excess].iter().map(|r| r.id).collect();
        self.store.delete(&ids).await;

        info!(
            "retention: pruned {} of {} records for {}",
            excess,
            records.len(),
            scope
        );
        excess
    }
}
