//! The set of rule-state stores shared by evaluation and maintenance.

use std::sync::Arc;

use crate::aggregation::AggregationWindowStore;
use crate::backend::SearchBackend;
use crate::clients::ClientPool;
use crate::cursors::CursorTracker;
use crate::hits::ProcessedHitLedger;
use crate::query::PaginatedQuery;
use crate::registry::{RemovalReceiver, RuleRegistry};
use crate::silence::SilenceCache;

/// Handles to every per-rule store.
///
/// Cloning is cheap and yields handles to the same stores.
pub struct RuleState<B: SearchBackend> {
    pub registry: Arc<RuleRegistry>,
    pub silences: Arc<SilenceCache>,
    pub clients: Arc<ClientPool<B>>,
    pub windows: Arc<AggregationWindowStore>,
    pub cursors: Arc<CursorTracker<B>>,
    pub hits: Arc<ProcessedHitLedger>,
}

impl<B: SearchBackend> RuleState<B> {
    /// Build empty stores over `backend`, plus the registry's removal feed.
    pub fn new(backend: Arc<B>) -> (Self, RemovalReceiver) {
        let (registry, removals) = RuleRegistry::with_removal_channel();
        let state = Self {
            registry: Arc::new(registry),
            silences: Arc::new(SilenceCache::new()),
            clients: Arc::new(ClientPool::new(Arc::clone(&backend))),
            windows: Arc::new(AggregationWindowStore::new()),
            cursors: Arc::new(CursorTracker::new(backend)),
            hits: Arc::new(ProcessedHitLedger::new()),
        };
        (state, removals)
    }

    /// A query driver over these stores.
    pub fn query(&self, max_pages: Option<u32>) -> PaginatedQuery<B> {
        PaginatedQuery::new(
            Arc::clone(&self.clients),
            Arc::clone(&self.cursors),
            Arc::clone(&self.hits),
            max_pages,
        )
    }
}

impl<B: SearchBackend> Clone for RuleState<B> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            silences: Arc::clone(&self.silences),
            clients: Arc::clone(&self.clients),
            windows: Arc::clone(&self.windows),
            cursors: Arc::clone(&self.cursors),
            hits: Arc::clone(&self.hits),
        }
    }
}
