//! Per-rule backend connection pool.
//!
//! Each rule owns at most one connection. Opening happens under a per-rule
//! async lock so overlapping evaluations of the same rule share one `open`
//! call; the pool-wide map lock is only held for lookups and never across an
//! `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use alertwatch_core::{Result, RuleKey};

use crate::backend::SearchBackend;
use crate::sync::lock;

const STORE: &str = "client pool";

struct Connection<B: SearchBackend> {
    params: B::Params,
    handle: B::Handle,
}

type Slot<B> = Arc<tokio::sync::Mutex<Option<Connection<B>>>>;

/// Rule → backend connection handle.
pub struct ClientPool<B: SearchBackend> {
    backend: Arc<B>,
    slots: Mutex<HashMap<RuleKey, Slot<B>>>,
}

impl<B: SearchBackend> ClientPool<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The backend this pool opens connections with.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Return the rule's connection, opening one if needed.
    ///
    /// If the stored connection was opened with different parameters (the
    /// rule was reloaded), it is closed and replaced. Open failures propagate
    /// and leave nothing stored, so the next call retries.
    pub async fn get(&self, rule: &RuleKey, params: &B::Params) -> Result<B::Handle> {
        loop {
            let slot = {
                let mut slots = lock(&self.slots, STORE)?;
                Arc::clone(slots.entry(rule.clone()).or_default())
            };

            let mut conn = slot.lock().await;

            // An eviction may have detached this slot while we waited for it.
            if !self.is_current(rule, &slot)? {
                continue;
            }

            if let Some(existing) = conn.as_ref() {
                if existing.params == *params {
                    return Ok(existing.handle.clone());
                }
            }
            if let Some(stale) = conn.take() {
                debug!(rule = %rule, "connection parameters changed, reopening");
                self.close_quietly(rule, stale.handle).await;
            }

            match self.backend.open(params).await {
                Ok(handle) => {
                    debug!(rule = %rule, "opened backend connection");
                    *conn = Some(Connection {
                        params: params.clone(),
                        handle: handle.clone(),
                    });
                    return Ok(handle);
                }
                Err(e) => {
                    drop(conn);
                    self.remove_if_current(rule, &slot)?;
                    return Err(e.into());
                }
            }
        }
    }

    /// Close and forget every connection whose rule is not in `active`.
    ///
    /// Close failures are logged and otherwise ignored. Returns the number of
    /// rules removed.
    pub async fn evict_stale(&self, active: &HashSet<RuleKey>) -> Result<usize> {
        self.evict_where(|rule| !active.contains(rule)).await
    }

    /// Close and forget every connection whose rule matches `is_stale`.
    pub async fn evict_where<F>(&self, is_stale: F) -> Result<usize>
    where
        F: Fn(&RuleKey) -> bool,
    {
        let stale: Vec<(RuleKey, Slot<B>)> = {
            let mut slots = lock(&self.slots, STORE)?;
            let keys: Vec<RuleKey> = slots
                .keys()
                .filter(|rule| is_stale(*rule))
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|rule| slots.remove(&rule).map(|slot| (rule, slot)))
                .collect()
        };

        let removed = stale.len();
        for (rule, slot) in stale {
            if let Some(conn) = slot.lock().await.take() {
                self.close_quietly(&rule, conn.handle).await;
            }
        }
        if removed > 0 {
            debug!(removed, "evicted stale backend connections");
        }
        Ok(removed)
    }

    /// Close and forget the connection for one rule. Returns whether one was held.
    pub async fn evict(&self, rule: &RuleKey) -> Result<bool> {
        let slot = lock(&self.slots, STORE)?.remove(rule);
        let Some(slot) = slot else {
            return Ok(false);
        };
        let conn = slot.lock().await.take();
        match conn {
            Some(conn) => {
                self.close_quietly(rule, conn.handle).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn contains(&self, rule: &RuleKey) -> Result<bool> {
        Ok(lock(&self.slots, STORE)?.contains_key(rule))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.slots, STORE)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn is_current(&self, rule: &RuleKey, slot: &Slot<B>) -> Result<bool> {
        Ok(lock(&self.slots, STORE)?
            .get(rule)
            .is_some_and(|current| Arc::ptr_eq(current, slot)))
    }

    fn remove_if_current(&self, rule: &RuleKey, slot: &Slot<B>) -> Result<()> {
        let mut slots = lock(&self.slots, STORE)?;
        if slots.get(rule).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(rule);
        }
        Ok(())
    }

    async fn close_quietly(&self, rule: &RuleKey, handle: B::Handle) {
        match self.backend.close(handle).await {
            Ok(()) => debug!(rule = %rule, "closed backend connection"),
            Err(e) => warn!(rule = %rule, error = %e, "failed to close backend connection"),
        }
    }
}
