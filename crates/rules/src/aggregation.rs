//! Alert aggregation windows.
//!
//! While a window is open, matching events for the same rule and aggregation
//! key are grouped under one aggregate id. The close time and the aggregate id
//! live in a single [`AggregationWindow`] value, so they are always inserted
//! and removed together.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use alertwatch_core::{Result, RuleKey, RuleStateError};

use crate::sync::lock;

const STORE: &str = "aggregation window store";

/// Identifier grouping the matches of one aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateId(Uuid);

impl AggregateId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An open aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationWindow {
    pub closes_at: DateTime<Utc>,
    pub aggregate_id: AggregateId,
}

/// Rule → {aggregation key → window}.
#[derive(Debug, Default)]
pub struct AggregationWindowStore {
    windows: Mutex<HashMap<RuleKey, HashMap<String, AggregationWindow>>>,
}

impl AggregationWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the aggregate id of the open window for `(rule, agg_key)`, or
    /// open a new window closing at `now + window` if none is open.
    ///
    /// A window is still open at exactly its close time.
    pub fn get_or_open_window(
        &self,
        rule: &RuleKey,
        agg_key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<AggregateId> {
        let closes_at = now.checked_add_signed(window);
        let mut windows = lock(&self.windows, STORE)?;
        let per_rule = windows.entry(rule.clone()).or_default();

        if let Some(open) = per_rule.get(agg_key) {
            if now <= open.closes_at {
                return Ok(open.aggregate_id);
            }
        }

        let Some(closes_at) = closes_at else {
            if per_rule.is_empty() {
                windows.remove(rule);
            }
            return Err(RuleStateError::Config(format!(
                "aggregation window out of range: {window}"
            )));
        };
        let opened = AggregationWindow {
            closes_at,
            aggregate_id: AggregateId::new(),
        };
        per_rule.insert(agg_key.to_string(), opened);
        debug!(
            rule = %rule,
            agg_key,
            aggregate_id = %opened.aggregate_id,
            closes_at = %opened.closes_at,
            "opened aggregation window"
        );
        Ok(opened.aggregate_id)
    }

    /// Read a window without modifying it.
    pub fn window(&self, rule: &RuleKey, agg_key: &str) -> Result<Option<AggregationWindow>> {
        Ok(lock(&self.windows, STORE)?
            .get(rule)
            .and_then(|per_rule| per_rule.get(agg_key))
            .copied())
    }

    /// Remove every window whose close time is at or before `now`.
    ///
    /// Rules left with no windows are dropped from the map entirely.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut windows = lock(&self.windows, STORE)?;
        let mut removed = 0;
        windows.retain(|_, per_rule| {
            let before = per_rule.len();
            per_rule.retain(|_, w| now < w.closes_at);
            removed += before - per_rule.len();
            !per_rule.is_empty()
        });
        if removed > 0 {
            debug!(removed, "swept expired aggregation windows");
        }
        Ok(removed)
    }

    /// Remove every window belonging to `rule`.
    pub fn evict_rule(&self, rule: &RuleKey) -> Result<usize> {
        Ok(lock(&self.windows, STORE)?
            .remove(rule)
            .map(|per_rule| per_rule.len())
            .unwrap_or(0))
    }

    /// Remove the windows of every rule matching `stale`.
    pub fn evict_where(&self, stale: impl Fn(&RuleKey) -> bool) -> Result<usize> {
        let mut windows = lock(&self.windows, STORE)?;
        let mut removed = 0;
        windows.retain(|rule, per_rule| {
            if stale(rule) {
                removed += per_rule.len();
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    pub fn contains_rule(&self, rule: &RuleKey) -> Result<bool> {
        Ok(lock(&self.windows, STORE)?.contains_key(rule))
    }

    /// Total number of open windows across all rules.
    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.windows, STORE)?.values().map(HashMap::len).sum())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
