//! Processed-hit ledger for de-duplicating overlapping query windows.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use alertwatch_core::{Result, RuleKey};

use crate::backend::Hit;
use crate::sync::lock;

const STORE: &str = "processed hit ledger";

/// Rule → {hit id → hit timestamp}.
#[derive(Debug, Default)]
pub struct ProcessedHitLedger {
    seen: Mutex<HashMap<RuleKey, HashMap<String, DateTime<Utc>>>>,
}

impl ProcessedHitLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only hits the rule has not processed before, recording them.
    pub fn remove_duplicates(&self, rule: &RuleKey, hits: Vec<Hit>) -> Result<Vec<Hit>> {
        let mut seen = lock(&self.seen, STORE)?;
        let per_rule = seen.entry(rule.clone()).or_default();
        let total = hits.len();
        let fresh: Vec<Hit> = hits
            .into_iter()
            .filter(|hit| per_rule.insert(hit.id.clone(), hit.timestamp).is_none())
            .collect();
        if fresh.len() < total {
            debug!(rule = %rule, dupes = total - fresh.len(), "dropped duplicate hits");
        }
        Ok(fresh)
    }

    /// Forget hits older than `buffer` relative to `now`.
    pub fn forget_older_than(&self, now: DateTime<Utc>, buffer: Duration) -> Result<usize> {
        let Some(cutoff) = now.checked_sub_signed(buffer) else {
            return Ok(0);
        };
        let mut seen = lock(&self.seen, STORE)?;
        let mut removed = 0;
        seen.retain(|_, per_rule| {
            let before = per_rule.len();
            per_rule.retain(|_, ts| *ts >= cutoff);
            removed += before - per_rule.len();
            !per_rule.is_empty()
        });
        if removed > 0 {
            debug!(removed, "forgot old processed hits");
        }
        Ok(removed)
    }

    pub fn evict_rule(&self, rule: &RuleKey) -> Result<usize> {
        Ok(lock(&self.seen, STORE)?
            .remove(rule)
            .map(|per_rule| per_rule.len())
            .unwrap_or(0))
    }

    /// Forget the hits of every rule matching `stale`.
    pub fn evict_where(&self, stale: impl Fn(&RuleKey) -> bool) -> Result<usize> {
        let mut seen = lock(&self.seen, STORE)?;
        let mut removed = 0;
        seen.retain(|rule, per_rule| {
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
        Ok(lock(&self.seen, STORE)?.contains_key(rule))
    }

    /// Number of remembered hits for `rule`.
    pub fn seen_count(&self, rule: &RuleKey) -> Result<usize> {
        Ok(lock(&self.seen, STORE)?
            .get(rule)
            .map(HashMap::len)
            .unwrap_or(0))
    }
}
