//! Rule silences and re-alert backoff.
//!
//! A silence suppresses alerts for a rule (or for one query-key value of a
//! rule) until a deadline. Expired entries are logically absent: the hot-path
//! check deletes them as it finds them, and the maintenance sweep removes the
//! ones nobody asks about again.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use alertwatch_core::{Result, RuleKey, RuleStateError};

use crate::sync::lock;

const STORE: &str = "silence cache";

/// Deadline and backoff exponent for one silenced key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilenceEntry {
    /// Alerts are suppressed while `now < until`.
    pub until: DateTime<Utc>,
    /// Current exponential re-alert step.
    pub exponent: u32,
}

/// `None` is the rule-wide silence, `Some(value)` a per-query-key silence.
type SilenceKey = (RuleKey, Option<String>);

fn silence_key(rule: &RuleKey, query_key: Option<&str>) -> SilenceKey {
    (rule.clone(), query_key.map(str::to_owned))
}

/// `now + wait`, rejecting waits that overflow the calendar.
fn deadline(now: DateTime<Utc>, wait: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(wait)
        .ok_or_else(|| RuleStateError::Config(format!("re-alert wait out of range: {wait}")))
}

/// Rule → suppression-expiry mapping.
#[derive(Debug, Default)]
pub struct SilenceCache {
    entries: Mutex<HashMap<SilenceKey, SilenceEntry>>,
}

impl SilenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the rule-wide silence for `rule` is active at `now`.
    pub fn is_silenced(&self, rule: &RuleKey, now: DateTime<Utc>) -> Result<bool> {
        self.is_silenced_for(rule, None, now)
    }

    /// Check-and-expire for one silence key.
    ///
    /// An entry whose deadline has passed is removed under the same lock
    /// acquisition that observed it, and the call reports `false`.
    pub fn is_silenced_for(
        &self,
        rule: &RuleKey,
        query_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let key = silence_key(rule, query_key);
        let mut entries = lock(&self.entries, STORE)?;
        match entries.get(&key) {
            Some(entry) if now < entry.until => Ok(true),
            Some(_) => {
                entries.remove(&key);
                debug!(rule = %rule, query_key = ?query_key, "expired silence removed on lookup");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Silence the whole rule until `until` (upsert, exponent reset).
    pub fn silence(&self, rule: &RuleKey, until: DateTime<Utc>) -> Result<()> {
        self.silence_for(rule, None, until, 0)
    }

    /// Upsert a silence for one key.
    pub fn silence_for(
        &self,
        rule: &RuleKey,
        query_key: Option<&str>,
        until: DateTime<Utc>,
        exponent: u32,
    ) -> Result<()> {
        lock(&self.entries, STORE)?
            .insert(silence_key(rule, query_key), SilenceEntry { until, exponent });
        Ok(())
    }

    /// Read an entry without expiring it.
    pub fn entry(&self, rule: &RuleKey, query_key: Option<&str>) -> Result<Option<SilenceEntry>> {
        Ok(lock(&self.entries, STORE)?
            .get(&silence_key(rule, query_key))
            .copied())
    }

    /// Compute the next silence deadline and exponent after an alert fires.
    ///
    /// Without a cached silence, or without an `exponential_cap`, the result is
    /// `now + realert` with exponent 0. Otherwise the exponent grows when the
    /// previous silence ended less than one step ago and decays for every full
    /// step of quiet time since; the wait never exceeds `exponential_cap`.
    pub fn next_alert_time(
        &self,
        rule: &RuleKey,
        query_key: Option<&str>,
        now: DateTime<Utc>,
        realert: Duration,
        exponential_cap: Option<Duration>,
    ) -> Result<(DateTime<Utc>, u32)> {
        let last = self.entry(rule, query_key)?;
        let (Some(last), Some(cap)) = (last, exponential_cap) else {
            return Ok((deadline(now, realert)?, 0));
        };

        let step = realert.num_milliseconds() as f64 / 1000.0;
        let step_at = |exp: i32| step * 2f64.powi(exp);

        let mut diff = (now - last.until).num_milliseconds() as f64 / 1000.0;
        let mut exponent = last.exponent as i32;
        if diff < step_at(exponent) {
            exponent += 1;
        } else {
            while diff > step_at(exponent) && exponent > 0 {
                diff -= step_at(exponent);
                exponent -= 1;
            }
        }

        let wait = Duration::milliseconds((step_at(exponent) * 1000.0) as i64);
        if wait >= cap {
            return Ok((deadline(now, cap)?, (exponent - 1).max(0) as u32));
        }
        Ok((deadline(now, wait)?, exponent as u32))
    }

    /// Remove every entry whose deadline is at or before `now`.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut entries = lock(&self.entries, STORE)?;
        let before = entries.len();
        entries.retain(|_, entry| now < entry.until);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "swept expired silences");
        }
        Ok(removed)
    }

    /// Remove every silence belonging to `rule`.
    pub fn evict(&self, rule: &RuleKey) -> Result<usize> {
        let mut entries = lock(&self.entries, STORE)?;
        let before = entries.len();
        entries.retain(|(owner, _), _| owner != rule);
        Ok(before - entries.len())
    }

    /// Remove every silence whose rule matches `stale`.
    pub fn evict_where(&self, stale: impl Fn(&RuleKey) -> bool) -> Result<usize> {
        let mut entries = lock(&self.entries, STORE)?;
        let before = entries.len();
        entries.retain(|(owner, _), _| !stale(owner));
        Ok(before - entries.len())
    }

    /// Whether any silence is stored for `rule`.
    pub fn contains_rule(&self, rule: &RuleKey) -> Result<bool> {
        Ok(lock(&self.entries, STORE)?.keys().any(|(owner, _)| owner == rule))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.entries, STORE)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    #[cfg(test)]
    pub(crate) fn poison(&self) {
        crate::sync::poison(&self.entries);
    }
}
