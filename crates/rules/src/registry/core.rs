//! [`RuleRegistry`]: the authoritative set of rules that currently exist.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use alertwatch_core::{Result, RuleKey, RuleStateError};

use super::events::RuleEvent;

const STORE: &str = "rule registry";

/// Receiving side of the registry's removal notifications.
pub type RemovalReceiver = mpsc::UnboundedReceiver<RuleKey>;

#[derive(Debug, Clone)]
enum RuleStatus {
    Active(RuleKey),
    /// Out of the active set, name still reserved.
    Disabled(RuleKey),
}

/// Point-in-time view of the active rules.
#[derive(Debug, Clone)]
pub struct ActiveRules {
    ids: HashSet<RuleKey>,
    watermark: u64,
}

impl ActiveRules {
    pub fn contains(&self, rule: &RuleKey) -> bool {
        self.ids.contains(rule)
    }

    /// Whether state keyed by `rule` belongs to a rule that is gone.
    ///
    /// Keys issued after the snapshot are never stale, so a rule added while
    /// a sweep is running keeps its state.
    pub fn is_stale(&self, rule: &RuleKey) -> bool {
        rule.generation() < self.watermark && !self.ids.contains(rule)
    }

    pub fn ids(&self) -> &HashSet<RuleKey> {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Tracks which rules exist and hands out their [`RuleKey`]s.
///
/// `remove` and `disable` return as soon as the registry is updated. Cache
/// cleanup for the departed rule happens asynchronously: the key is pushed
/// onto the removal channel drained by the maintenance task.
pub struct RuleRegistry {
    rules: RwLock<HashMap<String, RuleStatus>>,
    next_generation: AtomicU64,
    removals: Option<mpsc::UnboundedSender<RuleKey>>,
}

impl RuleRegistry {
    /// Create a registry without a removal channel.
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            removals: None,
        }
    }

    /// Create a registry whose removals are reported on the returned receiver.
    pub fn with_removal_channel() -> (Self, RemovalReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Self {
            removals: Some(tx),
            ..Self::new()
        };
        (registry, rx)
    }

    /// Register a newly loaded rule.
    ///
    /// Fails if the name is active, or reserved by a disabled rule.
    pub fn add(&self, name: &str) -> Result<RuleKey> {
        let mut rules = self.write()?;
        match rules.get(name) {
            Some(RuleStatus::Active(_)) => Err(RuleStateError::DuplicateRule(name.to_string())),
            Some(RuleStatus::Disabled(_)) => Err(RuleStateError::RuleReserved(name.to_string())),
            None => {
                let key = self.next_key(name);
                rules.insert(name.to_string(), RuleStatus::Active(key.clone()));
                info!(rule = %key, "rule added");
                Ok(key)
            }
        }
    }

    /// Forget a rule entirely, freeing its name.
    pub fn remove(&self, name: &str) -> Result<Option<RuleKey>> {
        let removed = self.write()?.remove(name);
        match removed {
            Some(RuleStatus::Active(key)) => {
                info!(rule = %key, "rule removed");
                self.notify_removed(&key);
                Ok(Some(key))
            }
            Some(RuleStatus::Disabled(key)) => {
                info!(rule = %key, "disabled rule removed");
                Ok(Some(key))
            }
            None => Ok(None),
        }
    }

    /// Take a rule out of the active set while keeping its name reserved.
    ///
    /// Returns the key that stopped being active, or `None` if the rule was
    /// not active.
    pub fn disable(&self, name: &str) -> Result<Option<RuleKey>> {
        let mut rules = self.write()?;
        let key = match rules.get(name) {
            Some(RuleStatus::Active(key)) => key.clone(),
            _ => return Ok(None),
        };
        rules.insert(name.to_string(), RuleStatus::Disabled(key.clone()));
        drop(rules);

        info!(rule = %key, "rule disabled");
        self.notify_removed(&key);
        Ok(Some(key))
    }

    /// Re-activate a disabled rule under a fresh generation.
    pub fn enable(&self, name: &str) -> Result<RuleKey> {
        let mut rules = self.write()?;
        match rules.get(name) {
            Some(RuleStatus::Disabled(_)) => {
                let key = self.next_key(name);
                rules.insert(name.to_string(), RuleStatus::Active(key.clone()));
                info!(rule = %key, "rule re-enabled");
                Ok(key)
            }
            Some(RuleStatus::Active(_)) => Err(RuleStateError::DuplicateRule(name.to_string())),
            None => Err(RuleStateError::UnknownRule(name.to_string())),
        }
    }

    /// Whether `rule` is the currently active lifetime of its name.
    pub fn is_active(&self, rule: &RuleKey) -> Result<bool> {
        Ok(matches!(
            self.read()?.get(rule.name()),
            Some(RuleStatus::Active(key)) if key == rule
        ))
    }

    /// The active key for `name`, if the rule is active.
    pub fn key(&self, name: &str) -> Result<Option<RuleKey>> {
        Ok(match self.read()?.get(name) {
            Some(RuleStatus::Active(key)) => Some(key.clone()),
            _ => None,
        })
    }

    /// Snapshot of every active rule key.
    pub fn active_rule_ids(&self) -> Result<HashSet<RuleKey>> {
        Ok(self.active_snapshot()?.ids)
    }

    /// Snapshot of the active set, with the generation watermark it was taken at.
    pub fn active_snapshot(&self) -> Result<ActiveRules> {
        let rules = self.read()?;
        // Keys are only issued under the write lock, so nothing can be issued
        // between reading the map and the counter.
        let watermark = self.next_generation.load(Ordering::Relaxed);
        let ids = rules
            .values()
            .filter_map(|status| match status {
                RuleStatus::Active(key) => Some(key.clone()),
                RuleStatus::Disabled(_) => None,
            })
            .collect();
        Ok(ActiveRules { ids, watermark })
    }

    /// Names of disabled rules, sorted.
    pub fn disabled_rules(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .read()?
            .iter()
            .filter(|(_, status)| matches!(status, RuleStatus::Disabled(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Apply one lifecycle event from the rule source.
    pub fn apply(&self, event: &RuleEvent) -> Result<()> {
        match event {
            RuleEvent::Added { rule_id } => self.add(rule_id).map(|_| ()),
            RuleEvent::Removed { rule_id } => self.remove(rule_id).map(|_| ()),
            RuleEvent::Disabled { rule_id } => self.disable(rule_id).map(|_| ()),
            RuleEvent::Enabled { rule_id } => self.enable(rule_id).map(|_| ()),
        }
    }

    /// Apply rule-source events until the channel closes or `cancel` fires.
    pub fn listen(
        self: Arc<Self>,
        mut events: mpsc::Receiver<RuleEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        if let Err(e) = self.apply(&event) {
                            warn!(rule_id = %event.rule_id(), error = %e, "rejected rule event");
                        }
                    }
                }
            }
            debug!("rule event listener stopped");
        })
    }

    fn next_key(&self, name: &str) -> RuleKey {
        RuleKey::new(name, self.next_generation.fetch_add(1, Ordering::Relaxed))
    }

    fn notify_removed(&self, key: &RuleKey) {
        if let Some(tx) = &self.removals {
            if tx.send(key.clone()).is_err() {
                debug!(rule = %key, "removal channel closed, relying on periodic sweep");
            }
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, RuleStatus>>> {
        self.rules.read().map_err(|_| RuleStateError::LockPoisoned(STORE))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, RuleStatus>>> {
        self.rules.write().map_err(|_| RuleStateError::LockPoisoned(STORE))
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
