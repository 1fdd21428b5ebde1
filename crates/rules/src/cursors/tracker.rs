//! [`CursorTracker`]: rule → open pagination cursor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use alertwatch_core::{Result, RuleKey};

use crate::backend::{CursorToken, SearchBackend};
use crate::sync::lock;

const STORE: &str = "cursor tracker";

/// Lifecycle of one cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Open,
    Closed,
}

/// Identifies one open/close cycle of a rule's cursor.
///
/// The serial distinguishes a cursor from a later one opened for the same
/// rule, so a late close through an old handle cannot close the new cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorHandle {
    rule: RuleKey,
    serial: u64,
}

impl CursorHandle {
    pub fn rule(&self) -> &RuleKey {
        &self.rule
    }
}

struct CursorRecord<B: SearchBackend> {
    serial: u64,
    connection: B::Handle,
    token: Option<CursorToken>,
}

/// Rule → open pagination cursor, with idempotent close.
pub struct CursorTracker<B: SearchBackend> {
    backend: Arc<B>,
    open: Mutex<HashMap<RuleKey, CursorRecord<B>>>,
    next_serial: AtomicU64,
}

impl<B: SearchBackend> CursorTracker<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            open: Mutex::new(HashMap::new()),
            next_serial: AtomicU64::new(1),
        }
    }

    /// Record a new open cursor for `rule` on `connection`.
    ///
    /// A rule runs one paginated query at a time. A record left over from an
    /// earlier run is replaced, and its server-side cursor released.
    pub async fn open(&self, rule: &RuleKey, connection: B::Handle) -> Result<CursorHandle> {
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let record = CursorRecord {
            serial,
            connection,
            token: None,
        };
        let stale = lock(&self.open, STORE)?.insert(rule.clone(), record);
        if let Some(stale) = stale {
            warn!(rule = %rule, "replacing cursor left open by an earlier query");
            self.release(rule, stale).await;
        }
        Ok(CursorHandle {
            rule: rule.clone(),
            serial,
        })
    }

    /// Store the latest server-side token for an open cursor.
    ///
    /// Returns `false` if `cursor` is no longer the rule's open cursor; the
    /// caller then owns `token` and must release it itself.
    pub fn record_token(&self, cursor: &CursorHandle, token: CursorToken) -> Result<bool> {
        let mut open = lock(&self.open, STORE)?;
        match open.get_mut(&cursor.rule) {
            Some(record) if record.serial == cursor.serial => {
                record.token = Some(token);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Close the rule's open cursor, if any.
    ///
    /// The local record is removed before the backend is contacted, so a
    /// second close is a no-op and the record never outlives a failed release.
    /// "Not found" from the backend counts as released. Returns whether a
    /// cursor was open.
    pub async fn close(&self, rule: &RuleKey) -> Result<bool> {
        let record = lock(&self.open, STORE)?.remove(rule);
        match record {
            Some(record) => {
                self.release(rule, record).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close `cursor` only if it is still the rule's open cursor.
    pub async fn close_cursor(&self, cursor: &CursorHandle) -> Result<bool> {
        let record = {
            let mut open = lock(&self.open, STORE)?;
            let current = open
                .get(&cursor.rule)
                .is_some_and(|record| record.serial == cursor.serial);
            if current {
                open.remove(&cursor.rule)
            } else {
                None
            }
        };
        match record {
            Some(record) => {
                self.release(&cursor.rule, record).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn state(&self, cursor: &CursorHandle) -> Result<CursorState> {
        let open = lock(&self.open, STORE)?;
        Ok(match open.get(&cursor.rule) {
            Some(record) if record.serial == cursor.serial => CursorState::Open,
            _ => CursorState::Closed,
        })
    }

    pub fn is_open(&self, rule: &RuleKey) -> Result<bool> {
        Ok(lock(&self.open, STORE)?.contains_key(rule))
    }

    pub fn token(&self, rule: &RuleKey) -> Result<Option<CursorToken>> {
        Ok(lock(&self.open, STORE)?
            .get(rule)
            .and_then(|record| record.token.clone()))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.open, STORE)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    async fn release(&self, rule: &RuleKey, record: CursorRecord<B>) {
        let Some(token) = record.token else {
            debug!(rule = %rule, "closed cursor with no server-side token");
            return;
        };
        match self.backend.release_cursor(&record.connection, &token).await {
            Ok(()) => debug!(rule = %rule, "released cursor"),
            Err(e) if e.is_not_found() => {
                debug!(rule = %rule, "cursor already gone on backend");
            }
            Err(e) => warn!(
                rule = %rule,
                error = %e,
                "failed to release cursor, leaving it to backend expiry"
            ),
        }
    }
}
