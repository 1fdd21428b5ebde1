//! Scoped cursor ownership for the query side.

use std::sync::Arc;

use tracing::warn;

use alertwatch_core::{Result, RuleKey};

use crate::backend::{CursorToken, SearchBackend};

use super::tracker::{CursorHandle, CursorTracker};

/// An open cursor that is closed when the owning query finishes.
///
/// Call [`close`](CursorGuard::close) on every normal exit path. If the guard
/// is dropped while still armed (the query future was cancelled or panicked),
/// the close is spawned onto the current tokio runtime instead.
pub struct CursorGuard<B: SearchBackend> {
    tracker: Arc<CursorTracker<B>>,
    cursor: CursorHandle,
    armed: bool,
}

impl<B: SearchBackend> CursorGuard<B> {
    /// Open a cursor for `rule` on `connection`.
    pub async fn acquire(
        tracker: Arc<CursorTracker<B>>,
        rule: &RuleKey,
        connection: B::Handle,
    ) -> Result<Self> {
        let cursor = tracker.open(rule, connection).await?;
        Ok(Self {
            tracker,
            cursor,
            armed: true,
        })
    }

    pub fn cursor(&self) -> &CursorHandle {
        &self.cursor
    }

    /// Record the token returned with the latest page.
    pub fn advance(&self, token: CursorToken) -> Result<bool> {
        self.tracker.record_token(&self.cursor, token)
    }

    /// Close the cursor. Returns whether it was still open.
    pub async fn close(mut self) -> Result<bool> {
        self.armed = false;
        self.tracker.close_cursor(&self.cursor).await
    }
}

impl<B: SearchBackend> Drop for CursorGuard<B> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let cursor = self.cursor.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let tracker = Arc::clone(&self.tracker);
                runtime.spawn(async move {
                    if let Err(e) = tracker.close_cursor(&cursor).await {
                        warn!(rule = %cursor.rule(), error = %e, "deferred cursor close failed");
                    }
                });
            }
            Err(_) => {
                warn!(
                    rule = %cursor.rule(),
                    "cursor guard dropped outside a runtime, leaving cursor to backend expiry"
                );
            }
        }
    }
}
