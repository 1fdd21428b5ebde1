//! Paginated query driver used by the evaluation loop.
//!
//! Runs one rule's query to completion: fetch the rule's connection, open a
//! cursor, pull pages, drop hits the rule already processed, and hand the rest
//! to the caller. The cursor is closed on every way out of [`PaginatedQuery::run`].

use std::sync::Arc;

use tracing::{debug, warn};

use alertwatch_core::{Result, RuleKey};

use crate::backend::{CursorToken, Hit, SearchBackend};
use crate::clients::ClientPool;
use crate::cursors::{CursorGuard, CursorTracker};
use crate::hits::ProcessedHitLedger;

/// Returned by the page sink to continue or stop paginating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFlow {
    Continue,
    Stop,
}

/// Summary of one paginated query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutcome {
    /// Pages fetched from the backend.
    pub pages: u32,
    /// Hits passed to the sink.
    pub hits: usize,
    /// Hits dropped because the rule had already processed them.
    pub duplicates: usize,
    /// The backend reported no further pages.
    pub exhausted: bool,
}

pub struct PaginatedQuery<B: SearchBackend> {
    clients: Arc<ClientPool<B>>,
    cursors: Arc<CursorTracker<B>>,
    hits: Arc<ProcessedHitLedger>,
    max_pages: Option<u32>,
}

impl<B: SearchBackend> PaginatedQuery<B> {
    pub fn new(
        clients: Arc<ClientPool<B>>,
        cursors: Arc<CursorTracker<B>>,
        hits: Arc<ProcessedHitLedger>,
        max_pages: Option<u32>,
    ) -> Self {
        Self {
            clients,
            cursors,
            hits,
            max_pages,
        }
    }

    /// Run the rule's query, feeding de-duplicated hits to `sink` page by page.
    ///
    /// Stops when the backend is exhausted, `max_pages` pages were fetched, or
    /// the sink returns [`PageFlow::Stop`]. Backend query errors are returned
    /// after the cursor has been closed.
    pub async fn run<F>(
        &self,
        rule: &RuleKey,
        params: &B::Params,
        mut sink: F,
    ) -> Result<QueryOutcome>
    where
        F: FnMut(Vec<Hit>) -> PageFlow + Send,
    {
        let connection = self.clients.get(rule, params).await?;
        let guard =
            CursorGuard::acquire(Arc::clone(&self.cursors), rule, connection.clone()).await?;

        let result = self.paginate(rule, &connection, &guard, &mut sink).await;

        if let Err(e) = guard.close().await {
            warn!(rule = %rule, error = %e, "failed to close cursor after query");
        }
        result
    }

    async fn paginate<F>(
        &self,
        rule: &RuleKey,
        connection: &B::Handle,
        guard: &CursorGuard<B>,
        sink: &mut F,
    ) -> Result<QueryOutcome>
    where
        F: FnMut(Vec<Hit>) -> PageFlow + Send,
    {
        let backend = self.clients.backend();
        let mut outcome = QueryOutcome::default();
        let mut cursor: Option<CursorToken> = None;

        loop {
            let page = backend.query_page(connection, cursor.as_ref()).await?;
            outcome.pages += 1;

            if let Some(token) = &page.next_cursor {
                if !guard.advance(token.clone())? {
                    // Our cursor was closed under us (rule removed); the token
                    // is not tracked, so release it here.
                    warn!(rule = %rule, "cursor closed during pagination, abandoning query");
                    if let Err(e) = backend.release_cursor(connection, token).await {
                        if !e.is_not_found() {
                            warn!(rule = %rule, error = %e, "failed to release abandoned cursor");
                        }
                    }
                    return Ok(outcome);
                }
            }

            let received = page.hits.len();
            let fresh = self.hits.remove_duplicates(rule, page.hits)?;
            outcome.duplicates += received - fresh.len();
            outcome.hits += fresh.len();

            let flow = if fresh.is_empty() {
                PageFlow::Continue
            } else {
                sink(fresh)
            };

            match page.next_cursor {
                Some(next) if received > 0 => cursor = Some(next),
                _ => {
                    outcome.exhausted = true;
                    break;
                }
            }
            if flow == PageFlow::Stop {
                debug!(rule = %rule, pages = outcome.pages, "sink stopped pagination");
                break;
            }
            if self.max_pages.is_some_and(|max| outcome.pages >= max) {
                debug!(rule = %rule, pages = outcome.pages, "reached page limit");
                break;
            }
        }

        Ok(outcome)
    }
}
