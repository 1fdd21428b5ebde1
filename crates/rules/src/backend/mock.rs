//! In-memory backend that records every call, for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use alertwatch_core::BackendError;

use super::{CursorToken, Hit, Page, SearchBackend};

#[derive(Default)]
pub(crate) struct MockBackend {
    opens: AtomicUsize,
    closes: AtomicUsize,
    releases: AtomicUsize,
    queries: AtomicUsize,
    next_handle: AtomicU64,
    open_delay: Option<Duration>,
    fail_open: AtomicBool,
    fail_close: AtomicBool,
    release_error: Mutex<Option<BackendError>>,
    pages: Mutex<VecDeque<Result<Page, BackendError>>>,
    released: Mutex<Vec<CursorToken>>,
    closed: Mutex<Vec<u64>>,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_open_delay(delay: Duration) -> Self {
        Self {
            open_delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn fail_opens(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_closes(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_releases_with(&self, error: BackendError) {
        *self.release_error.lock().unwrap() = Some(error);
    }

    pub(crate) fn push_page(&self, ids: &[&str], next: Option<&str>) {
        let page = Page {
            hits: ids.iter().map(|id| hit(id)).collect(),
            next_cursor: next.map(CursorToken::new),
        };
        self.pages.lock().unwrap().push_back(Ok(page));
    }

    pub(crate) fn push_error(&self, error: BackendError) {
        self.pages.lock().unwrap().push_back(Err(error));
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub(crate) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub(crate) fn released_tokens(&self) -> Vec<CursorToken> {
        self.released.lock().unwrap().clone()
    }

    pub(crate) fn closed_handles(&self) -> Vec<u64> {
        self.closed.lock().unwrap().clone()
    }
}

pub(crate) fn hit_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub(crate) fn hit(id: &str) -> Hit {
    Hit {
        id: id.to_string(),
        timestamp: hit_time(),
        source: serde_json::json!({ "id": id }),
    }
}

#[async_trait]
impl SearchBackend for MockBackend {
    type Params = String;
    type Handle = u64;

    async fn open(&self, _params: &String) -> Result<u64, BackendError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(BackendError::Connection("connection refused".to_string()));
        }
        Ok(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn close(&self, handle: u64) -> Result<(), BackendError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.lock().unwrap().push(handle);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(BackendError::Connection("connection reset".to_string()));
        }
        Ok(())
    }

    async fn query_page(
        &self,
        _handle: &u64,
        _cursor: Option<&CursorToken>,
    ) -> Result<Page, BackendError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::default()))
    }

    async fn release_cursor(
        &self,
        _handle: &u64,
        cursor: &CursorToken,
    ) -> Result<(), BackendError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.released.lock().unwrap().push(cursor.clone());
        match self.release_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
