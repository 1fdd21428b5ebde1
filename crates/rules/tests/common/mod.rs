//! Scripted search backend shared by the integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use alertwatch_core::BackendError;
use alertwatch_rules::{CursorToken, Hit, Page, SearchBackend};

#[derive(Default)]
pub struct ScriptedBackend {
    opens: AtomicUsize,
    closes: AtomicUsize,
    next_handle: AtomicU32,
    pages: Mutex<VecDeque<Page>>,
    released: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, ids: &[&str], next: Option<&str>) {
        self.pages.lock().unwrap().push_back(Page {
            hits: ids.iter().map(|id| hit(id)).collect(),
            next_cursor: next.map(CursorToken::new),
        });
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn hit(id: &str) -> Hit {
    Hit {
        id: id.to_string(),
        timestamp: base_time(),
        source: serde_json::json!({ "message": format!("event {id}") }),
    }
}

#[async_trait]
impl SearchBackend for ScriptedBackend {
    type Params = String;
    type Handle = u32;

    async fn open(&self, _index: &String) -> Result<u32, BackendError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn close(&self, _handle: u32) -> Result<(), BackendError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query_page(
        &self,
        _handle: &u32,
        _cursor: Option<&CursorToken>,
    ) -> Result<Page, BackendError> {
        Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn release_cursor(
        &self,
        _handle: &u32,
        cursor: &CursorToken,
    ) -> Result<(), BackendError> {
        let mut released = self.released.lock().unwrap();
        if released.iter().any(|t| t == cursor.as_str()) {
            return Err(BackendError::NotFound(cursor.to_string()));
        }
        released.push(cursor.to_string());
        Ok(())
    }
}
