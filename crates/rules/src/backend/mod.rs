//! Search-backend client contract.
//!
//! The concrete client (Elasticsearch, OpenSearch, ...) lives outside this
//! crate. The rule-state stores only need to open and close connections, pull
//! result pages and release server-side cursors.

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use alertwatch_core::BackendError;

/// Opaque server-side pagination token (scroll id, point-in-time id, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CursorToken(pub String);

impl CursorToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CursorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Backend document id, used for de-duplication across overlapping windows.
    pub id: String,
    /// Event timestamp of the document.
    pub timestamp: DateTime<Utc>,
    /// Raw document body.
    #[serde(default)]
    pub source: serde_json::Value,
}

/// One page of results plus the token for the next page, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub hits: Vec<Hit>,
    pub next_cursor: Option<CursorToken>,
}

/// Per-connection search backend operations.
#[async_trait]
pub trait SearchBackend: Send + Sync + 'static {
    /// Connection parameters a rule is configured with.
    type Params: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;
    /// An open connection. Cloning must be cheap (shared client).
    type Handle: Clone + Send + Sync + 'static;

    /// Open a connection.
    async fn open(&self, params: &Self::Params) -> Result<Self::Handle, BackendError>;

    /// Close a connection.
    async fn close(&self, handle: Self::Handle) -> Result<(), BackendError>;

    /// Fetch the first page (`cursor == None`) or the page after `cursor`.
    async fn query_page(
        &self,
        handle: &Self::Handle,
        cursor: Option<&CursorToken>,
    ) -> Result<Page, BackendError>;

    /// Release a server-side cursor. May report [`BackendError::NotFound`]
    /// if the backend already expired it.
    async fn release_cursor(
        &self,
        handle: &Self::Handle,
        cursor: &CursorToken,
    ) -> Result<(), BackendError>;
}
