use thiserror::Error;

/// Errors reported by a search backend client.
///
/// `NotFound` is its own variant because callers releasing server-side
/// resources (cursors) treat it as success.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Whether the backend reported the resource as already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }
}

#[derive(Error, Debug)]
pub enum RuleStateError {
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),

    #[error("rule already active: {0}")]
    DuplicateRule(String),

    #[error("rule name reserved by a disabled rule: {0}")]
    RuleReserved(String),

    #[error("unknown rule: {0}")]
    UnknownRule(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for rule-state operations.
pub type Result<T> = std::result::Result<T, RuleStateError>;
