use std::fmt;

/// Structured classification of a storage failure.
///
/// The retry layer decides what to do from the kind alone; message text is
/// only for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Connect/timeout/transport failure.
    Network,
    /// Credentials rejected (401/403).
    Auth,
    /// The server's cached view of the schema is out of date. Recreating the
    /// client is required before a retry can succeed.
    StaleSchema,
    /// 5xx or similar transient server-side failure.
    Unavailable,
    /// The request itself was refused (bad column, constraint, etc.).
    Rejected,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreErrorKind::Network => "network",
            StoreErrorKind::Auth => "auth",
            StoreErrorKind::StaleSchema => "stale schema cache",
            StoreErrorKind::Unavailable => "unavailable",
            StoreErrorKind::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("store error ({kind}): {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_stale_schema(&self) -> bool {
        self.kind == StoreErrorKind::StaleSchema
    }
}

impl From<duckdb::Error> for StoreError {
    fn from(e: duckdb::Error) -> Self {
        StoreError::new(StoreErrorKind::Rejected, e.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() || e.is_connect() || e.is_request() {
            StoreErrorKind::Network
        } else if e.is_decode() {
            StoreErrorKind::Rejected
        } else {
            StoreErrorKind::Unavailable
        };
        StoreError::new(kind, e.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid identifier: '{0}' (expected 32 or 36 characters)")]
    InvalidIdentifier(String),

    #[error("Invalid price: '{0}'")]
    InvalidPrice(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
