//! The shared error taxonomy (`spec.md` §7) used by every component.
//!
//! Every fallible public operation across `frank-cloud`, `frank-registry`,
//! `frank-launch`, `frank-routing`, `frank-scrum`, and `frank-creds` returns
//! `Result<T, CoreError>`. Keeping one enum (rather than one per crate) lets
//! a kind cross a component boundary without translation -- e.g.
//! `PriorityInUse` surfaces from `frank-cloud` through `frank-routing` to
//! `frank-launch` unchanged.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("capacity exhausted: {reason}")]
    CapacityExhausted { reason: String },

    #[error("listener rule priority in use: {0}")]
    PriorityInUse(i32),

    #[error("authorization denied: {0}")]
    AuthzDenied(String),

    #[error("task stopped before reaching running state: {reason}")]
    TaskStoppedEarly { reason: String },

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

impl CoreError {
    /// `true` for kinds the spec allows upper layers to retry once at
    /// coarse granularity (the next poll), never inside the adapter itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Transient(format!("io: {e}"))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::InvalidArgument(format!("json: {e}"))
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(e: toml::de::Error) -> Self {
        CoreError::InvalidArgument(format!("toml parse: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
