//! Crate-wide error taxonomy.
//!
//! Mirrors the kinds in the design doc's error table: each variant maps to a
//! propagation policy (surface vs. internal-retry) and a stable `code()` for
//! CLI/JSON output, the way `transfer::error::TransferError` maps to HTTP
//! status codes.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("could not acquire lock on {0}")]
    LockAcquisition(String),

    #[error("optimistic lock conflict on {0}")]
    OptimisticLock(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient blocks: requested {requested}, available {available}")]
    InsufficientBlocks { requested: i64, available: i64 },

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("expired: {0}")]
    Expired(String),

    #[error("already settled: {0}")]
    AlreadySettled(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code for CLI/JSON responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::Validation(_) => "VALIDATION",
            Error::LockAcquisition(_) => "LOCK_ACQUISITION",
            Error::OptimisticLock(_) => "OPTIMISTIC_LOCK",
            Error::Conflict(_) => "CONFLICT",
            Error::InsufficientBlocks { .. } => "INSUFFICIENT_BLOCKS",
            Error::InsufficientBalance => "INSUFFICIENT_BALANCE",
            Error::Expired(_) => "EXPIRED",
            Error::AlreadySettled(_) => "ALREADY_SETTLED",
            Error::Transport(_) => "TRANSPORT",
            Error::Internal(_) => "INTERNAL",
        }
    }

    /// Whether a caller may safely retry the same request (same message_id).
    pub fn retryable(&self) -> bool {
        matches!(self, Error::LockAcquisition(_) | Error::Transport(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Error::NotFound("row not found".to_string()),
            other => Error::Internal(format!("db error: {other}")),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::InsufficientBalance.code(), "INSUFFICIENT_BALANCE");
        assert_eq!(
            Error::InsufficientBlocks {
                requested: 5,
                available: 2
            }
            .code(),
            "INSUFFICIENT_BLOCKS"
        );
    }

    #[test]
    fn retryable_kinds() {
        assert!(Error::Transport("timeout".into()).retryable());
        assert!(Error::LockAcquisition("lock:offer:1".into()).retryable());
        assert!(!Error::Validation("bad".into()).retryable());
    }
}
