use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by a lock store binding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A concurrent writer already owns the document key. This is how a
    /// conditional upsert reports lost contention.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether this error is the uniqueness-conflict signal.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey(_))
    }
}

/// Errors surfaced by [`DistributedMutex`](crate::DistributedMutex).
#[derive(Error, Debug)]
pub enum MutexError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The release condition matched nothing.
    #[error("lock {lock_id} is either not locked or locked by someone else (locker {locker_id})")]
    NotLocked { lock_id: String, locker_id: String },

    /// The store handed back a live lease owned by another locker.
    #[error("mutex already locked by {holder} at {locked_at}")]
    AlreadyLocked {
        holder: String,
        locked_at: DateTime<Utc>,
    },

    #[error("timed out after {waited:?} waiting for lock {lock_id}")]
    Timeout { lock_id: String, waited: Duration },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MutexError {
    /// Whether the caller may simply try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MutexError::Timeout { .. })
    }
}
