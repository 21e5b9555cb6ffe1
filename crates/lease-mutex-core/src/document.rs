use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The persisted state of one named lock.
///
/// `locked_by` and `locked_at` are always written and cleared together. A
/// document with both fields absent is a released lock slot; documents are
/// never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDocument {
    /// Lock id, the document's primary key.
    pub id: String,
    /// Current holder, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
    /// When the current holder acquired the lease.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
}

impl LockDocument {
    /// A document held by `locker_id` since `now`.
    pub fn held(lock_id: impl Into<String>, locker_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: lock_id.into(),
            locked_by: Some(locker_id.into()),
            locked_at: Some(now),
        }
    }

    /// A released document.
    pub fn released(lock_id: impl Into<String>) -> Self {
        Self {
            id: lock_id.into(),
            locked_by: None,
            locked_at: None,
        }
    }

    /// Whether the recorded lease is past its retention window at `now`.
    ///
    /// A missing `locked_at` counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        lease_expired(self.locked_at, now, retention)
    }

    /// Whether a holder is recorded and its lease is still live.
    pub fn is_held(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.locked_by.is_some() && !self.is_expired(now, retention)
    }

    /// Whether `locker_id` holds a live lease on this document.
    pub fn is_held_by(&self, locker_id: &str, now: DateTime<Utc>, retention: Duration) -> bool {
        self.locked_by.as_deref() == Some(locker_id) && !self.is_expired(now, retention)
    }
}

/// Oldest `locked_at` that still counts as a live lease at `now`.
pub fn expiry_cutoff(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    match chrono::Duration::from_std(retention) {
        Ok(retention) => now
            .checked_sub_signed(retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
        Err(_) => DateTime::<Utc>::MIN_UTC,
    }
}

/// A lease is expired once `locked_at` is strictly older than the cutoff.
pub fn lease_expired(locked_at: Option<DateTime<Utc>>, now: DateTime<Utc>, retention: Duration) -> bool {
    match locked_at {
        Some(locked_at) => locked_at < expiry_cutoff(now, retention),
        None => true,
    }
}
