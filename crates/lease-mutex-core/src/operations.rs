use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::document::LockDocument;
use crate::error::StoreError;

/// Store delegate for the lock protocol.
///
/// Implementations must evaluate each conditional write atomically on the
/// store side, per document key. The protocol never reads and then writes.
#[async_trait]
pub trait LockOperations: Send + Sync {
    /// Returns the backend identifier (e.g., "memory", "mongodb").
    fn backend_name(&self) -> &'static str;

    /// Point read of the lock document by id.
    async fn lock_info(&self, lock_id: &str) -> Result<Option<LockDocument>, StoreError>;

    /// Conditional upsert that takes the lock.
    ///
    /// The write applies when the document is absent, released, already held
    /// by `locker_id`, or its lease is older than `now - retention`. It then
    /// stores `{lock_id, locker_id, now}` and returns the document as it was
    /// before the write (`None` for an insert).
    ///
    /// When the condition does not hold the call must fail with
    /// [`StoreError::DuplicateKey`].
    async fn try_lock(
        &self,
        lock_id: &str,
        locker_id: &str,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<Option<LockDocument>, StoreError>;

    /// Conditional clear that releases the lock.
    ///
    /// Clears `locked_by`/`locked_at` only if `locker_id` holds a lease no
    /// older than `now - retention`. Returns `None` when nothing matched.
    async fn unlock(
        &self,
        lock_id: &str,
        locker_id: &str,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<Option<LockDocument>, StoreError>;
}
