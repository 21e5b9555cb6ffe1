//! MongoDB binding for the lease-mutex protocol.
//!
//! Lock documents live in one collection, one document per lock id:
//! `{ _id, locked_by?, locked_at? }`.

mod document;
mod operations;

use std::sync::Arc;

use lease_mutex_core::{DistributedMutex, DistributedMutexBuilder};
use mongodb::Collection;

pub use document::MongoLockDocument;
pub use operations::{is_duplicate_key, MongoLockOperations, DUPLICATE_KEY_CODE};

/// Start building a mutex whose lock documents live in `collection`.
pub fn mongo_mutex(
    collection: Collection<MongoLockDocument>,
    lock_id: impl Into<String>,
    locker_id: impl Into<String>,
) -> DistributedMutexBuilder {
    DistributedMutex::builder(
        Arc::new(MongoLockOperations::new(collection)),
        lock_id,
        locker_id,
    )
}
