use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, DateTime as BsonDateTime, Document};
use chrono::{DateTime, Utc};
use lease_mutex_core::{expiry_cutoff, LockDocument, LockOperations, StoreError};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection, Database};
use tracing::{debug, instrument};

use crate::document::MongoLockDocument;

/// Server error code for a unique index violation.
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB-backed lock store.
///
/// Acquisition is a single `findOneAndReplace` with upsert. When the filter
/// misses because someone else holds a live lease, the upsert collides with
/// the existing `_id` and the server answers with E11000, which is reported
/// as [`StoreError::DuplicateKey`].
#[derive(Debug, Clone)]
pub struct MongoLockOperations {
    collection: Collection<MongoLockDocument>,
}

impl MongoLockOperations {
    pub fn new(collection: Collection<MongoLockDocument>) -> Self {
        Self { collection }
    }

    pub fn from_database(database: &Database, collection: &str) -> Self {
        Self::new(database.collection(collection))
    }

    /// Connect to `uri` and bind to `database.collection`.
    pub async fn connect(uri: &str, database: &str, collection: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| map_mongo_error("connect", e))?;
        Ok(Self::from_database(&client.database(database), collection))
    }

    pub fn collection(&self) -> &Collection<MongoLockDocument> {
        &self.collection
    }

    /// Matches a document that is expired, already ours, or released.
    pub fn acquire_filter(lock_id: &str, locker_id: &str, cutoff: DateTime<Utc>) -> Document {
        doc! {
            "_id": lock_id,
            "$or": [
                { "locked_at": { "$lt": BsonDateTime::from_chrono(cutoff) } },
                { "locked_by": locker_id },
                { "locked_by": { "$exists": false } }
            ]
        }
    }

    /// Matches a document holding a live lease by `locker_id`.
    pub fn release_filter(lock_id: &str, locker_id: &str, cutoff: DateTime<Utc>) -> Document {
        doc! {
            "_id": lock_id,
            "locked_by": locker_id,
            "locked_at": { "$gte": BsonDateTime::from_chrono(cutoff) }
        }
    }

    pub fn release_update() -> Document {
        doc! { "$unset": { "locked_by": "", "locked_at": "" } }
    }
}

#[async_trait]
impl LockOperations for MongoLockOperations {
    fn backend_name(&self) -> &'static str {
        "mongodb"
    }

    #[instrument(skip(self), level = "debug")]
    async fn lock_info(&self, lock_id: &str) -> Result<Option<LockDocument>, StoreError> {
        let found = self
            .collection
            .find_one(doc! { "_id": lock_id })
            .await
            .map_err(|e| map_mongo_error("find lock", e))?;
        Ok(found.map(LockDocument::from))
    }

    #[instrument(skip(self), level = "debug")]
    async fn try_lock(
        &self,
        lock_id: &str,
        locker_id: &str,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<Option<LockDocument>, StoreError> {
        let filter = Self::acquire_filter(lock_id, locker_id, expiry_cutoff(now, retention));
        let replacement = MongoLockDocument::from(&LockDocument::held(lock_id, locker_id, now));

        let previous = self
            .collection
            .find_one_and_replace(filter, replacement)
            .upsert(true)
            .return_document(ReturnDocument::Before)
            .await
            .map_err(|e| map_mongo_error("acquire lock", e))?;

        debug!(
            "Lock {} written for {} (previous: {:?})",
            lock_id, locker_id, previous
        );
        Ok(previous.map(LockDocument::from))
    }

    #[instrument(skip(self), level = "debug")]
    async fn unlock(
        &self,
        lock_id: &str,
        locker_id: &str,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<Option<LockDocument>, StoreError> {
        let filter = Self::release_filter(lock_id, locker_id, expiry_cutoff(now, retention));

        let released = self
            .collection
            .find_one_and_update(filter, Self::release_update())
            .await
            .map_err(|e| map_mongo_error("release lock", e))?;

        if released.is_none() {
            debug!("Lock {} not held by {} (no match)", lock_id, locker_id);
        }
        Ok(released.map(LockDocument::from))
    }
}

/// Whether the driver error is a unique index violation.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY_CODE,
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

fn map_mongo_error(context: &str, err: MongoError) -> StoreError {
    if is_duplicate_key(&err) {
        return StoreError::DuplicateKey(format!("{}: {}", context, err));
    }

    match err.kind.as_ref() {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::DnsResolve { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => {
            StoreError::Connection(format!("{}: {}", context, err))
        }
        ErrorKind::BsonDeserialization(_) | ErrorKind::BsonSerialization(_) => {
            StoreError::Serialization(format!("{}: {}", context, err))
        }
        _ => StoreError::Query(format!("{}: {}", context, err)),
    }
}
