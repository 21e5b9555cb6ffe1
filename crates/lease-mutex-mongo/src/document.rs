use bson::DateTime as BsonDateTime;
use lease_mutex_core::LockDocument;
use serde::{Deserialize, Serialize};

/// Lock document as stored in the collection.
///
/// BSON datetimes carry millisecond precision, so `locked_at` read back from
/// the store is truncated to the millisecond.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MongoLockDocument {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<BsonDateTime>,
}

impl From<MongoLockDocument> for LockDocument {
    fn from(doc: MongoLockDocument) -> Self {
        Self {
            id: doc.id,
            locked_by: doc.locked_by,
            locked_at: doc.locked_at.map(|at| at.to_chrono()),
        }
    }
}

impl From<&LockDocument> for MongoLockDocument {
    fn from(doc: &LockDocument) -> Self {
        Self {
            id: doc.id.clone(),
            locked_by: doc.locked_by.clone(),
            locked_at: doc.locked_at.map(BsonDateTime::from_chrono),
        }
    }
}
