use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::document::{expiry_cutoff, LockDocument};
use crate::error::StoreError;
use crate::operations::LockOperations;

/// In-process lock store.
///
/// Every conditional write runs under a single map lock, which gives the
/// same per-key atomicity a document store provides. Useful for tests and
/// for coordinating tasks inside one process.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    documents: Mutex<HashMap<String, LockDocument>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a document directly, bypassing the protocol.
    pub fn insert(&self, document: LockDocument) -> Result<(), StoreError> {
        let mut documents = self.documents()?;
        documents.insert(document.id.clone(), document);
        Ok(())
    }

    fn documents(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, LockDocument>>, StoreError> {
        self.documents
            .lock()
            .map_err(|e| StoreError::Internal(format!("lock store poisoned: {}", e)))
    }
}

#[async_trait]
impl LockOperations for InMemoryLockStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn lock_info(&self, lock_id: &str) -> Result<Option<LockDocument>, StoreError> {
        Ok(self.documents()?.get(lock_id).cloned())
    }

    #[instrument(skip(self), level = "debug")]
    async fn try_lock(
        &self,
        lock_id: &str,
        locker_id: &str,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<Option<LockDocument>, StoreError> {
        let mut documents = self.documents()?;
        let previous = documents.get(lock_id).cloned();

        if let Some(existing) = &previous {
            // A holder without a lock time never matches the expiry clause,
            // the same as `$lt` against a missing field.
            let cutoff = expiry_cutoff(now, retention);
            let acquirable = existing.locked_by.is_none()
                || existing.locked_by.as_deref() == Some(locker_id)
                || existing.locked_at.is_some_and(|at| at < cutoff);
            if !acquirable {
                debug!(
                    "Lock {} held by {:?} (requested by {})",
                    lock_id, existing.locked_by, locker_id
                );
                return Err(StoreError::DuplicateKey(format!(
                    "duplicate key error: {{ _id: \"{}\" }}",
                    lock_id
                )));
            }
        }

        documents.insert(
            lock_id.to_string(),
            LockDocument::held(lock_id, locker_id, now),
        );
        Ok(previous)
    }

    #[instrument(skip(self), level = "debug")]
    async fn unlock(
        &self,
        lock_id: &str,
        locker_id: &str,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<Option<LockDocument>, StoreError> {
        let mut documents = self.documents()?;
        match documents.get_mut(lock_id) {
            Some(existing) if existing.is_held_by(locker_id, now, retention) => {
                let previous = existing.clone();
                existing.locked_by = None;
                existing.locked_at = None;
                Ok(Some(previous))
            }
            _ => {
                debug!("Lock {} not held by {} (no-op)", lock_id, locker_id);
                Ok(None)
            }
        }
    }
}
