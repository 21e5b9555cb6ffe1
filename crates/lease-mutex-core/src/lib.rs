//! Lease-based distributed mutex over a shared document store.
//!
//! This crate holds the store-agnostic protocol:
//! - `DistributedMutex`: try-lock, blocking lock, unlock, inspection and scoped execution
//! - `LockOperations`: the store delegate (point read, conditional upsert, conditional clear)
//! - `Clock` / `LockLogger`: injectable time source and warning sink
//! - `InMemoryLockStore`: an in-process store with the same atomicity contract

mod clock;
mod document;
mod error;
mod logger;
mod memory;
mod mutex;
mod operations;
mod options;

pub use clock::{Clock, ManualClock, SystemClock};
pub use document::{expiry_cutoff, lease_expired, LockDocument};
pub use error::{MutexError, StoreError};
pub use logger::{LockLogger, RecordingLogger, TracingLogger};
pub use memory::InMemoryLockStore;
pub use mutex::{DistributedMutex, DistributedMutexBuilder};
pub use operations::LockOperations;
pub use options::{MutexOptions, DEFAULT_LOCK_CHECK_PERIOD, DEFAULT_LOCK_RETENTION_TIMEOUT};
