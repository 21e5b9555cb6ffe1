use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, instrument};

use crate::clock::{shift, Clock, SystemClock};
use crate::document::LockDocument;
use crate::error::{MutexError, StoreError};
use crate::logger::{LockLogger, TracingLogger};
use crate::operations::LockOperations;
use crate::options::MutexOptions;

/// A lease-based mutex over one lock document.
///
/// The handle keeps no local notion of ownership: every call goes to the
/// store. Two handles with the same `lock_id` and different `locker_id`s
/// exclude each other for as long as the lease is live; once a lease is
/// older than `lock_retention_timeout`, anyone may take it over.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use lease_mutex_core::{DistributedMutex, InMemoryLockStore, MutexError};
/// # async fn run() -> Result<(), MutexError> {
/// let store = Arc::new(InMemoryLockStore::new());
/// let mutex = DistributedMutex::builder(store, "nightly-report", "worker-1").build()?;
///
/// let rows = mutex
///     .synchronize(|| async { Ok::<_, MutexError>(42) })
///     .await?;
/// # let _ = rows;
/// # Ok(())
/// # }
/// ```
pub struct DistributedMutex {
    lock_id: String,
    locker_id: String,
    lock_check_period: Duration,
    lock_retention_timeout: Duration,
    clock: Arc<dyn Clock>,
    logger: Option<Arc<dyn LockLogger>>,
    lock_operations: Arc<dyn LockOperations>,
}

impl DistributedMutex {
    /// Start building a handle for `lock_id` owned by `locker_id`.
    pub fn builder(
        lock_operations: Arc<dyn LockOperations>,
        lock_id: impl Into<String>,
        locker_id: impl Into<String>,
    ) -> DistributedMutexBuilder {
        DistributedMutexBuilder {
            lock_operations,
            lock_id: lock_id.into(),
            locker_id: locker_id.into(),
            options: MutexOptions::default(),
            clock: Arc::new(SystemClock),
            logger: Some(Arc::new(TracingLogger)),
        }
    }

    /// Build a handle with the system clock and the tracing logger.
    pub fn new(
        lock_operations: Arc<dyn LockOperations>,
        lock_id: impl Into<String>,
        locker_id: impl Into<String>,
        options: MutexOptions,
    ) -> Result<Self, MutexError> {
        Self::builder(lock_operations, lock_id, locker_id)
            .options(options)
            .build()
    }

    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    pub fn locker_id(&self) -> &str {
        &self.locker_id
    }

    pub fn lock_check_period(&self) -> Duration {
        self.lock_check_period
    }

    pub fn lock_retention_timeout(&self) -> Duration {
        self.lock_retention_timeout
    }

    /// Make one attempt to take the lock.
    ///
    /// Returns `Ok(true)` when this locker now holds the lease, including when
    /// it already held it (the lease is then renewed from now). Returns
    /// `Ok(false)` when a live lease belongs to someone else.
    #[instrument(skip(self), level = "debug", fields(lock_id = %self.lock_id, locker_id = %self.locker_id))]
    pub async fn try_lock(&self) -> Result<bool, MutexError> {
        let now = self.clock.now();
        let previous = match self
            .lock_operations
            .try_lock(&self.lock_id, &self.locker_id, now, self.lock_retention_timeout)
            .await
        {
            Ok(previous) => previous,
            Err(StoreError::DuplicateKey(msg)) => {
                debug!("Lock {} is taken: {}", self.lock_id, msg);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(previous) = previous {
            self.check_previous_holder(&previous, now)?;
        }

        debug!("Acquired lock {} for {}", self.lock_id, self.locker_id);
        Ok(true)
    }

    fn check_previous_holder(
        &self,
        previous: &LockDocument,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), MutexError> {
        let Some(holder) = previous.locked_by.as_deref() else {
            return Ok(());
        };

        if previous.is_expired(now, self.lock_retention_timeout) {
            let since = previous
                .locked_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "an unknown time".to_string());
            if let Some(logger) = &self.logger {
                logger.warn(&format!(
                    "Ignoring old {} lock by {} since {} was too long ago",
                    self.lock_id, holder, since
                ));
            }
            return Ok(());
        }

        if holder == self.locker_id {
            debug!("Lock {} re-entered by {}", self.lock_id, holder);
        } else if let Some(locked_at) = previous.locked_at {
            return Err(MutexError::AlreadyLocked {
                holder: holder.to_string(),
                locked_at,
            });
        }
        Ok(())
    }

    /// Take the lock, polling every `lock_check_period` until it succeeds.
    ///
    /// There is no upper bound on the wait. Use
    /// [`lock_with_timeout`](Self::lock_with_timeout) for a bounded one.
    pub async fn lock(&self) -> Result<&Self, MutexError> {
        self.acquire(None).await?;
        Ok(self)
    }

    /// Like [`lock`](Self::lock), but gives up with [`MutexError::Timeout`]
    /// once `timeout` has passed on the mutex's clock.
    pub async fn lock_with_timeout(&self, timeout: Duration) -> Result<&Self, MutexError> {
        self.acquire(Some(timeout)).await?;
        Ok(self)
    }

    async fn acquire(&self, timeout: Option<Duration>) -> Result<(), MutexError> {
        let started = self.clock.now();
        let deadline = timeout.map(|timeout| shift(started, timeout));

        loop {
            if self.try_lock().await? {
                return Ok(());
            }

            let period = match deadline {
                None => self.lock_check_period,
                Some(deadline) => {
                    let now = self.clock.now();
                    let remaining = (deadline - now).to_std().unwrap_or(Duration::ZERO);
                    if remaining.is_zero() {
                        return Err(MutexError::Timeout {
                            lock_id: self.lock_id.clone(),
                            waited: (now - started).to_std().unwrap_or(Duration::ZERO),
                        });
                    }
                    remaining.min(self.lock_check_period)
                }
            };

            debug!(
                "Lock {} busy, {} retrying in {:?}",
                self.lock_id, self.locker_id, period
            );
            self.clock.sleep(period).await;
        }
    }

    /// Whether anyone currently holds a live lease. Never writes.
    pub async fn is_locked(&self) -> Result<bool, MutexError> {
        let now = self.clock.now();
        Ok(self
            .lock_info()
            .await?
            .is_some_and(|doc| doc.is_held(now, self.lock_retention_timeout)))
    }

    /// The stored lock document, if the lock was ever taken.
    pub async fn lock_info(&self) -> Result<Option<LockDocument>, MutexError> {
        Ok(self.lock_operations.lock_info(&self.lock_id).await?)
    }

    /// Release the lease held by this locker.
    ///
    /// Fails with [`MutexError::NotLocked`] when this locker holds no live
    /// lease: never taken, already released, or expired.
    #[instrument(skip(self), level = "debug", fields(lock_id = %self.lock_id, locker_id = %self.locker_id))]
    pub async fn unlock(&self) -> Result<&Self, MutexError> {
        let now = self.clock.now();
        let released = self
            .lock_operations
            .unlock(&self.lock_id, &self.locker_id, now, self.lock_retention_timeout)
            .await?;

        if released.is_none() {
            return Err(MutexError::NotLocked {
                lock_id: self.lock_id.clone(),
                locker_id: self.locker_id.clone(),
            });
        }

        debug!("Released lock {} by {}", self.lock_id, self.locker_id);
        Ok(self)
    }

    /// Run `work` while holding the lock.
    ///
    /// The lock is released after `work` returns, fails, or panics. A failed
    /// release takes precedence over the outcome of `work`. If the lock can't
    /// be taken, `work` never runs.
    pub async fn synchronize<F, Fut, T, E>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<MutexError>,
    {
        self.lock().await?;
        self.run_and_release(work).await
    }

    /// [`synchronize`](Self::synchronize) with a bounded wait for the lock.
    pub async fn synchronize_with_timeout<F, Fut, T, E>(
        &self,
        timeout: Duration,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<MutexError>,
    {
        self.lock_with_timeout(timeout).await?;
        self.run_and_release(work).await
    }

    async fn run_and_release<F, Fut, T, E>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<MutexError>,
    {
        let outcome = AssertUnwindSafe(async move { work().await })
            .catch_unwind()
            .await;

        self.unlock().await?;

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl fmt::Debug for DistributedMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedMutex")
            .field("lock_id", &self.lock_id)
            .field("locker_id", &self.locker_id)
            .field("lock_check_period", &self.lock_check_period)
            .field("lock_retention_timeout", &self.lock_retention_timeout)
            .field("backend", &self.lock_operations.backend_name())
            .finish()
    }
}

/// Builder for [`DistributedMutex`].
pub struct DistributedMutexBuilder {
    lock_operations: Arc<dyn LockOperations>,
    lock_id: String,
    locker_id: String,
    options: MutexOptions,
    clock: Arc<dyn Clock>,
    logger: Option<Arc<dyn LockLogger>>,
}

impl DistributedMutexBuilder {
    pub fn options(mut self, options: MutexOptions) -> Self {
        self.options = options;
        self
    }

    pub fn lock_check_period(mut self, period: Duration) -> Self {
        self.options.lock_check_period = period;
        self
    }

    pub fn lock_retention_timeout(mut self, timeout: Duration) -> Self {
        self.options.lock_retention_timeout = timeout;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn LockLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Drop override warnings instead of logging them.
    pub fn without_logger(mut self) -> Self {
        self.logger = None;
        self
    }

    pub fn lock_operations(mut self, lock_operations: Arc<dyn LockOperations>) -> Self {
        self.lock_operations = lock_operations;
        self
    }

    pub fn build(self) -> Result<DistributedMutex, MutexError> {
        if self.lock_id.is_empty() {
            return Err(MutexError::InvalidConfig("lock id required".into()));
        }
        if self.locker_id.is_empty() {
            return Err(MutexError::InvalidConfig("locker id required".into()));
        }
        if self.options.lock_check_period.is_zero() {
            return Err(MutexError::InvalidConfig(
                "lock_check_period must be positive".into(),
            ));
        }
        if self.options.lock_retention_timeout.is_zero() {
            return Err(MutexError::InvalidConfig(
                "lock_retention_timeout must be positive".into(),
            ));
        }

        Ok(DistributedMutex {
            lock_id: self.lock_id,
            locker_id: self.locker_id,
            lock_check_period: self.options.lock_check_period,
            lock_retention_timeout: self.options.lock_retention_timeout,
            clock: self.clock,
            logger: self.logger,
            lock_operations: self.lock_operations,
        })
    }
}
