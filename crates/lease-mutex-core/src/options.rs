use std::time::Duration;

use serde::Deserialize;

/// Default sleep between acquisition attempts in [`lock`](crate::DistributedMutex::lock).
pub const DEFAULT_LOCK_CHECK_PERIOD: Duration = Duration::from_secs(5);

/// Default lease length.
pub const DEFAULT_LOCK_RETENTION_TIMEOUT: Duration = Duration::from_secs(600);

/// Tunable timings of a mutex handle.
///
/// Deserialises from whole seconds and rejects unknown keys:
///
/// ```
/// # use lease_mutex_core::MutexOptions;
/// let options: MutexOptions = serde_json::from_str(r#"{ "lock_check_period": 1 }"#).unwrap();
/// assert_eq!(options.lock_check_period.as_secs(), 1);
/// assert_eq!(options.lock_retention_timeout.as_secs(), 600);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MutexOptions {
    #[serde(with = "seconds")]
    pub lock_check_period: Duration,
    #[serde(with = "seconds")]
    pub lock_retention_timeout: Duration,
}

impl Default for MutexOptions {
    fn default() -> Self {
        Self {
            lock_check_period: DEFAULT_LOCK_CHECK_PERIOD,
            lock_retention_timeout: DEFAULT_LOCK_RETENTION_TIMEOUT,
        }
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
