use std::time::Duration;

use clap::{Parser, Subcommand};
use lease_mutex_core::MutexOptions;

/// Configuration for the lease-mutex-mongo CLI.
#[derive(Parser, Debug, Clone)]
#[command(name = "lease-mutex-mongo")]
#[command(about = "Run commands under a MongoDB-backed lease mutex")]
pub struct Config {
    /// MongoDB connection string
    #[arg(long, default_value = "mongodb://localhost:27017", env = "MONGO_URI")]
    pub mongo_uri: String,

    /// Database holding the lock collection
    #[arg(long, default_value = "lease_mutex", env = "MONGO_DATABASE")]
    pub database: String,

    /// Collection of lock documents
    #[arg(long, default_value = "locks", env = "MONGO_COLLECTION")]
    pub collection: String,

    /// Name of the lock
    #[arg(long, env = "LOCK_ID")]
    pub lock_id: String,

    /// Identity of this locker. Defaults to a random UUID.
    #[arg(long, env = "LOCKER_ID")]
    pub locker_id: Option<String>,

    /// Seconds between acquisition attempts
    #[arg(long, default_value = "5", env = "LOCK_CHECK_PERIOD")]
    pub lock_check_period_secs: u64,

    /// Lease length in seconds
    #[arg(long, default_value = "600", env = "LOCK_RETENTION_TIMEOUT")]
    pub lock_retention_timeout_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a program while holding the lock
    Run {
        /// Give up after this many seconds of waiting for the lock
        #[arg(long)]
        timeout: Option<u64>,

        /// Program and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        program: Vec<String>,
    },
    /// Print the lock document and whether it is held
    Status,
    /// Release the lock held by --locker-id
    Unlock,
}

impl Config {
    pub fn mutex_options(&self) -> MutexOptions {
        MutexOptions {
            lock_check_period: Duration::from_secs(self.lock_check_period_secs),
            lock_retention_timeout: Duration::from_secs(self.lock_retention_timeout_secs),
        }
    }

    /// Get the effective locker id.
    pub fn effective_locker_id(&self) -> String {
        self.locker_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}
