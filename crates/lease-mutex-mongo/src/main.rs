mod config;

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use lease_mutex_core::DistributedMutex;
use lease_mutex_mongo::MongoLockOperations;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{Command, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; stdout belongs to the child program
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    if matches!(config.command, Command::Unlock) && config.locker_id.is_none() {
        anyhow::bail!("unlock needs --locker-id (or LOCKER_ID)");
    }
    let locker_id = config.effective_locker_id();

    info!("Starting lease-mutex-mongo");
    info!("  Collection: {}.{}", config.database, config.collection);
    info!("  Lock: {} (locker {})", config.lock_id, locker_id);

    let operations =
        MongoLockOperations::connect(&config.mongo_uri, &config.database, &config.collection)
            .await?;
    let mutex = DistributedMutex::builder(Arc::new(operations), &config.lock_id, locker_id)
        .options(config.mutex_options())
        .build()?;

    match &config.command {
        Command::Run { timeout, program } => {
            let status = run_locked(&mutex, *timeout, program).await?;
            info!("Program exited with {}", status);
            std::process::exit(status.code().unwrap_or(1));
        }
        Command::Status => {
            let document = mutex.lock_info().await?;
            let locked = mutex.is_locked().await?;
            let report = serde_json::json!({
                "lock_id": mutex.lock_id(),
                "locked": locked,
                "document": document,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Unlock => {
            mutex.unlock().await?;
            info!("Released lock {}", mutex.lock_id());
        }
    }

    Ok(())
}

/// Run `program` as a child process while holding the lock.
async fn run_locked(
    mutex: &DistributedMutex,
    timeout: Option<u64>,
    program: &[String],
) -> anyhow::Result<ExitStatus> {
    let (cmd, args) = program.split_first().context("missing program")?;

    let work = || async {
        info!("Lock {} acquired, running {}", mutex.lock_id(), cmd);
        let status = tokio::process::Command::new(cmd)
            .args(args)
            .status()
            .await
            .with_context(|| format!("failed to run {}", cmd))?;
        Ok::<_, anyhow::Error>(status)
    };

    match timeout {
        Some(secs) => {
            mutex
                .synchronize_with_timeout(Duration::from_secs(secs), work)
                .await
        }
        None => mutex.synchronize(work).await,
    }
}
