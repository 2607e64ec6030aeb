//! Periodic cleanup of expired section locks.
//!
//! Expiry is already enforced lazily whenever locks are read; this job only
//! keeps the `section_locks` table from accumulating abandoned rows. Runs on
//! a fixed interval using `tokio::time::interval`.

use std::time::Duration;

use chrono::Utc;
use quire_core::config::WikiConfig;
use quire_core::error::CoreError;
use quire_core::lock::expiry_cutoff;
use quire_core::store::LockStore;
use quire_core::types::Timestamp;
use tokio_util::sync::CancellationToken;

/// Default sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Sweep interval from `LOCK_SWEEP_INTERVAL_SECS`, falling back to the
/// default when unset, unparseable or zero.
pub fn interval_from_env() -> Duration {
    let secs = std::env::var("LOCK_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&secs| secs > 0)
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
    Duration::from_secs(secs)
}

/// Delete every lock that is expired at `now`, across all documents.
pub async fn sweep_once<S: LockStore>(
    store: &S,
    config: &WikiConfig,
    now: Timestamp,
) -> Result<u64, CoreError> {
    store
        .delete_expired_locks(None, expiry_cutoff(now, config.lock_timeout))
        .await
}

/// Run the lock sweep loop until `cancel` is triggered.
pub async fn run<S: LockStore>(
    store: &S,
    config: WikiConfig,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        lock_timeout_mins = config.lock_timeout.num_minutes(),
        interval_secs = interval.as_secs(),
        "Lock sweep job started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Lock sweep job stopping");
                break;
            }
            _ = ticker.tick() => {
                match sweep_once(store, &config, Utc::now()).await {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, "Lock sweep: removed expired locks");
                    }
                    Ok(_) => {
                        tracing::debug!("Lock sweep: nothing expired");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Lock sweep: cleanup failed");
                    }
                }
            }
        }
    }
}
