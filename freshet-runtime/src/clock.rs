//! Wall-clock ticker.
//!
//! A host only knows the time it is told. In production the ticker feeds
//! `Utc::now()` into the host on a fixed period, which is what makes stale,
//! expiry and retry deadlines take effect (and, with auto-fetch, triggers the
//! refetch). Tests drive time through `set_time`/`advance` instead.

use crate::host::ResourceHandle;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Default tick period of the clock task.
pub const DEFAULT_CLOCK_PERIOD: Duration = Duration::from_secs(1);

/// Feed the current time into `handle` every `period` until shutdown.
///
/// Stops when `shutdown_rx` flips to `true`, when its sender is dropped, or
/// when the host is closed. Returns the number of ticks delivered.
pub async fn run_clock<T>(
    handle: ResourceHandle<T>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> u64
where
    T: Clone + Send + Sync + 'static,
{
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        resource = handle.name(),
        period_ms = period_millis(period),
        "Clock task started"
    );

    let mut ticks = 0u64;
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!(resource = handle.name(), "Clock task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                if let Err(e) = handle.set_time(Utc::now()).await {
                    tracing::info!(error = %e, "Clock task stopping, host is gone");
                    break;
                }
                ticks += 1;
            }
        }
    }

    tracing::info!(resource = handle.name(), ticks, "Clock task completed");
    ticks
}

/// Milliseconds for log fields, saturating at `u64::MAX`.
fn period_millis(period: Duration) -> u64 {
    u64::try_from(period.as_millis()).unwrap_or(u64::MAX)
}

/// Spawn [`run_clock`] on the current runtime.
pub fn spawn_clock<T>(
    handle: ResourceHandle<T>,
    period: Duration,
    shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<u64>
where
    T: Clone + Send + Sync + 'static,
{
    tokio::spawn(run_clock(handle, period, shutdown_rx))
}
