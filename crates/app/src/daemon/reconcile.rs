//! Periodic reconciliation of the mount registry against live processes
//!
//! A tick enumerates the driver's active mounts and applies them to the
//! registry. Enumeration failures are logged and retried on the next tick;
//! they never stop the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::driver::DriverError;
use super::mount_manager::{MountRegistry, ReconcileReport};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum TickOutcome {
    Applied(ReconcileReport),
    /// Another tick was still in flight
    Skipped,
    /// Enumeration failed; the registry was left untouched
    Failed(DriverError),
}

pub struct Reconciler {
    registry: MountRegistry,
    interval: Duration,
    in_flight: Mutex<()>,
}

impl Reconciler {
    pub fn new(registry: MountRegistry, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            in_flight: Mutex::new(()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one reconciliation pass unless one is already running
    pub async fn tick(&self) -> TickOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!("reconcile tick still in flight, skipping");
            return TickOutcome::Skipped;
        };

        match self.registry.reconcile().await {
            Ok(report) => {
                for name in &report.removed {
                    tracing::info!(name = %name, "mount disappeared, removing record");
                }
                for name in &report.errored {
                    tracing::warn!(name = %name, "mount is served at an unexpected path");
                }
                tracing::debug!(confirmed = report.confirmed, "reconcile tick applied");
                TickOutcome::Applied(report)
            }
            Err(e) => {
                tracing::warn!("failed to enumerate mounts, retrying next tick: {}", e);
                TickOutcome::Failed(e)
            }
        }
    }

    /// Tick every interval until `shutdown` fires. The first tick happens one
    /// interval after the call.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                    _ = shutdown.changed() => {
                        tracing::debug!("reconciler shutting down");
                        break;
                    }
                }
            }
        })
    }
}
