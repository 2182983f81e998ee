//! HeartbeatMonitor - liveness probing for registered connections.
//!
//! Every interval, each connection that has shown no traffic since the
//! previous ping is terminated without a close handshake; the others are
//! pinged and their alive flag cleared. A healthy peer answers the ping
//! with a pong, which sets the flag again before the next sweep.
//!
//! Pongs only prove liveness. They never count as conversation activity,
//! so a silent but connected user still reaches the inactivity reaper.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use super::registry::ConnectionRegistry;

/// Periodic liveness sweep over the registry.
pub struct HeartbeatMonitor {
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(registry: Arc<ConnectionRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Runs sweeps until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("Heartbeat monitor stopping");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
    }

    /// One heartbeat round. Returns the number of connections terminated.
    pub async fn sweep(&self) -> usize {
        let mut terminated = 0;

        for conn in self.registry.snapshot().await {
            if conn.take_alive().await {
                conn.ping();
                continue;
            }

            tracing::info!(
                connection_id = %conn.id(),
                user_id = %conn.user_id(),
                "Terminating unresponsive connection"
            );
            conn.terminate().await;
            self.registry.remove(&conn).await;
            terminated += 1;
        }

        terminated
    }
}
