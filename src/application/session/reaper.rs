//! InactivityReaper - ends conversations nobody is talking in.
//!
//! Every interval, connections with a conversation whose last application
//! frame is older than the idle threshold get a `timeout` transition. Each
//! candidate is handled in its own task so one slow summary does not delay
//! the rest of the sweep. The state machine re-checks phase and idleness
//! under the transition lock, so a late `end` or an overlapping sweep turns
//! the timeout into a no-op.
//!
//! A second pass closes conversations that are still open in storage but no
//! live connection is in, such as those left by a dropped socket, once
//! nothing has been written to them for the same threshold.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};

use crate::domain::foundation::Timestamp;

use super::registry::ConnectionRegistry;
use super::state_machine::ConversationStateMachine;

/// Most abandoned conversations closed per pass.
const ABANDONED_BATCH: u32 = 100;

/// Periodic idle sweep over the registry.
pub struct InactivityReaper {
    registry: Arc<ConnectionRegistry>,
    state_machine: Arc<ConversationStateMachine>,
    interval: Duration,
    idle_threshold: Duration,
}

impl InactivityReaper {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        state_machine: Arc<ConversationStateMachine>,
        interval: Duration,
        idle_threshold: Duration,
    ) -> Self {
        Self {
            registry,
            state_machine,
            interval,
            idle_threshold,
        }
    }

    /// Runs sweeps until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("Inactivity reaper stopping");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                    self.sweep_abandoned().await;
                }
            }
        }
    }

    /// One idle sweep. Returns the number of conversations ended.
    pub async fn sweep(&self) -> usize {
        let mut tasks = JoinSet::new();

        for conn in self.registry.snapshot().await {
            if conn.conversation_id().await.is_none() {
                continue;
            }
            if conn.idle_for().await <= self.idle_threshold {
                continue;
            }

            let state_machine = self.state_machine.clone();
            let threshold = self.idle_threshold;
            tasks.spawn(async move {
                match state_machine.timeout(&conn, threshold).await {
                    Ok(ended) => ended,
                    Err(error) => {
                        tracing::warn!(
                            connection_id = %conn.id(),
                            user_id = %conn.user_id(),
                            kind = error.kind(),
                            error = %error,
                            "Failed to end inactive conversation"
                        );
                        false
                    }
                }
            });
        }

        let mut ended = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(true) => ended += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(error = %e, "Reaper task panicked"),
            }
        }

        if ended > 0 {
            tracing::info!(ended, "Ended inactive conversations");
        }
        ended
    }

    /// Closes open conversations no live connection is in and nobody has
    /// written to within the idle threshold. Returns the number closed.
    pub async fn sweep_abandoned(&self) -> usize {
        let cutoff = Timestamp::now().minus(self.idle_threshold);
        let candidates = match self
            .state_machine
            .idle_open_conversations(cutoff, ABANDONED_BATCH)
            .await
        {
            Ok(candidates) => candidates,
            Err(error) => {
                tracing::warn!(error = %error, "Failed to list abandoned conversations");
                return 0;
            }
        };
        if candidates.is_empty() {
            return 0;
        }

        let mut bound = HashSet::new();
        for conn in self.registry.snapshot().await {
            if let Some(id) = conn.conversation_id().await {
                bound.insert(id);
            }
        }

        let mut closed = 0;
        for conversation in candidates.iter().filter(|c| !bound.contains(&c.id())) {
            match self.state_machine.close_abandoned(&conversation.id()).await {
                Ok(true) => {
                    closed += 1;
                    tracing::debug!(
                        user_id = %conversation.user_id(),
                        conversation_id = %conversation.id(),
                        "Closed abandoned conversation"
                    );
                }
                Ok(false) => {}
                Err(error) => tracing::warn!(
                    conversation_id = %conversation.id(),
                    error = %error,
                    "Failed to close abandoned conversation"
                ),
            }
        }

        if closed > 0 {
            tracing::info!(closed, "Closed abandoned conversations");
        }
        closed
    }
}
