//! Lease-based leader election.
//!
//! ```text
//!            acquire ok            location published
//! Unelected ──────────▶ Acquiring ───────────────────▶ Leader
//!     ▲                     │ busy / error                │
//!     │                     ▼                             │ renewal failed
//!     └──────── retry delay ◀─────────────────────────────┘
//!
//!  any state ── outer cancel ──▶ Cancelled
//! ```
//!
//! While the lease is held two activities run side by side: the renewal loop
//! and the leader body. They share one child [`CancellationToken`]. The
//! renewal loop cancels it when a renewal fails, the leader body waits on it
//! and tears down when it fires. Outer cancellation reaches both through the
//! same token.

use crate::client::log::AppendLog;
use crate::core::error::{VaultError, VaultResult};
use crate::election::gate::WriteAuthorizationGate;
use crate::election::lease::{LeaseAcquire, LeaseProvider, LeaseRenewal, LeaseToken};
use crate::election::location::LocationRecord;
use crate::election::writer::{WriteScheduler, WRITE_QUEUE_DEPTH};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Bound on waiting for the write scheduler after leadership is lost.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(5000);

/// Election timing.
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    /// TTL requested from the lease provider in milliseconds.
    pub lease_ttl_ms: u64,
    /// How often the leader renews (must be below `lease_ttl_ms`).
    pub renew_interval_ms: u64,
    /// Pause between acquire attempts while not leader.
    pub retry_delay_ms: u64,
    /// Grace period for the write scheduler to drain on step-down.
    pub shutdown_grace_ms: u64,
    /// Capacity of the write scheduler's queue.
    pub write_queue_depth: usize,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            lease_ttl_ms: 15_000,
            renew_interval_ms: 5_000,
            retry_delay_ms: 1_000,
            shutdown_grace_ms: SHUTDOWN_GRACE.as_millis() as u64,
            write_queue_depth: WRITE_QUEUE_DEPTH,
        }
    }
}

/// Observable state of an elector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionState {
    /// Not leader; waiting to retry.
    Unelected,
    /// Lease acquisition in progress or lease held but not yet serving.
    Acquiring,
    /// Lease held, location published, writes enabled.
    Leader,
    /// Election stopped by outer cancellation.
    Cancelled,
}

/// Runs the election for one node.
pub struct LeaderElector {
    node_id: String,
    endpoint: String,
    config: ElectionConfig,
    leases: Arc<dyn LeaseProvider>,
    location: Arc<dyn LocationRecord>,
    log: Arc<dyn AppendLog>,
    gate: WriteAuthorizationGate,
    state: watch::Sender<ElectionState>,
}

impl LeaderElector {
    /// Create an elector for `node_id`, advertising `endpoint` when leader.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: impl Into<String>,
        endpoint: impl Into<String>,
        config: ElectionConfig,
        leases: Arc<dyn LeaseProvider>,
        location: Arc<dyn LocationRecord>,
        log: Arc<dyn AppendLog>,
        gate: WriteAuthorizationGate,
    ) -> Self {
        let (state, _) = watch::channel(ElectionState::Unelected);
        Self {
            node_id: node_id.into(),
            endpoint: endpoint.into(),
            config,
            leases,
            location,
            log,
            gate,
            state,
        }
    }

    /// Node id used as the lease holder.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// The gate this elector drives.
    pub fn gate(&self) -> &WriteAuthorizationGate {
        &self.gate
    }

    /// Current state.
    pub fn state(&self) -> ElectionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ElectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ElectionState) {
        self.state.send_replace(state);
    }

    /// Compete for leadership until `cancel` fires.
    ///
    /// Returns `Ok(())` on cancellation. A fault in the leader body (such as
    /// failing to publish the location record) ends the election with that
    /// error after teardown.
    pub async fn run_election(&self, cancel: CancellationToken) -> VaultResult<()> {
        tracing::info!(holder = %self.node_id, endpoint = %self.endpoint, "joining election");
        let retry = Duration::from_millis(self.config.retry_delay_ms);

        while !cancel.is_cancelled() {
            self.set_state(ElectionState::Acquiring);
            match self.leases.acquire(&self.node_id).await {
                Ok(LeaseAcquire::Acquired(token)) => {
                    tracing::info!(holder = %self.node_id, lease_id = token.lease_id, "lease acquired");
                    let outcome = self.hold(&token, &cancel).await;
                    self.set_state(ElectionState::Unelected);
                    outcome?;
                }
                Ok(LeaseAcquire::Busy { holder }) => {
                    tracing::debug!(holder = %self.node_id, leader = %holder, "lease busy");
                    self.set_state(ElectionState::Unelected);
                }
                Err(e) => {
                    tracing::warn!(holder = %self.node_id, error = %e, "lease acquire failed");
                    self.set_state(ElectionState::Unelected);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(retry) => {}
            }
        }

        self.set_state(ElectionState::Cancelled);
        tracing::info!(holder = %self.node_id, "left election");
        Ok(())
    }

    /// Run renewal and the leader body for one lease grant.
    async fn hold(&self, token: &LeaseToken, cancel: &CancellationToken) -> VaultResult<()> {
        let leadership = cancel.child_token();

        let renewal = self.renew_until_lost(token, &leadership);
        let body = async {
            let result = self.lead(&leadership).await;
            leadership.cancel();
            result
        };
        let ((), result) = tokio::join!(renewal, body);

        if cancel.is_cancelled() || result.is_err() {
            if let Err(e) = self.leases.release(token).await {
                tracing::warn!(holder = %self.node_id, error = %e, "lease release failed");
            }
        }
        result
    }

    /// Renew every interval; cancel `leadership` on the first failure.
    async fn renew_until_lost(&self, token: &LeaseToken, leadership: &CancellationToken) {
        let every = Duration::from_millis(self.config.renew_interval_ms);
        loop {
            tokio::select! {
                _ = leadership.cancelled() => return,
                _ = tokio::time::sleep(every) => {}
            }

            match self.leases.renew(token).await {
                Ok(LeaseRenewal::Renewed) => {
                    tracing::trace!(holder = %self.node_id, lease_id = token.lease_id, "lease renewed");
                }
                Ok(LeaseRenewal::Expired) => {
                    tracing::warn!(holder = %self.node_id, lease_id = token.lease_id, "lease expired");
                    leadership.cancel();
                    return;
                }
                Err(e) => {
                    tracing::warn!(holder = %self.node_id, error = %e, "lease renewal failed");
                    leadership.cancel();
                    return;
                }
            }
        }
    }

    /// Leader body: serve writes until `leadership` is cancelled.
    async fn lead(&self, leadership: &CancellationToken) -> VaultResult<()> {
        let scheduler = Arc::new(WriteScheduler::new(
            Arc::clone(&self.log),
            self.config.write_queue_depth,
        ));

        // publishing is bounded by one lease lifetime
        let claim_timeout = Duration::from_millis(self.config.lease_ttl_ms);
        let published = tokio::select! {
            biased;
            _ = leadership.cancelled() => {
                tracing::info!(holder = %self.node_id, "leadership lost before location was published");
                self.stop_scheduler(&scheduler).await;
                return Ok(());
            }
            published = tokio::time::timeout(claim_timeout, self.location.publish(&self.endpoint)) => {
                match published {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err(format!(
                        "location publish timed out after {}ms",
                        self.config.lease_ttl_ms
                    )),
                }
            }
        };
        if let Err(reason) = published {
            tracing::error!(
                holder = %self.node_id,
                error = %reason,
                "failed to publish leader location, abandoning leadership"
            );
            self.stop_scheduler(&scheduler).await;
            return Err(VaultError::LeadershipClaim {
                holder: self.node_id.clone(),
                reason,
            });
        }

        if leadership.is_cancelled() {
            tracing::info!(holder = %self.node_id, "leadership lost while publishing location");
            self.stop_scheduler(&scheduler).await;
            return Ok(());
        }

        self.gate.enable(Arc::clone(&scheduler));
        self.set_state(ElectionState::Leader);
        tracing::info!(holder = %self.node_id, endpoint = %self.endpoint, "serving as leader");

        leadership.cancelled().await;

        tracing::info!(holder = %self.node_id, "stepping down");
        self.gate.disable();
        self.stop_scheduler(&scheduler).await;
        Ok(())
    }

    async fn stop_scheduler(&self, scheduler: &WriteScheduler) {
        let grace = Duration::from_millis(self.config.shutdown_grace_ms);
        match tokio::time::timeout(grace, scheduler.shutdown()).await {
            Ok(()) => tracing::debug!(holder = %self.node_id, "write scheduler stopped"),
            Err(_) => {
                tracing::error!(
                    holder = %self.node_id,
                    grace_ms = self.config.shutdown_grace_ms,
                    "write scheduler did not stop within grace period"
                );
                scheduler.abort();
            }
        }
    }
}
