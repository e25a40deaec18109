//! Distributed lease provider boundary.
//!
//! A lease is a time-bounded exclusive claim. The holder must renew it before
//! the TTL runs out; a missed renewal returns the lease to the pool and the
//! next `acquire` from any node succeeds.

use crate::core::error::VaultResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Proof of a held lease, presented on renew and release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken {
    /// Node that holds the lease.
    pub holder: String,
    /// Provider-assigned id of this particular grant.
    pub lease_id: u64,
}

/// Outcome of an acquire attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseAcquire {
    /// The lease was granted.
    Acquired(LeaseToken),
    /// Another node holds a live lease.
    Busy { holder: String },
}

/// Outcome of a renew attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseRenewal {
    /// The lease was extended by one TTL.
    Renewed,
    /// The lease expired or was taken over; the token is dead.
    Expired,
}

/// Cluster-wide lease service.
#[async_trait]
pub trait LeaseProvider: Send + Sync {
    /// Try to take the lease for `holder`.
    async fn acquire(&self, holder: &str) -> VaultResult<LeaseAcquire>;

    /// Extend a held lease.
    async fn renew(&self, token: &LeaseToken) -> VaultResult<LeaseRenewal>;

    /// Give the lease up early. Releasing a dead token is a no-op.
    async fn release(&self, token: &LeaseToken) -> VaultResult<()>;
}

#[derive(Debug)]
struct Grant {
    token: LeaseToken,
    expires_at: Instant,
}

/// Lease provider for a single process, driven by the tokio clock.
#[derive(Debug)]
pub struct InMemoryLeaseProvider {
    ttl: Duration,
    grant: Mutex<Option<Grant>>,
    next_id: AtomicU64,
}

impl InMemoryLeaseProvider {
    /// Create a provider handing out leases of `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            grant: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Holder of the live lease, if any.
    pub fn holder(&self) -> Option<String> {
        let now = Instant::now();
        self.grant
            .lock()
            .as_ref()
            .filter(|g| g.expires_at > now)
            .map(|g| g.token.holder.clone())
    }

    /// Expire the current lease immediately, as if renewals had been missed.
    pub fn force_expire(&self) {
        if let Some(grant) = self.grant.lock().as_mut() {
            tracing::debug!(holder = %grant.token.holder, "forcing lease expiry");
            grant.expires_at = Instant::now();
        }
    }
}

#[async_trait]
impl LeaseProvider for InMemoryLeaseProvider {
    async fn acquire(&self, holder: &str) -> VaultResult<LeaseAcquire> {
        let now = Instant::now();
        let mut grant = self.grant.lock();
        if let Some(live) = grant.as_ref().filter(|g| g.expires_at > now) {
            return Ok(LeaseAcquire::Busy {
                holder: live.token.holder.clone(),
            });
        }

        let token = LeaseToken {
            holder: holder.to_string(),
            lease_id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        *grant = Some(Grant {
            token: token.clone(),
            expires_at: now + self.ttl,
        });
        Ok(LeaseAcquire::Acquired(token))
    }

    async fn renew(&self, token: &LeaseToken) -> VaultResult<LeaseRenewal> {
        let now = Instant::now();
        let mut grant = self.grant.lock();
        match grant.as_mut() {
            Some(g) if g.token == *token && g.expires_at > now => {
                g.expires_at = now + self.ttl;
                Ok(LeaseRenewal::Renewed)
            }
            _ => Ok(LeaseRenewal::Expired),
        }
    }

    async fn release(&self, token: &LeaseToken) -> VaultResult<()> {
        let mut grant = self.grant.lock();
        if grant.as_ref().is_some_and(|g| g.token == *token) {
            *grant = None;
        }
        Ok(())
    }
}
