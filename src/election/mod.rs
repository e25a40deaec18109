//! Leader election and write authorization.
//!
//! - [`lease`] - Distributed lease boundary and in-process provider
//! - [`location`] - Shared record naming the current leader
//! - [`writer`] - The leader's write scheduler
//! - [`gate`] - Lock-free switch routing writes to the scheduler
//! - [`elector`] - The election loop tying them together
//!
//! # Invariants
//!
//! - At most one node holds the lease at any instant
//! - The location record is published before writes are enabled
//! - Writes are disabled before the scheduler is shut down

pub mod elector;
pub mod gate;
pub mod lease;
pub mod location;
pub mod writer;

pub use elector::{ElectionConfig, ElectionState, LeaderElector, SHUTDOWN_GRACE};
pub use gate::WriteAuthorizationGate;
pub use lease::{InMemoryLeaseProvider, LeaseAcquire, LeaseProvider, LeaseRenewal, LeaseToken};
pub use location::{FileLocationRecord, InMemoryLocationRecord, LocationRecord};
pub use writer::WriteScheduler;
