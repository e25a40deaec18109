//! MessageVault - append-only event log with a lease-elected single writer.
//!
//! One node at a time holds a renewable lease and accepts writes; every other
//! node forwards writes to it. Large messages are compressed and chunked into
//! bounded frames, published as one batch and reassembled by subscribers.
//! Local caches of a stream can be read concurrently with their writer thanks
//! to a two-level checkpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Front End                               │
//! │        WriteFrontEnd  (accept locally  │  forward to leader)    │
//! └─────────────────────────────────────────────────────────────────┘
//!                │ gate                            │ location record
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Election                                │
//! │   LeaseProvider │ LeaderElector │ Gate (ArcSwap) │ WriteScheduler│
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Append Log Client                        │
//! │      PagedClient (publish / chase)  │  CacheMirror              │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Storage                                │
//! │   FrameCodec │ Checkpoint (volatile + durable) │ Cache files    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Main runtime orchestration
//! - [`core::error`] - Error types
//!
//! ## Storage
//! - [`storage::frame`] - Frame wire format and message chunking
//! - [`storage::checkpoint`] - Volatile and durable checkpoints
//! - [`storage::cache`] - Checkpointed cache reader and writer
//!
//! ## Client
//! - [`client::log`] - Append log boundary and in-process log
//! - [`client::paged`] - Paged publisher and chasing subscriber
//! - [`client::mirror`] - Stream to local cache copier
//!
//! ## Election
//! - [`election::lease`] - Lease provider boundary
//! - [`election::location`] - Leader location record
//! - [`election::writer`] - Leader write scheduler
//! - [`election::gate`] - Write authorization gate
//! - [`election::elector`] - Election loop
//!
//! ## API
//! - [`api::front_end`] - Write routing
//! - [`api::auth`] - User and claim store
//!
//! ## CLI
//! - [`cli::commands`] - CLI command implementations
//!
//! # Key Invariants
//!
//! - At most one node holds the lease, and only that node's gate is enabled
//! - A cache reader never reads past the durable checkpoint
//! - Messages are delivered in log order, one complete chain at a time

// Core infrastructure
pub mod core;

// Storage layer
pub mod storage;

// Append log client
pub mod client;

// Leader election
pub mod election;

// Request surface
pub mod api;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime};
pub use client::{log, mirror, paged};
pub use election::{elector, gate, lease, location, writer};
pub use storage::{cache, checkpoint, frame};
