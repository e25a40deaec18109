//! Storage layer.
//!
//! Everything that touches bytes on the local disk lives here.
//!
//! # Modules
//!
//! - [`frame`] - Frame wire format, chunking and compression of messages
//! - [`checkpoint`] - Volatile and durable checkpoint vectors
//! - [`cache`] - Checkpointed cache reader and its single writer
//!
//! # Invariants
//!
//! - A cache reader never returns data past the durable checkpoint
//! - A frame chain is only delivered once its terminating frame arrived
//! - Positions only move forward

pub mod cache;
pub mod checkpoint;
pub mod frame;

// Re-exports for convenience
pub use cache::{
    cache_paths, CacheWriter, CachedFrame, CheckpointedCacheReader, ReadBulkResult, ReadResult,
};
pub use checkpoint::{
    CheckpointVector, DurableCheckpointReader, DurableCheckpointWriter, FixedCheckpoint,
    SharedCheckpoint, VolatileCheckpoint,
};
pub use frame::{ChainAssembler, DecodeStep, Frame, FrameCodec, FrameFlags, LogicalMessage};
