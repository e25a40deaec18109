//! Client side of the append log.
//!
//! - [`log`] - Append log boundary and its in-process implementation
//! - [`paged`] - Chunked publisher and chasing subscriber
//! - [`mirror`] - Copies a stream into its local cache

pub mod log;
pub mod mirror;
pub mod paged;

pub use log::{AppendLog, InMemoryAppendLog, PostResult, StoredFrame, Subscription};
pub use mirror::CacheMirror;
pub use paged::{PagedClient, PublishResult, ReceivedMessage};
