//! Error types.
//!
//! MessageVault separates conditions that are part of normal operation
//! (reading up to the write frontier, losing a lease) from faults. The former
//! are reported as status values on results; only the latter become a
//! [`VaultError`].

use thiserror::Error;

/// Common MessageVault error conditions.
#[derive(Debug, Error)]
pub enum VaultError {
    /// A frame header could not be decoded. Everything from `offset` onward
    /// must be treated as corrupt.
    #[error("corrupt frame at offset {offset}: {reason}")]
    CorruptFrame { offset: u64, reason: String },

    /// A frame chain ended before a terminating frame was seen.
    #[error("incomplete frame chain for key '{key}' ({frames} frames without terminator)")]
    IncompleteChain { key: String, frames: usize },

    /// A frame chain switched keys before it was terminated.
    #[error("broken frame chain: expected key '{expected}', found '{found}'")]
    BrokenChain { expected: String, found: String },

    /// Compression or decompression of a message payload failed.
    #[error("compression failure: {0}")]
    Compression(#[source] std::io::Error),

    /// A logical message or frame violated a size or shape constraint.
    #[error("invalid message: {message}")]
    InvalidMessage { message: String },

    /// Publishing the location record failed, so the leadership claim was
    /// abandoned.
    #[error("leadership claim by '{holder}' aborted: {reason}")]
    LeadershipClaim { holder: String, reason: String },

    /// The shared location record could not be read or written.
    #[error("location record failure: {message}")]
    LocationRecord { message: String },

    /// The distributed lease provider failed (not a plain `Busy`/`Expired`).
    #[error("lease provider failure: {message}")]
    LeaseProvider { message: String },

    /// The write scheduler has been shut down and no longer accepts writes.
    #[error("write scheduler is shut down")]
    WriterShutDown,

    /// The append log rejected or failed a request.
    #[error("append log failure: {message}")]
    AppendLog { message: String },

    /// The subscription feed ended without a cancellation request.
    #[error("subscription feed for stream '{stream}' closed")]
    SubscriptionClosed { stream: String },

    /// A consumer callback failed while handling a delivered message.
    #[error("consumer callback failed: {0}")]
    Consumer(#[source] anyhow::Error),

    /// Underlying I/O failure.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// Create a CorruptFrame error.
    pub fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptFrame {
            offset,
            reason: reason.into(),
        }
    }

    /// Create an AppendLog error.
    pub fn append_log(message: impl Into<String>) -> Self {
        Self::AppendLog {
            message: message.into(),
        }
    }

    /// Create a LocationRecord error.
    pub fn location(message: impl Into<String>) -> Self {
        Self::LocationRecord {
            message: message.into(),
        }
    }

    /// Check if this error means stored data can no longer be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptFrame { .. } | Self::BrokenChain { .. } | Self::IncompleteChain { .. }
        )
    }

    /// Check if a write that failed with this error should be sent to the
    /// current leader instead.
    pub fn should_forward(&self) -> bool {
        matches!(self, Self::WriterShutDown)
    }
}

/// Result type using VaultError.
pub type VaultResult<T> = Result<T, VaultError>;
