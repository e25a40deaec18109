//! Append log service boundary.
//!
//! The [`AppendLog`] trait is the only thing the publish/subscribe pipeline
//! knows about the remote log: post a batch of frames, or open a
//! [`Subscription`] that streams frames from a cursor onwards.
//!
//! [`InMemoryAppendLog`] is the in-process implementation. Offsets are byte
//! positions of each frame in the stream's encoded representation, so they
//! match the positions a local cache of the same stream would use.
//!
//! ```text
//!  post_frames ──▶ streams[stream] ──▶ version.send()
//!                                         │
//!  producer task ◀── version.changed() ◀──┘
//!       │ bounded mpsc (message_buffer)
//!       ▼
//!  Subscription::recv / try_next  (advances the cursor)
//! ```

use crate::core::error::{VaultError, VaultResult};
use crate::storage::frame::Frame;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Result of posting a batch of frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostResult {
    /// End position of the stream after the batch.
    pub position: u64,
    /// Offset of every posted frame, in submission order.
    pub offsets: Vec<u64>,
}

/// A frame together with its offset in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFrame {
    /// Byte position of the frame.
    pub offset: u64,
    /// The frame itself.
    pub frame: Frame,
}

impl StoredFrame {
    /// Position right after this frame.
    pub fn end(&self) -> u64 {
        self.offset + self.frame.encoded_len() as u64
    }
}

/// Remote append-only log holding one frame sequence per stream.
#[async_trait]
pub trait AppendLog: Send + Sync {
    /// Append `frames` to `stream` atomically.
    async fn post_frames(&self, stream: &str, frames: Vec<Frame>) -> VaultResult<PostResult>;

    /// Current end position of `stream` (zero for an unknown stream).
    async fn end_position(&self, stream: &str) -> VaultResult<u64>;

    /// Stream frames of `stream` starting at `cursor` until `cancel` fires
    /// or the returned subscription is dropped.
    async fn subscribe(
        &self,
        stream: &str,
        cursor: u64,
        byte_buffer: usize,
        message_buffer: usize,
        cancel: CancellationToken,
    ) -> VaultResult<Subscription>;
}

/// A live feed of frames with a non-decreasing cursor.
#[derive(Debug)]
pub struct Subscription {
    stream: String,
    cursor: u64,
    rx: mpsc::Receiver<StoredFrame>,
}

impl Subscription {
    /// Wrap a receiver fed by a producer task.
    pub fn new(stream: impl Into<String>, cursor: u64, rx: mpsc::Receiver<StoredFrame>) -> Self {
        Self {
            stream: stream.into(),
            cursor,
            rx,
        }
    }

    /// Stream this subscription reads.
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Position right after the last frame handed out.
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Take the next buffered frame without waiting.
    pub fn try_next(&mut self) -> Option<StoredFrame> {
        let stored = self.rx.try_recv().ok()?;
        self.advance(&stored);
        Some(stored)
    }

    /// Wait for the next frame. `None` once the feed has ended.
    pub async fn recv(&mut self) -> Option<StoredFrame> {
        let stored = self.rx.recv().await?;
        self.advance(&stored);
        Some(stored)
    }

    fn advance(&mut self, stored: &StoredFrame) {
        self.cursor = self.cursor.max(stored.end());
    }
}

// ============================================================================
// In-process implementation
// ============================================================================

#[derive(Debug, Default)]
struct StreamLog {
    frames: Vec<StoredFrame>,
    end: u64,
}

impl StreamLog {
    /// Frames starting at or after `cursor`, limited by both budgets.
    /// At least one frame is returned when any is available.
    fn page(&self, cursor: u64, byte_budget: usize, message_budget: usize) -> Vec<StoredFrame> {
        let first = self.frames.partition_point(|f| f.offset < cursor);
        let mut bytes = 0usize;
        let mut page = Vec::new();
        for stored in &self.frames[first..] {
            let len = stored.frame.encoded_len();
            if !page.is_empty() && (page.len() >= message_budget || bytes + len > byte_budget) {
                break;
            }
            bytes += len;
            page.push(stored.clone());
        }
        page
    }
}

/// Append log kept in process memory.
#[derive(Debug, Clone)]
pub struct InMemoryAppendLog {
    streams: Arc<RwLock<HashMap<String, StreamLog>>>,
    version: Arc<watch::Sender<u64>>,
}

impl Default for InMemoryAppendLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAppendLog {
    /// Create an empty log.
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
            version: Arc::new(version),
        }
    }

    /// Snapshot of every frame in `stream`.
    pub fn frames(&self, stream: &str) -> Vec<StoredFrame> {
        self.streams
            .read()
            .get(stream)
            .map(|s| s.frames.clone())
            .unwrap_or_default()
    }

    fn append(&self, stream: &str, frames: Vec<Frame>) -> PostResult {
        let mut streams = self.streams.write();
        let log = streams.entry(stream.to_string()).or_default();
        let mut offsets = Vec::with_capacity(frames.len());
        for frame in frames {
            let offset = log.end;
            log.end += frame.encoded_len() as u64;
            offsets.push(offset);
            log.frames.push(StoredFrame { offset, frame });
        }
        PostResult {
            position: log.end,
            offsets,
        }
    }
}

#[async_trait]
impl AppendLog for InMemoryAppendLog {
    async fn post_frames(&self, stream: &str, frames: Vec<Frame>) -> VaultResult<PostResult> {
        let count = frames.len();
        let result = self.append(stream, frames);
        self.version.send_modify(|v| *v += 1);
        tracing::trace!(stream = %stream, frames = count, position = result.position, "frames posted");
        Ok(result)
    }

    async fn end_position(&self, stream: &str) -> VaultResult<u64> {
        Ok(self.streams.read().get(stream).map(|s| s.end).unwrap_or(0))
    }

    async fn subscribe(
        &self,
        stream: &str,
        cursor: u64,
        byte_buffer: usize,
        message_buffer: usize,
        cancel: CancellationToken,
    ) -> VaultResult<Subscription> {
        if message_buffer == 0 || byte_buffer == 0 {
            return Err(VaultError::append_log("subscription buffers must be non-zero"));
        }

        let (tx, rx) = mpsc::channel(message_buffer);
        let streams = Arc::clone(&self.streams);
        let mut version = self.version.subscribe();
        let name = stream.to_string();

        tokio::spawn(async move {
            let mut next = cursor;
            loop {
                version.borrow_and_update();
                let page = streams
                    .read()
                    .get(&name)
                    .map(|s| s.page(next, byte_buffer, message_buffer))
                    .unwrap_or_default();

                if page.is_empty() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        changed = version.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                    continue;
                }

                for stored in page {
                    next = stored.end();
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        sent = tx.send(stored) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            tracing::trace!(stream = %name, position = next, "subscription feed stopped");
        });

        Ok(Subscription::new(stream, cursor, rx))
    }
}
