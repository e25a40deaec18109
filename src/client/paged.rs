//! Paged publisher and chasing subscriber.
//!
//! [`PagedClient`] is the client-side half of the pipeline. Publishing turns
//! logical messages into compressed frame chains and posts them as a single
//! batch. Chasing follows a subscription forever, reassembles chains and hands
//! each complete message to a callback in log order.

use crate::client::log::{AppendLog, Subscription};
use crate::core::error::{VaultError, VaultResult};
use crate::storage::frame::{ChainAssembler, FrameCodec, FrameFlags, LogicalMessage};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default number of frames buffered by a subscription.
pub const READ_MESSAGES_BUFFER: usize = 1000;

/// Default byte budget of one subscription fetch.
pub const READ_BYTES_BUFFER: usize = 2 * 1024 * 1024;

/// How long the chaser waits for new frames before polling again.
pub const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Result of [`PagedClient::publish`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishResult {
    /// End position of the stream after the batch.
    pub position: u64,
    /// Offset of the first frame of every message, in submission order.
    pub offsets: Vec<u64>,
}

/// A reassembled message handed to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Offset of the chain's last frame.
    pub id: u64,
    /// Message key.
    pub key: String,
    /// Flags of the chain's last frame.
    pub flags: FrameFlags,
    /// Decompressed message body.
    pub value: Bytes,
}

/// Publisher and subscriber bound to one stream.
#[derive(Clone)]
pub struct PagedClient {
    log: Arc<dyn AppendLog>,
    stream: String,
    codec: FrameCodec,
    read_messages_buffer: usize,
    read_bytes_buffer: usize,
}

impl PagedClient {
    /// Create a client for `stream` with default buffer sizes.
    pub fn new(log: Arc<dyn AppendLog>, stream: impl Into<String>, codec: FrameCodec) -> Self {
        Self {
            log,
            stream: stream.into(),
            codec,
            read_messages_buffer: READ_MESSAGES_BUFFER,
            read_bytes_buffer: READ_BYTES_BUFFER,
        }
    }

    /// Override subscription buffer sizes.
    pub fn with_buffers(mut self, messages: usize, bytes: usize) -> Self {
        self.read_messages_buffer = messages.max(1);
        self.read_bytes_buffer = bytes.max(1);
        self
    }

    /// Encode `messages` and post all their frames as one batch.
    ///
    /// Nothing is posted if any message fails to encode.
    pub async fn publish(&self, messages: &[LogicalMessage]) -> VaultResult<PublishResult> {
        let mut frames = Vec::new();
        let mut first_frame = Vec::with_capacity(messages.len());
        for message in messages {
            first_frame.push(frames.len());
            frames.extend(self.codec.encode(message)?);
        }

        let frame_count = frames.len();
        let posted = self.log.post_frames(&self.stream, frames).await?;
        if posted.offsets.len() != frame_count {
            return Err(VaultError::append_log(format!(
                "posted {} frames but log returned {} offsets",
                frame_count,
                posted.offsets.len()
            )));
        }

        tracing::debug!(
            stream = %self.stream,
            messages = messages.len(),
            frames = frame_count,
            position = posted.position,
            "published batch"
        );

        Ok(PublishResult {
            position: posted.position,
            offsets: first_frame.into_iter().map(|i| posted.offsets[i]).collect(),
        })
    }

    /// Chase the stream from `start` without an idle callback.
    pub async fn chase<M>(
        &self,
        cancel: &CancellationToken,
        start: u64,
        on_message: M,
    ) -> VaultResult<()>
    where
        M: FnMut(&ReceivedMessage, &Subscription) -> anyhow::Result<()> + Send,
    {
        self.chase_forever(cancel, start, on_message, None::<fn(&Subscription)>)
            .await
    }

    /// Follow the stream from `start` until `cancel` fires.
    ///
    /// Messages are delivered in offset order. A failing `on_message` stops
    /// only this subscription and its error is returned as
    /// [`VaultError::Consumer`]. Outer cancellation returns `Ok(())`.
    pub async fn chase_forever<M, I>(
        &self,
        cancel: &CancellationToken,
        start: u64,
        mut on_message: M,
        mut on_idle: Option<I>,
    ) -> VaultResult<()>
    where
        M: FnMut(&ReceivedMessage, &Subscription) -> anyhow::Result<()> + Send,
        I: FnMut(&Subscription) + Send,
    {
        let local = cancel.child_token();
        let result = self
            .chase_inner(&local, start, &mut on_message, &mut on_idle)
            .await;
        // stops the feed; the caller's token is untouched
        local.cancel();
        result
    }

    async fn chase_inner<M, I>(
        &self,
        local: &CancellationToken,
        start: u64,
        on_message: &mut M,
        on_idle: &mut Option<I>,
    ) -> VaultResult<()>
    where
        M: FnMut(&ReceivedMessage, &Subscription) -> anyhow::Result<()> + Send,
        I: FnMut(&Subscription) + Send,
    {
        let mut subscription = self
            .log
            .subscribe(
                &self.stream,
                start,
                self.read_bytes_buffer,
                self.read_messages_buffer,
                local.clone(),
            )
            .await?;
        let mut chain = ChainAssembler::new();

        tracing::debug!(stream = %self.stream, start, "chasing stream");

        loop {
            if local.is_cancelled() {
                return Ok(());
            }

            let stored = match subscription.try_next() {
                Some(stored) => stored,
                None => {
                    if let Some(idle) = on_idle.as_mut() {
                        idle(&subscription);
                    }
                    tokio::select! {
                        biased;
                        _ = local.cancelled() => return Ok(()),
                        next = subscription.recv() => match next {
                            Some(stored) => stored,
                            None if local.is_cancelled() => return Ok(()),
                            None => {
                                return Err(VaultError::SubscriptionClosed {
                                    stream: self.stream.clone(),
                                })
                            }
                        },
                        _ = tokio::time::sleep(IDLE_WAIT) => continue,
                    }
                }
            };

            let id = stored.offset;
            let flags = stored.frame.flags;
            let Some(message) = chain.push(stored.frame)? else {
                continue;
            };

            let received = ReceivedMessage {
                id,
                key: message.key,
                flags,
                value: message.value,
            };
            if let Err(err) = on_message(&received, &subscription) {
                tracing::warn!(
                    stream = %self.stream,
                    id,
                    error = %err,
                    "consumer failed, stopping subscription"
                );
                return Err(VaultError::Consumer(err));
            }
        }
    }
}
