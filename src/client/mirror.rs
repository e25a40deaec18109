//! Local cache mirror.
//!
//! Follows a stream of the append log and copies every frame into the
//! stream's local cache through a [`CacheWriter`]. The mirror resumes from the
//! origin position recorded in the cache's checkpoint, so restarting a node
//! neither skips nor duplicates frames.
//!
//! Appends fsync the cache, so they run on the blocking pool.

use crate::client::log::AppendLog;
use crate::core::error::{VaultError, VaultResult};
use crate::storage::cache::CacheWriter;
use crate::storage::checkpoint::VolatileCheckpoint;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Copies one stream of the append log into its local cache.
pub struct CacheMirror {
    log: Arc<dyn AppendLog>,
    stream: String,
    writer: Arc<Mutex<CacheWriter>>,
    batch: usize,
    byte_buffer: usize,
}

impl CacheMirror {
    /// Mirror `stream` into `writer`, appending at most `batch` frames at a time.
    pub fn new(
        log: Arc<dyn AppendLog>,
        stream: impl Into<String>,
        writer: CacheWriter,
        batch: usize,
        byte_buffer: usize,
    ) -> Self {
        Self {
            log,
            stream: stream.into(),
            writer: Arc::new(Mutex::new(writer)),
            batch: batch.max(1),
            byte_buffer: byte_buffer.max(1),
        }
    }

    /// Copy frames until `cancel` fires.
    pub async fn run(&mut self, cancel: &CancellationToken) -> VaultResult<()> {
        let local = cancel.child_token();
        let result = self.copy(&local).await;
        local.cancel();
        result
    }

    async fn copy(&mut self, local: &CancellationToken) -> VaultResult<()> {
        let (start, cache_position) = {
            let writer = self.writer.lock();
            (writer.volatile().read_volatile().origin_cached, writer.position())
        };
        let mut subscription = self
            .log
            .subscribe(&self.stream, start, self.byte_buffer, self.batch, local.clone())
            .await?;

        tracing::info!(
            stream = %self.stream,
            origin = start,
            cache = cache_position,
            "mirroring stream into local cache"
        );

        loop {
            let first = tokio::select! {
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
            };

            let mut frames = vec![first.frame];
            while frames.len() < self.batch {
                match subscription.try_next() {
                    Some(stored) => frames.push(stored.frame),
                    None => break,
                }
            }

            let cached = subscription.position();
            let origin_max = self.log.end_position(&self.stream).await?.max(cached);
            let count = frames.len();
            let writer = Arc::clone(&self.writer);
            let vector = tokio::task::spawn_blocking(move || {
                writer.lock().append(&frames, cached, origin_max)
            })
            .await
            .map_err(|e| VaultError::Io(std::io::Error::other(e)))??;
            tracing::trace!(
                stream = %self.stream,
                frames = count,
                local = vector.local_flushed,
                origin = cached,
                "cache advanced"
            );
        }
    }
}
