//! Write scheduler of the current leader.
//!
//! Writes accepted by the front end are queued here and posted to the append
//! log one batch at a time by a single worker task. Shutting the scheduler
//! down closes the queue; requests already queued are still posted, new ones
//! fail with [`VaultError::WriterShutDown`] so the caller can forward them.

use crate::client::log::{AppendLog, PostResult};
use crate::core::error::{VaultError, VaultResult};
use crate::storage::frame::Frame;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};

/// Default number of queued write requests.
pub const WRITE_QUEUE_DEPTH: usize = 256;

struct WriteRequest {
    stream: String,
    frames: Vec<Frame>,
    reply: oneshot::Sender<VaultResult<PostResult>>,
}

/// Serializes writes to the append log on the leader.
pub struct WriteScheduler {
    tx: Mutex<Option<mpsc::Sender<WriteRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    abort: AbortHandle,
}

impl std::fmt::Debug for WriteScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteScheduler")
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl WriteScheduler {
    /// Start a scheduler posting to `log`.
    pub fn new(log: Arc<dyn AppendLog>, queue_depth: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<WriteRequest>(queue_depth.max(1));
        let worker = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let result = log.post_frames(&request.stream, request.frames).await;
                if let Err(e) = &result {
                    tracing::warn!(stream = %request.stream, error = %e, "scheduled write failed");
                }
                let _ = request.reply.send(result);
            }
            tracing::debug!("write scheduler drained");
        });
        let abort = worker.abort_handle();

        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            abort,
        }
    }

    /// Queue a batch and wait until it is posted.
    pub async fn submit(&self, stream: &str, frames: Vec<Frame>) -> VaultResult<PostResult> {
        let tx = self.tx.lock().clone().ok_or(VaultError::WriterShutDown)?;
        let (reply, response) = oneshot::channel();
        tx.send(WriteRequest {
            stream: stream.to_string(),
            frames,
            reply,
        })
        .await
        .map_err(|_| VaultError::WriterShutDown)?;
        response.await.map_err(|_| VaultError::WriterShutDown)?
    }

    /// Whether the scheduler still accepts writes.
    pub fn is_shut_down(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Stop accepting writes and wait for queued ones to finish.
    pub async fn shutdown(&self) {
        self.tx.lock().take();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "write scheduler worker panicked");
                }
            }
        }
    }

    /// Kill the worker without waiting for queued writes.
    pub fn abort(&self) {
        self.tx.lock().take();
        self.abort.abort();
    }
}
