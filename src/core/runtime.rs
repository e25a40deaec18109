//! Main runtime orchestration.
//!
//! The runtime wires one node together and coordinates component lifecycle:
//! - Start order: cache mirror → election
//! - Shutdown order: election (gate disabled, scheduler drained) → mirror
//!
//! All tasks hang off a single [`CancellationToken`]. A fatal error in a task
//! (such as an aborted leadership claim) cancels it, which stops the node.

use crate::api::front_end::WriteFrontEnd;
use crate::client::log::{AppendLog, InMemoryAppendLog};
use crate::client::mirror::CacheMirror;
use crate::client::paged::PagedClient;
use crate::core::config::Config;
use crate::core::error::VaultResult;
use crate::election::elector::{ElectionState, LeaderElector};
use crate::election::gate::WriteAuthorizationGate;
use crate::election::lease::{InMemoryLeaseProvider, LeaseProvider};
use crate::election::location::{FileLocationRecord, LocationRecord};
use crate::storage::cache::CacheWriter;
use crate::storage::frame::FrameCodec;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long `stop` waits for each task.
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// MessageVault runtime holding all component handles.
pub struct Runtime {
    /// Configuration.
    config: Arc<Config>,

    /// Append log shared by the publisher, the mirror and the writer.
    log: Arc<dyn AppendLog>,

    /// Shared leader location record.
    location: Arc<dyn LocationRecord>,

    /// Gate flipped by the elector.
    gate: WriteAuthorizationGate,

    /// Election driver.
    elector: Arc<LeaderElector>,

    /// Whether the runtime is running.
    running: Arc<AtomicBool>,

    /// Root cancellation token of every task.
    cancel: CancellationToken,

    /// Spawned tasks by name.
    tasks: Vec<(&'static str, JoinHandle<VaultResult<()>>)>,
}

impl Runtime {
    /// Create a single-process runtime with in-memory log and lease provider.
    pub fn new(config: Config) -> Result<Self> {
        let leases = Arc::new(InMemoryLeaseProvider::new(Duration::from_millis(
            config.election.lease_ttl_ms,
        )));
        Self::with_components(config, Arc::new(InMemoryAppendLog::new()), leases)
    }

    /// Create a runtime over externally provided log and lease provider.
    pub fn with_components(
        config: Config,
        log: Arc<dyn AppendLog>,
        leases: Arc<dyn LeaseProvider>,
    ) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let location: Arc<dyn LocationRecord> =
            Arc::new(FileLocationRecord::new(config.storage.location_path.clone()));
        let gate = WriteAuthorizationGate::new();
        let elector = Arc::new(LeaderElector::new(
            config.node.node_id.clone(),
            config.node.endpoint.clone(),
            config.election.to_election_config(),
            leases,
            Arc::clone(&location),
            Arc::clone(&log),
            gate.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            log,
            location,
            gate,
            elector,
            running: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the write authorization gate.
    pub fn gate(&self) -> &WriteAuthorizationGate {
        &self.gate
    }

    /// Front end routing writes for this node.
    pub fn front_end(&self) -> WriteFrontEnd {
        WriteFrontEnd::new(self.gate.clone(), Arc::clone(&self.location))
    }

    /// Publisher/subscriber bound to the configured stream.
    pub fn client(&self) -> Result<PagedClient> {
        let stream = &self.config.stream;
        let codec = FrameCodec::new(stream.max_frame_size).context("invalid frame size")?;
        Ok(PagedClient::new(Arc::clone(&self.log), stream.name.clone(), codec)
            .with_buffers(stream.read_messages_buffer, stream.read_bytes_buffer))
    }

    /// Watch election state transitions.
    pub fn election_state(&self) -> watch::Receiver<ElectionState> {
        self.elector.subscribe()
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Token cancelled when the runtime shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start the cache mirror and the election.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(
            node_id = %self.config.node.node_id,
            stream = %self.config.stream.name,
            cache_dir = %self.config.storage.cache_dir.display(),
            "starting MessageVault runtime"
        );

        if self.config.stream.mirror_cache {
            self.start_mirror()?;
        }
        self.start_election();

        self.running.store(true, Ordering::Release);
        tracing::info!("MessageVault runtime started");
        Ok(())
    }

    fn start_mirror(&mut self) -> Result<()> {
        let stream = &self.config.stream;
        let writer = CacheWriter::open(&self.config.storage.cache_dir, &stream.name)
            .with_context(|| format!("failed to open cache for stream '{}'", stream.name))?;
        let mut mirror = CacheMirror::new(
            Arc::clone(&self.log),
            stream.name.clone(),
            writer,
            stream.read_messages_buffer,
            stream.read_bytes_buffer,
        );

        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let result = mirror.run(&cancel).await;
            if let Err(ref e) = result {
                tracing::error!(error = %e, "cache mirror failed");
                cancel.cancel();
            }
            result
        });
        self.tasks.push(("mirror", handle));
        Ok(())
    }

    fn start_election(&mut self) {
        let elector = Arc::clone(&self.elector);
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let result = elector.run_election(cancel.clone()).await;
            if let Err(ref e) = result {
                tracing::error!(error = %e, "election stopped");
                cancel.cancel();
            }
            result
        });
        self.tasks.push(("election", handle));
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        self.cancel.cancel();
    }

    /// Run the runtime until Ctrl-C or shutdown.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received (SIGINT)");
            }
            _ = self.cancel.cancelled() => {
                tracing::info!("shutdown requested by component");
            }
        }

        self.stop().await
    }

    /// Stop all tasks, the election first.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping MessageVault runtime");
        self.running.store(false, Ordering::Release);
        self.cancel.cancel();

        // election was pushed last; stop it first
        while let Some((name, handle)) = self.tasks.pop() {
            match tokio::time::timeout(TASK_STOP_TIMEOUT, handle).await {
                Ok(Ok(Ok(()))) => tracing::debug!(task = name, "task stopped"),
                Ok(Ok(Err(e))) => tracing::warn!(task = name, error = %e, "task stopped with error"),
                Ok(Err(e)) => tracing::warn!(task = name, error = %e, "task panicked"),
                Err(_) => tracing::warn!(task = name, "task stop timed out"),
            }
        }

        tracing::info!("MessageVault runtime stopped");
        Ok(())
    }
}
