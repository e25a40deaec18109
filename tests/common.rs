//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::BytesMut;
use messagevault::client::log::{AppendLog, PostResult, Subscription};
use messagevault::core::config::Config;
use messagevault::core::error::{VaultError, VaultResult};
use messagevault::election::elector::ElectionState;
use messagevault::election::lease::{
    InMemoryLeaseProvider, LeaseAcquire, LeaseProvider, LeaseRenewal, LeaseToken,
};
use messagevault::election::location::LocationRecord;
use messagevault::storage::frame::{write_frame, Frame, FrameCodec, LogicalMessage};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Deterministic pseudo-random bytes.
pub fn random_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buf = vec![0u8; len];
    rng.fill_bytes(&mut buf);
    buf
}

/// Create a temporary directory for test data.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Write `content` into a temporary config file.
pub fn create_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Load a config from a temp file.
pub fn load_config(file: &NamedTempFile) -> Config {
    Config::from_file(file.path()).expect("Failed to load config")
}

/// Encode a message into frames with the given frame size.
pub fn encode(key: &str, value: &[u8], max_frame_size: usize) -> Vec<Frame> {
    let codec = FrameCodec::new(max_frame_size).expect("valid frame size");
    codec
        .encode(&LogicalMessage::new(key, value.to_vec()))
        .expect("encode")
}

/// Wire bytes of a sequence of frames.
pub fn wire_bytes(frames: &[Frame]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    for frame in frames {
        write_frame(frame, &mut buf).expect("write frame");
    }
    buf.to_vec()
}

/// Append raw bytes to a file, bypassing any checkpoint.
pub fn append_raw(path: &Path, bytes: &[u8]) {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .expect("open for append");
    file.write_all(bytes).expect("append");
}

/// Wait until the watched election state equals `want`.
pub async fn wait_for_state(rx: &mut watch::Receiver<ElectionState>, want: ElectionState) {
    tokio::time::timeout(Duration::from_secs(120), rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", want))
        .expect("elector dropped");
}

/// Location record whose writes always fail.
#[derive(Debug, Default)]
pub struct FailingLocationRecord;

#[async_trait]
impl LocationRecord for FailingLocationRecord {
    async fn publish(&self, _endpoint: &str) -> VaultResult<()> {
        Err(VaultError::location("storage account unreachable"))
    }

    async fn read(&self) -> VaultResult<Option<String>> {
        Ok(None)
    }
}

/// Location record whose writes never complete.
#[derive(Debug, Default)]
pub struct HangingLocationRecord {
    publishes: AtomicUsize,
}

impl HangingLocationRecord {
    /// Number of publish calls started so far.
    pub fn publishes(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationRecord for HangingLocationRecord {
    async fn publish(&self, _endpoint: &str) -> VaultResult<()> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn read(&self) -> VaultResult<Option<String>> {
        Ok(None)
    }
}

/// Lease provider whose renewals start failing on demand.
#[derive(Debug)]
pub struct FlakyLeaseProvider {
    inner: Arc<InMemoryLeaseProvider>,
    failing: AtomicBool,
}

impl FlakyLeaseProvider {
    pub fn new(inner: Arc<InMemoryLeaseProvider>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    /// Make every following renewal fail.
    pub fn fail_renewals(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LeaseProvider for FlakyLeaseProvider {
    async fn acquire(&self, holder: &str) -> VaultResult<LeaseAcquire> {
        self.inner.acquire(holder).await
    }

    async fn renew(&self, token: &LeaseToken) -> VaultResult<LeaseRenewal> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(VaultError::LeaseProvider {
                message: "lease service timed out".to_string(),
            });
        }
        self.inner.renew(token).await
    }

    async fn release(&self, token: &LeaseToken) -> VaultResult<()> {
        self.inner.release(token).await
    }
}

/// Append log whose posts never complete.
#[derive(Debug, Default)]
pub struct HangingAppendLog;

#[async_trait]
impl AppendLog for HangingAppendLog {
    async fn post_frames(&self, _stream: &str, _frames: Vec<Frame>) -> VaultResult<PostResult> {
        std::future::pending().await
    }

    async fn end_position(&self, _stream: &str) -> VaultResult<u64> {
        Ok(0)
    }

    async fn subscribe(
        &self,
        _stream: &str,
        _cursor: u64,
        _byte_buffer: usize,
        _message_buffer: usize,
        _cancel: CancellationToken,
    ) -> VaultResult<Subscription> {
        Err(VaultError::append_log("subscriptions not supported"))
    }
}

/// Assert that a result is Ok and return the value.
#[track_caller]
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a result is Err.
#[track_caller]
pub fn assert_err<T: std::fmt::Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
        Err(e) => e,
    }
}
