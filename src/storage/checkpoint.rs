//! Two-level checkpoint vectors.
//!
//! A checkpoint vector records how far the local cache file has been flushed
//! (`local_flushed`) and how that relates to the remote log the cache mirrors
//! (`origin_cached`, `origin_max`). Two copies exist:
//!
//! - **Volatile**: in-memory atomics updated by the cache writer. Cheap to
//!   read, may run ahead of what is durably on disk.
//! - **Durable**: a 24-byte file rewritten after every flush. Authoritative
//!   upper bound for readers.
//!
//! Readers use the volatile copy as a fast negative check and the durable copy
//! as the hard bound (see [`crate::storage::cache::CheckpointedCacheReader`]).

use crate::core::error::{VaultError, VaultResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Size of the durable checkpoint file in bytes.
pub const CHECKPOINT_SIZE: usize = 24;

/// Boundary positions of a local cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointVector {
    /// Bytes of the local cache file that are fully written.
    pub local_flushed: u64,
    /// Position in the origin log that the cache has copied up to.
    pub origin_cached: u64,
    /// Latest known end position of the origin log.
    pub origin_max: u64,
}

impl CheckpointVector {
    /// Create a new checkpoint vector.
    pub const fn new(local_flushed: u64, origin_cached: u64, origin_max: u64) -> Self {
        Self {
            local_flushed,
            origin_cached,
            origin_max,
        }
    }

    /// Serialize to the fixed on-disk layout (three little-endian u64).
    pub fn to_bytes(&self) -> [u8; CHECKPOINT_SIZE] {
        let mut buf = [0u8; CHECKPOINT_SIZE];
        buf[0..8].copy_from_slice(&self.local_flushed.to_le_bytes());
        buf[8..16].copy_from_slice(&self.origin_cached.to_le_bytes());
        buf[16..24].copy_from_slice(&self.origin_max.to_le_bytes());
        buf
    }

    /// Parse the fixed on-disk layout.
    pub fn from_bytes(buf: &[u8; CHECKPOINT_SIZE]) -> Self {
        let word = |i: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[i * 8..i * 8 + 8]);
            u64::from_le_bytes(bytes)
        };
        Self {
            local_flushed: word(0),
            origin_cached: word(1),
            origin_max: word(2),
        }
    }
}

/// Read access to the volatile checkpoint.
pub trait VolatileCheckpoint: Send + Sync {
    /// Read the current volatile vector without touching the disk.
    fn read_volatile(&self) -> CheckpointVector;
}

/// Volatile checkpoint shared between a cache writer and its readers.
#[derive(Debug, Default)]
pub struct SharedCheckpoint {
    local_flushed: AtomicU64,
    origin_cached: AtomicU64,
    origin_max: AtomicU64,
}

impl SharedCheckpoint {
    /// Create a volatile checkpoint seeded with `initial`.
    pub fn new(initial: CheckpointVector) -> Self {
        Self {
            local_flushed: AtomicU64::new(initial.local_flushed),
            origin_cached: AtomicU64::new(initial.origin_cached),
            origin_max: AtomicU64::new(initial.origin_max),
        }
    }

    /// Publish a new vector. `local_flushed` never moves backwards.
    pub fn publish(&self, vector: CheckpointVector) {
        self.origin_cached
            .store(vector.origin_cached, Ordering::Release);
        self.origin_max.store(vector.origin_max, Ordering::Release);
        self.local_flushed
            .fetch_max(vector.local_flushed, Ordering::AcqRel);
    }

}

impl VolatileCheckpoint for SharedCheckpoint {
    fn read_volatile(&self) -> CheckpointVector {
        CheckpointVector {
            local_flushed: self.local_flushed.load(Ordering::Acquire),
            origin_cached: self.origin_cached.load(Ordering::Acquire),
            origin_max: self.origin_max.load(Ordering::Acquire),
        }
    }
}

/// A volatile checkpoint frozen at one value.
#[derive(Debug, Clone, Copy)]
pub struct FixedCheckpoint(pub CheckpointVector);

impl VolatileCheckpoint for FixedCheckpoint {
    fn read_volatile(&self) -> CheckpointVector {
        self.0
    }
}

/// Reader for the durable checkpoint file.
#[derive(Debug)]
pub struct DurableCheckpointReader {
    file: Mutex<File>,
}

impl DurableCheckpointReader {
    /// Open an existing checkpoint file for reading.
    pub fn open(path: &Path) -> VaultResult<Self> {
        let file = File::open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Read the durable vector from disk.
    ///
    /// A file shorter than [`CHECKPOINT_SIZE`] has never been written and
    /// reads as the zero vector.
    pub fn read(&self) -> VaultResult<CheckpointVector> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; CHECKPOINT_SIZE];
        match file.read_exact(&mut buf) {
            Ok(()) => Ok(CheckpointVector::from_bytes(&buf)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(CheckpointVector::default()),
            Err(e) => Err(VaultError::Io(e)),
        }
    }
}

/// Writer for the durable checkpoint file.
#[derive(Debug)]
pub struct DurableCheckpointWriter {
    file: File,
}

impl DurableCheckpointWriter {
    /// Open the checkpoint file for writing, creating a zeroed one if absent.
    pub fn create(path: &Path) -> VaultResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() < CHECKPOINT_SIZE as u64 {
            file.set_len(CHECKPOINT_SIZE as u64)?;
        }
        Ok(Self { file })
    }

    /// Read back the vector currently on disk.
    pub fn read(&mut self) -> VaultResult<CheckpointVector> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; CHECKPOINT_SIZE];
        self.file.read_exact(&mut buf)?;
        Ok(CheckpointVector::from_bytes(&buf))
    }

    /// Overwrite the vector and sync it to disk.
    pub fn write(&mut self, vector: CheckpointVector) -> VaultResult<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&vector.to_bytes())?;
        self.file.sync_data()?;
        Ok(())
    }
}
