//! Checkpointed local cache of a stream.
//!
//! Each stream cached on a node has two files under `folder/stream/`:
//!
//! - `cache.dat`: frames appended back to back in the wire format of
//!   [`crate::storage::frame`].
//! - `cache.chk`: the durable [`CheckpointVector`].
//!
//! The [`CacheWriter`] is the only writer. Any number of
//! [`CheckpointedCacheReader`]s read concurrently without locking against it;
//! they are bounded by the checkpoint instead.
//!
//! # Recovery
//!
//! Opening a writer reconciles the three views of the cache: the data file is
//! truncated to the durable position (a torn tail from a crash is discarded)
//! and the volatile checkpoint is seeded from the durable one, so the volatile
//! copy is never behind the durable copy for a live writer.

use crate::core::error::{VaultError, VaultResult};
use crate::storage::checkpoint::{
    CheckpointVector, DurableCheckpointReader, DurableCheckpointWriter, FixedCheckpoint,
    SharedCheckpoint, VolatileCheckpoint,
};
use crate::storage::frame::{read_frame, write_frame, DecodeStep, Frame};
use bytes::BytesMut;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name of the frame file inside a stream's cache folder.
pub const CACHE_STREAM_NAME: &str = "cache.dat";

/// File name of the durable checkpoint inside a stream's cache folder.
pub const CACHE_POSITION_NAME: &str = "cache.chk";

/// Paths of the frame file and checkpoint file for `stream` under `folder`.
pub fn cache_paths(folder: &Path, stream: &str) -> (PathBuf, PathBuf) {
    let dir = folder.join(stream);
    (dir.join(CACHE_STREAM_NAME), dir.join(CACHE_POSITION_NAME))
}

/// Statistics of one `read_all` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadResult {
    /// Position the read started from.
    pub starting_cache_position: u64,
    /// Position right after the last fully decoded record.
    pub current_cache_position: u64,
    /// Flushed position reported by the volatile checkpoint.
    pub available_cache_position: u64,
    /// Number of records handed to the handler.
    pub read_records: usize,
    /// The read stopped at a record the writer had not finished flushing.
    pub read_end_of_cache_before_it_was_flushed: bool,
    /// Origin position the cache has copied up to.
    pub cached_origin_position: u64,
    /// Latest known end of the origin log.
    pub max_origin_position: u64,
}

/// A record returned by [`CheckpointedCacheReader::read_all_bulk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFrame {
    /// The decoded frame.
    pub frame: Frame,
    /// Cache position the frame starts at.
    pub current_cache_position: u64,
    /// Bound the read was clamped to.
    pub max_cache_position: u64,
}

/// Result of a bulk read: statistics plus collected records.
#[derive(Debug, Clone, Default)]
pub struct ReadBulkResult {
    /// Read statistics.
    pub stats: ReadResult,
    /// Records in cache order.
    pub records: Vec<CachedFrame>,
}

/// Sequential reader over a local cache, bounded by the two-level checkpoint.
pub struct CheckpointedCacheReader {
    volatile: Arc<dyn VolatileCheckpoint>,
    durable: DurableCheckpointReader,
    file: File,
}

impl CheckpointedCacheReader {
    /// Create a reader from its parts.
    pub fn new(
        volatile: Arc<dyn VolatileCheckpoint>,
        file: File,
        durable: DurableCheckpointReader,
    ) -> Self {
        Self {
            volatile,
            durable,
            file,
        }
    }

    /// Open the cache of `stream` under `folder` without a live writer.
    ///
    /// The durable checkpoint is read once and used as a fixed volatile
    /// checkpoint for the lifetime of the reader.
    pub fn open_standalone(folder: &Path, stream: &str) -> VaultResult<Self> {
        let (data_path, checkpoint_path) = cache_paths(folder, stream);
        let durable = DurableCheckpointReader::open(&checkpoint_path)?;
        let vector = durable.read()?;
        let file = File::open(&data_path)?;
        Ok(Self::new(Arc::new(FixedCheckpoint(vector)), file, durable))
    }

    /// Read the durable checkpoint directly.
    pub fn durable_checkpoint(&self) -> VaultResult<CheckpointVector> {
        self.durable.read()
    }

    /// Read up to `max_count` records starting at `start`.
    ///
    /// `handler` receives each record with its start position and the bound
    /// the read is clamped to. Reaching a partially written record is not an
    /// error; it is reported through
    /// [`ReadResult::read_end_of_cache_before_it_was_flushed`]. A malformed
    /// header fails the read with its byte offset.
    pub fn read_all<F>(&mut self, start: u64, max_count: usize, mut handler: F) -> VaultResult<ReadResult>
    where
        F: FnMut(&Frame, u64, u64),
    {
        let fast = self.volatile.read_volatile();
        let mut result = ReadResult {
            starting_cache_position: start,
            current_cache_position: start,
            available_cache_position: fast.local_flushed,
            cached_origin_position: fast.origin_cached,
            max_origin_position: fast.origin_max,
            ..ReadResult::default()
        };
        if start >= fast.local_flushed {
            return Ok(result);
        }

        // the volatile value may be ahead of what reached the disk
        let durable = self.durable.read()?;
        result.cached_origin_position = durable.origin_cached;
        result.max_origin_position = durable.origin_max;
        if durable.local_flushed > fast.local_flushed {
            tracing::debug!(
                volatile = fast.local_flushed,
                durable = durable.local_flushed,
                "volatile checkpoint behind durable checkpoint"
            );
        }

        let bound = durable.local_flushed.min(fast.local_flushed);
        if start >= bound {
            return Ok(result);
        }

        self.file.seek(SeekFrom::Start(start))?;
        let mut reader = BufReader::new((&mut self.file).take(bound - start));
        let mut position = start;

        for _ in 0..max_count {
            if position >= bound {
                break;
            }
            match read_frame(&mut reader)? {
                DecodeStep::Complete { frame, len } => {
                    handler(&frame, position, bound);
                    position += len as u64;
                    result.read_records += 1;
                    result.current_cache_position = position;
                }
                DecodeStep::NotYetAvailable => {
                    result.read_end_of_cache_before_it_was_flushed = true;
                    break;
                }
                DecodeStep::Corrupt(reason) => {
                    return Err(VaultError::corrupt(position, reason));
                }
            }
        }

        Ok(result)
    }

    /// Read up to `max_count` records and collect them.
    pub fn read_all_bulk(&mut self, start: u64, max_count: usize) -> VaultResult<ReadBulkResult> {
        let mut records = Vec::new();
        let stats = self.read_all(start, max_count, |frame, position, max_position| {
            records.push(CachedFrame {
                frame: frame.clone(),
                current_cache_position: position,
                max_cache_position: max_position,
            });
        })?;
        Ok(ReadBulkResult { stats, records })
    }
}

/// Single writer of a stream's local cache.
pub struct CacheWriter {
    data_path: PathBuf,
    checkpoint_path: PathBuf,
    data: File,
    checkpoint: DurableCheckpointWriter,
    volatile: Arc<SharedCheckpoint>,
    position: u64,
}

impl CacheWriter {
    /// Open (or create) the cache of `stream` under `folder`.
    pub fn open(folder: &Path, stream: &str) -> VaultResult<Self> {
        let (data_path, checkpoint_path) = cache_paths(folder, stream);
        if let Some(dir) = data_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let mut checkpoint = DurableCheckpointWriter::create(&checkpoint_path)?;
        let durable = checkpoint.read()?;

        let data = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&data_path)?;
        let len = data.metadata()?.len();

        if len < durable.local_flushed {
            return Err(VaultError::corrupt(
                len,
                format!(
                    "cache file is {} bytes but durable checkpoint claims {}",
                    len, durable.local_flushed
                ),
            ));
        }
        if len > durable.local_flushed {
            tracing::warn!(
                stream = %stream,
                file_len = len,
                durable = durable.local_flushed,
                "discarding unflushed cache tail"
            );
            data.set_len(durable.local_flushed)?;
        }

        tracing::debug!(
            stream = %stream,
            position = durable.local_flushed,
            "cache writer opened"
        );

        Ok(Self {
            data_path,
            checkpoint_path,
            data,
            checkpoint,
            volatile: Arc::new(SharedCheckpoint::new(durable)),
            position: durable.local_flushed,
        })
    }

    /// Current end of the cache file.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The volatile checkpoint readers should share.
    pub fn volatile(&self) -> Arc<SharedCheckpoint> {
        Arc::clone(&self.volatile)
    }

    /// Path of the frame file.
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Append frames copied from the origin log and advance both checkpoints.
    ///
    /// Data is synced first, then the volatile checkpoint moves, then the
    /// durable one. A reader can therefore see the volatile value ahead of the
    /// durable one but never ahead of the data.
    pub fn append(
        &mut self,
        frames: &[Frame],
        origin_cached: u64,
        origin_max: u64,
    ) -> VaultResult<CheckpointVector> {
        let mut buf = BytesMut::new();
        for frame in frames {
            write_frame(frame, &mut buf)?;
        }

        self.data.seek(SeekFrom::Start(self.position))?;
        self.data.write_all(&buf)?;
        self.data.sync_data()?;
        self.position += buf.len() as u64;

        let vector = CheckpointVector::new(self.position, origin_cached, origin_max);
        self.volatile.publish(vector);
        self.checkpoint.write(vector)?;
        Ok(vector)
    }

    /// Open a reader sharing this writer's volatile checkpoint.
    pub fn reader(&self) -> VaultResult<CheckpointedCacheReader> {
        let durable = DurableCheckpointReader::open(&self.checkpoint_path)?;
        let file = File::open(&self.data_path)?;
        let volatile: Arc<dyn VolatileCheckpoint> = self.volatile.clone();
        Ok(CheckpointedCacheReader::new(volatile, file, durable))
    }
}
