//! Shared leader location record.
//!
//! A fixed 512-byte record naming the endpoint of the current leader. The
//! endpoint is stored as a 7-bit varint length prefix followed by UTF-8 bytes
//! and zero padding. A record of all zeros decodes as "no leader published".

use crate::core::error::{VaultError, VaultResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Size of the location record in bytes.
pub const LOCATION_RECORD_SIZE: usize = 512;

/// Encode `endpoint` into a full location record.
pub fn encode_location(endpoint: &str) -> VaultResult<Vec<u8>> {
    let bytes = endpoint.as_bytes();
    let mut record = Vec::with_capacity(LOCATION_RECORD_SIZE);

    let mut len = bytes.len();
    loop {
        let mut byte = (len & 0x7f) as u8;
        len >>= 7;
        if len != 0 {
            byte |= 0x80;
        }
        record.push(byte);
        if len == 0 {
            break;
        }
    }

    if record.len() + bytes.len() > LOCATION_RECORD_SIZE {
        return Err(VaultError::location(format!(
            "endpoint of {} bytes does not fit a {}-byte record",
            bytes.len(),
            LOCATION_RECORD_SIZE
        )));
    }
    record.extend_from_slice(bytes);
    record.resize(LOCATION_RECORD_SIZE, 0);
    Ok(record)
}

/// Decode a location record. `None` means nothing was published yet.
pub fn decode_location(record: &[u8]) -> VaultResult<Option<String>> {
    let mut len = 0usize;
    let mut shift = 0;
    let mut header = 0;
    loop {
        let byte = *record
            .get(header)
            .ok_or_else(|| VaultError::location("truncated length prefix"))?;
        header += 1;
        len |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 28 {
            return Err(VaultError::location("length prefix too long"));
        }
    }

    if len == 0 {
        return Ok(None);
    }
    let body = record
        .get(header..header + len)
        .ok_or_else(|| VaultError::location(format!("endpoint length {} exceeds record", len)))?;
    let endpoint = std::str::from_utf8(body)
        .map_err(|e| VaultError::location(format!("endpoint is not UTF-8: {}", e)))?;
    Ok(Some(endpoint.to_string()))
}

/// Storage of the shared location record.
#[async_trait]
pub trait LocationRecord: Send + Sync {
    /// Overwrite the record with `endpoint`, creating it if absent.
    async fn publish(&self, endpoint: &str) -> VaultResult<()>;

    /// Endpoint of the last published leader.
    async fn read(&self) -> VaultResult<Option<String>>;
}

/// Location record kept in a file shared by all nodes.
#[derive(Debug, Clone)]
pub struct FileLocationRecord {
    path: PathBuf,
}

impl FileLocationRecord {
    /// Use the record at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the record.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LocationRecord for FileLocationRecord {
    async fn publish(&self, endpoint: &str) -> VaultResult<()> {
        let record = encode_location(endpoint)?;
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        // replace in one rename so readers never see a half-written record
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, &record).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        tracing::debug!(path = %self.path.display(), endpoint = %endpoint, "location published");
        Ok(())
    }

    async fn read(&self) -> VaultResult<Option<String>> {
        match tokio::fs::read(&self.path).await {
            Ok(record) => decode_location(&record),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::Io(e)),
        }
    }
}

/// Location record held in memory, for single-process setups.
#[derive(Debug, Default)]
pub struct InMemoryLocationRecord {
    record: RwLock<Option<Vec<u8>>>,
}

impl InMemoryLocationRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocationRecord for InMemoryLocationRecord {
    async fn publish(&self, endpoint: &str) -> VaultResult<()> {
        let record = encode_location(endpoint)?;
        *self.record.write() = Some(record);
        Ok(())
    }

    async fn read(&self) -> VaultResult<Option<String>> {
        match self.record.read().as_deref() {
            Some(record) => decode_location(record),
            None => Ok(None),
        }
    }
}
