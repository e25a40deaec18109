//! Frame codec.
//!
//! A frame is the bounded physical record of the log. A logical message is
//! compressed as a whole and split into a chain of frames; every frame of a
//! chain except the last carries [`FrameFlags::CONTINUATION`].
//!
//! # Wire format
//!
//! ```text
//! ┌────────┬──────────────┬───────┬──────────────┬─────────────┐
//! │ u8 len │ key (UTF-8)  │ flags │ u32 LE len   │ payload     │
//! └────────┴──────────────┴───────┴──────────────┴─────────────┘
//! ```
//!
//! Records are written back to back, so a file or buffer can be scanned
//! sequentially from any record boundary without an index.

use crate::core::error::{VaultError, VaultResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read};

/// Default maximum payload size of a single frame (64 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Largest payload length accepted when decoding. Anything above this is
/// treated as a corrupt header rather than an allocation request.
pub const FRAME_SIZE_LIMIT: usize = 4 * 1024 * 1024;

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = u8::MAX as usize;

/// zstd level used for message payloads.
pub const COMPRESSION_LEVEL: i32 = 3;

/// Bytes in a frame header besides the key: key length, flags, payload length.
const FIXED_HEADER_LEN: usize = 1 + 1 + 4;

bitflags::bitflags! {
    /// Per-frame flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FrameFlags: u8 {
        /// More frames of the same logical message follow.
        const CONTINUATION = 0b0000_0001;
        /// The chain payload is zstd compressed.
        const COMPRESSED = 0b0000_0010;
    }
}

/// A single physical record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message key shared by every frame of a chain.
    pub key: String,
    /// Frame flags.
    pub flags: FrameFlags,
    /// Chunk of the (compressed) message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(key: impl Into<String>, flags: FrameFlags, payload: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            flags,
            payload: payload.into(),
        }
    }

    /// Check if more frames of the same message follow this one.
    pub fn is_continuation(&self) -> bool {
        self.flags.contains(FrameFlags::CONTINUATION)
    }

    /// Check if the chain payload is compressed.
    pub fn is_compressed(&self) -> bool {
        self.flags.contains(FrameFlags::COMPRESSED)
    }

    /// Size of this frame once written in the wire format.
    pub fn encoded_len(&self) -> usize {
        FIXED_HEADER_LEN + self.key.len() + self.payload.len()
    }
}

/// An application-level message before encoding or after reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalMessage {
    /// Message key.
    pub key: String,
    /// Uncompressed message bytes.
    pub value: Bytes,
}

impl LogicalMessage {
    /// Create a new logical message.
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Outcome of decoding one frame from a byte source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStep {
    /// A full frame was decoded, occupying `len` bytes.
    Complete { frame: Frame, len: usize },
    /// The source ends inside (or right before) a frame. More bytes may
    /// arrive once the writer flushes.
    NotYetAvailable,
    /// The header is structurally invalid.
    Corrupt(String),
}

/// Encoder/decoder for frames and frame chains.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl FrameCodec {
    /// Create a codec producing frames of at most `max_frame_size` payload bytes.
    pub fn new(max_frame_size: usize) -> VaultResult<Self> {
        if max_frame_size == 0 || max_frame_size > FRAME_SIZE_LIMIT {
            return Err(VaultError::InvalidMessage {
                message: format!(
                    "max frame size must be within 1..={}, got {}",
                    FRAME_SIZE_LIMIT, max_frame_size
                ),
            });
        }
        Ok(Self { max_frame_size })
    }

    /// Get the configured maximum frame payload size.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Compress a logical message and split it into a frame chain.
    pub fn encode(&self, message: &LogicalMessage) -> VaultResult<Vec<Frame>> {
        validate_key(&message.key)?;

        let compressed = zstd::stream::encode_all(&message.value[..], COMPRESSION_LEVEL)
            .map_err(VaultError::Compression)?;
        let compressed = Bytes::from(compressed);

        let mut frames = Vec::with_capacity(compressed.len().div_ceil(self.max_frame_size).max(1));
        let mut offset = 0;
        loop {
            let remaining = compressed.len() - offset;
            let pick = remaining.min(self.max_frame_size);
            let has_more = remaining > pick;

            let mut flags = FrameFlags::COMPRESSED;
            if has_more {
                flags |= FrameFlags::CONTINUATION;
            }

            frames.push(Frame::new(
                message.key.clone(),
                flags,
                compressed.slice(offset..offset + pick),
            ));
            offset += pick;

            if !has_more {
                break;
            }
        }

        Ok(frames)
    }

    /// Reassemble a complete frame chain into the original message.
    ///
    /// The chain must share one key and end with the first frame that has no
    /// continuation flag. Unterminated chains are rejected without touching
    /// the decompressor.
    pub fn decode(frames: &[Frame]) -> VaultResult<LogicalMessage> {
        let first = frames.first().ok_or_else(|| VaultError::InvalidMessage {
            message: "empty frame chain".to_string(),
        })?;

        let last_index = frames.len() - 1;
        let mut total = 0;
        for (i, frame) in frames.iter().enumerate() {
            if frame.key != first.key {
                return Err(VaultError::BrokenChain {
                    expected: first.key.clone(),
                    found: frame.key.clone(),
                });
            }
            if frame.is_compressed() != first.is_compressed() {
                return Err(VaultError::InvalidMessage {
                    message: format!(
                        "frame {} of {} disagrees with the chain's compression flag",
                        i + 1,
                        frames.len()
                    ),
                });
            }
            if i < last_index && !frame.is_continuation() {
                return Err(VaultError::InvalidMessage {
                    message: format!("chain terminated at frame {} of {}", i + 1, frames.len()),
                });
            }
            total += frame.payload.len();
        }

        if frames[last_index].is_continuation() {
            return Err(VaultError::IncompleteChain {
                key: first.key.clone(),
                frames: frames.len(),
            });
        }

        let value = if frames.len() == 1 {
            frames[0].payload.clone()
        } else {
            let mut joined = BytesMut::with_capacity(total);
            for frame in frames {
                joined.extend_from_slice(&frame.payload);
            }
            joined.freeze()
        };

        let value = if first.is_compressed() {
            Bytes::from(zstd::stream::decode_all(&value[..]).map_err(VaultError::Compression)?)
        } else {
            value
        };

        Ok(LogicalMessage {
            key: first.key.clone(),
            value,
        })
    }
}

fn validate_key(key: &str) -> VaultResult<()> {
    if key.len() > MAX_KEY_LEN {
        return Err(VaultError::InvalidMessage {
            message: format!("key is {} bytes, limit is {}", key.len(), MAX_KEY_LEN),
        });
    }
    Ok(())
}

/// Append a frame in wire format to `buf`.
pub fn write_frame(frame: &Frame, buf: &mut BytesMut) -> VaultResult<()> {
    validate_key(&frame.key)?;
    if frame.payload.len() > FRAME_SIZE_LIMIT {
        return Err(VaultError::InvalidMessage {
            message: format!(
                "frame payload is {} bytes, limit is {}",
                frame.payload.len(),
                FRAME_SIZE_LIMIT
            ),
        });
    }

    buf.reserve(frame.encoded_len());
    buf.put_u8(frame.key.len() as u8);
    buf.put_slice(frame.key.as_bytes());
    buf.put_u8(frame.flags.bits());
    buf.put_u32_le(frame.payload.len() as u32);
    buf.put_slice(&frame.payload);
    Ok(())
}

/// Decode one frame from the start of `data`.
pub fn decode_frame(data: &[u8]) -> DecodeStep {
    let mut cursor = data;

    if cursor.remaining() < 1 {
        return DecodeStep::NotYetAvailable;
    }
    let key_len = cursor.get_u8() as usize;
    if cursor.remaining() < key_len + 1 + 4 {
        return DecodeStep::NotYetAvailable;
    }
    let key = match std::str::from_utf8(&cursor[..key_len]) {
        Ok(key) => key.to_string(),
        Err(_) => return DecodeStep::Corrupt("frame key is not valid UTF-8".to_string()),
    };
    cursor.advance(key_len);

    let flags = match parse_flags(cursor.get_u8()) {
        Ok(flags) => flags,
        Err(reason) => return DecodeStep::Corrupt(reason),
    };
    let payload_len = cursor.get_u32_le() as usize;
    if payload_len > FRAME_SIZE_LIMIT {
        return DecodeStep::Corrupt(format!("payload length {} exceeds limit", payload_len));
    }
    if cursor.remaining() < payload_len {
        return DecodeStep::NotYetAvailable;
    }

    let payload = Bytes::copy_from_slice(&cursor[..payload_len]);
    DecodeStep::Complete {
        len: FIXED_HEADER_LEN + key_len + payload_len,
        frame: Frame { key, flags, payload },
    }
}

/// Decode one frame from a sequential reader.
///
/// A short read anywhere inside the record yields
/// [`DecodeStep::NotYetAvailable`]; the reader is then positioned somewhere
/// inside the partial record and must be re-seeked by the caller.
pub fn read_frame<R: Read>(reader: &mut R) -> std::io::Result<DecodeStep> {
    let mut byte = [0u8; 1];
    if !read_full(reader, &mut byte)? {
        return Ok(DecodeStep::NotYetAvailable);
    }
    let key_len = byte[0] as usize;

    let mut key = vec![0u8; key_len];
    if !read_full(reader, &mut key)? {
        return Ok(DecodeStep::NotYetAvailable);
    }
    let key = match String::from_utf8(key) {
        Ok(key) => key,
        Err(_) => return Ok(DecodeStep::Corrupt("frame key is not valid UTF-8".to_string())),
    };

    if !read_full(reader, &mut byte)? {
        return Ok(DecodeStep::NotYetAvailable);
    }
    let flags = match parse_flags(byte[0]) {
        Ok(flags) => flags,
        Err(reason) => return Ok(DecodeStep::Corrupt(reason)),
    };

    let mut len_buf = [0u8; 4];
    if !read_full(reader, &mut len_buf)? {
        return Ok(DecodeStep::NotYetAvailable);
    }
    let payload_len = u32::from_le_bytes(len_buf) as usize;
    if payload_len > FRAME_SIZE_LIMIT {
        return Ok(DecodeStep::Corrupt(format!(
            "payload length {} exceeds limit",
            payload_len
        )));
    }

    let mut payload = vec![0u8; payload_len];
    if !read_full(reader, &mut payload)? {
        return Ok(DecodeStep::NotYetAvailable);
    }

    Ok(DecodeStep::Complete {
        len: FIXED_HEADER_LEN + key_len + payload_len,
        frame: Frame {
            key,
            flags,
            payload: Bytes::from(payload),
        },
    })
}

fn parse_flags(raw: u8) -> Result<FrameFlags, String> {
    FrameFlags::from_bits(raw).ok_or_else(|| format!("unknown frame flags 0x{:02x}", raw))
}

/// Fill `buf` completely. Returns false if the source ended first.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Incremental chain reassembly for frames arriving one at a time.
#[derive(Debug, Default)]
pub struct ChainAssembler {
    frames: Vec<Frame>,
}

impl ChainAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the next frame. Returns the logical message once the chain is
    /// terminated; the assembler is empty again afterwards.
    pub fn push(&mut self, frame: Frame) -> VaultResult<Option<LogicalMessage>> {
        if let Some(first) = self.frames.first() {
            if first.key != frame.key {
                let expected = first.key.clone();
                self.frames.clear();
                return Err(VaultError::BrokenChain {
                    expected,
                    found: frame.key,
                });
            }
        }

        let terminated = !frame.is_continuation();
        self.frames.push(frame);
        if !terminated {
            return Ok(None);
        }

        let result = FrameCodec::decode(&self.frames);
        self.frames.clear();
        result.map(Some)
    }

    /// Number of frames waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.frames.len()
    }

    /// Drop any partial chain.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(frame: &Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        write_frame(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_wire_layout() {
        let frame = Frame::new("ab", FrameFlags::COMPRESSED, &b"xyz"[..]);
        let buf = encoded(&frame);
        assert_eq!(&buf[..], &[2, b'a', b'b', 0b10, 3, 0, 0, 0, b'x', b'y', b'z']);
        assert_eq!(buf.len(), frame.encoded_len());
    }

    #[test]
    fn test_decode_frame_complete() {
        let frame = Frame::new("k", FrameFlags::CONTINUATION, &b"payload"[..]);
        let buf = encoded(&frame);
        match decode_frame(&buf) {
            DecodeStep::Complete { frame: decoded, len } => {
                assert_eq!(decoded, frame);
                assert_eq!(len, buf.len());
            }
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn test_decode_frame_partial_is_not_an_error() {
        let frame = Frame::new("key", FrameFlags::empty(), &b"0123456789"[..]);
        let buf = encoded(&frame);
        for cut in 0..buf.len() {
            assert_eq!(decode_frame(&buf[..cut]), DecodeStep::NotYetAvailable, "cut {}", cut);
        }
    }

    #[test]
    fn test_decode_frame_unknown_flags() {
        let mut buf = encoded(&Frame::new("k", FrameFlags::empty(), &b"v"[..]));
        buf[2] = 0x80;
        assert!(matches!(decode_frame(&buf), DecodeStep::Corrupt(_)));
    }

    #[test]
    fn test_decode_frame_oversized_length() {
        let mut buf = BytesMut::new();
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u32_le(u32::MAX);
        assert!(matches!(decode_frame(&buf), DecodeStep::Corrupt(_)));
    }

    #[test]
    fn test_read_frame_matches_decode_frame() {
        let frame = Frame::new("stream", FrameFlags::COMPRESSED, vec![7u8; 300]);
        let buf = encoded(&frame);

        let mut reader = &buf[..];
        assert_eq!(read_frame(&mut reader).unwrap(), decode_frame(&buf));

        let mut short = &buf[..buf.len() - 1];
        assert_eq!(read_frame(&mut short).unwrap(), DecodeStep::NotYetAvailable);
    }

    #[test]
    fn test_codec_rejects_zero_frame_size() {
        assert!(FrameCodec::new(0).is_err());
        assert!(FrameCodec::new(FRAME_SIZE_LIMIT + 1).is_err());
        assert!(FrameCodec::new(1).is_ok());
    }

    #[test]
    fn test_decode_rejects_unterminated_chain() {
        let codec = FrameCodec::new(8).unwrap();
        let frames = codec
            .encode(&LogicalMessage::new("k", vec![1u8; 64]))
            .unwrap();
        assert!(frames.len() > 1);

        let err = FrameCodec::decode(&frames[..frames.len() - 1]).unwrap_err();
        assert!(matches!(err, VaultError::IncompleteChain { .. }));
    }

    #[test]
    fn test_assembler_rejects_key_switch() {
        let mut assembler = ChainAssembler::new();
        assert!(assembler
            .push(Frame::new("a", FrameFlags::CONTINUATION, &b"x"[..]))
            .unwrap()
            .is_none());
        let err = assembler
            .push(Frame::new("b", FrameFlags::empty(), &b"y"[..]))
            .unwrap_err();
        assert!(matches!(err, VaultError::BrokenChain { .. }));
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_decode_rejects_mixed_compression() {
        let frames = vec![
            Frame::new("k", FrameFlags::CONTINUATION | FrameFlags::COMPRESSED, &b"ab"[..]),
            Frame::new("k", FrameFlags::empty(), &b"cd"[..]),
        ];
        let err = FrameCodec::decode(&frames).unwrap_err();
        assert!(matches!(err, VaultError::InvalidMessage { .. }));

        let mut assembler = ChainAssembler::new();
        assert!(assembler.push(frames[0].clone()).unwrap().is_none());
        assert!(assembler.push(frames[1].clone()).is_err());
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_uncompressed_single_frame() {
        let frame = Frame::new("raw", FrameFlags::empty(), &b"plain"[..]);
        let message = FrameCodec::decode(&[frame]).unwrap();
        assert_eq!(&message.value[..], b"plain");
    }
}
