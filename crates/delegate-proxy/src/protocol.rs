//! Wire protocol for delegated routing
//!
//! Defines the protocol identifier and the delimited framing used on every
//! routing stream.
//!
//! ## Wire Format
//!
//! ```text
//! [len:varint][payload:len]
//! ```
//!
//! - **len**: Payload length, unsigned LEB128 (1-10 bytes)
//! - **payload**: postcard-serialized message
//!
//! Readers enforce a maximum frame size and reject anything larger before
//! reading the body.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol identifier for routing streams
pub const PROTOCOL_ID: &str = "/delegate/routing/1.0.0";

/// Default maximum frame payload size (8 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Longest valid encoding of a u64 varint
pub const MAX_VARINT_LEN: usize = 10;

/// Errors that can occur during message framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: u64, max: usize },

    #[error("Invalid varint length prefix")]
    InvalidVarint,

    #[error("Stream ended before a frame started")]
    Empty,

    #[error("Stream ended inside a frame")]
    Truncated,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Append `value` as an unsigned LEB128 varint
pub fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Number of bytes `value` takes as a varint
pub fn varint_len(value: u64) -> usize {
    if value == 0 {
        1
    } else {
        (64 - value.leading_zeros() as usize).div_ceil(7)
    }
}

/// Decode a varint from the front of `data`
///
/// Returns the value and the number of bytes consumed.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize), FramingError> {
    let mut decoder = VarintDecoder::default();
    for (i, &b) in data.iter().enumerate() {
        if let Some(value) = decoder.push(b)? {
            return Ok((value, i + 1));
        }
    }
    if data.is_empty() {
        Err(FramingError::Empty)
    } else {
        Err(FramingError::Truncated)
    }
}

/// Incremental varint decoder with overflow checking
#[derive(Debug, Default)]
struct VarintDecoder {
    result: u64,
    shift: u32,
}

impl VarintDecoder {
    /// Feed one byte; returns the value once the last byte arrives
    fn push(&mut self, b: u8) -> Result<Option<u64>, FramingError> {
        if self.shift >= 64 {
            return Err(FramingError::InvalidVarint);
        }

        // For the last valid byte (shift=63), only bit 0 can be set
        let value = (b & 0x7F) as u64;
        if self.shift == 63 && value > 1 {
            return Err(FramingError::InvalidVarint);
        }

        self.result |= value << self.shift;

        if b & 0x80 == 0 {
            return Ok(Some(self.result));
        }
        self.shift += 7;
        Ok(None)
    }
}

/// Prefix `payload` with its length
pub fn frame(payload: &[u8], max: usize) -> Result<Vec<u8>, FramingError> {
    if payload.len() > max {
        return Err(FramingError::MessageTooLarge {
            size: payload.len() as u64,
            max,
        });
    }

    let mut framed = Vec::with_capacity(varint_len(payload.len() as u64) + payload.len());
    encode_varint(&mut framed, payload.len() as u64);
    framed.extend_from_slice(payload);
    Ok(framed)
}

/// Serialize and frame a message
pub fn encode_message<M: Serialize>(msg: &M, max: usize) -> Result<Vec<u8>, FramingError> {
    let serialized =
        postcard::to_allocvec(msg).map_err(|e| FramingError::Serialization(e.to_string()))?;
    frame(&serialized, max)
}

/// Deserialize a frame payload
pub fn decode_message<M: DeserializeOwned>(payload: &[u8]) -> Result<M, FramingError> {
    postcard::from_bytes(payload).map_err(|e| FramingError::Deserialization(e.to_string()))
}

/// Read a length prefix; `None` if the stream ended before its first byte
async fn read_varint<R>(reader: &mut R) -> Result<Option<u64>, FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = VarintDecoder::default();
    let mut first = true;
    loop {
        let mut byte = [0u8; 1];
        if reader.read(&mut byte).await? == 0 {
            return if first {
                Ok(None)
            } else {
                Err(FramingError::Truncated)
            };
        }
        first = false;
        if let Some(value) = decoder.push(byte[0])? {
            return Ok(Some(value));
        }
    }
}

/// Write an already framed buffer and flush it
pub async fn write_framed<W>(writer: &mut W, framed: &[u8]) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(framed).await?;
    writer.flush().await?;
    Ok(())
}

/// Frame and write a payload
pub async fn write_delimited<W>(writer: &mut W, payload: &[u8], max: usize) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
{
    let framed = frame(payload, max)?;
    write_framed(writer, &framed).await
}

/// Read one frame and return its payload
///
/// Frames announcing more than `max` bytes are rejected before the body
/// is read.
pub async fn read_delimited<R>(reader: &mut R, max: usize) -> Result<Vec<u8>, FramingError>
where
    R: AsyncRead + Unpin,
{
    let len = read_varint(reader).await?.ok_or(FramingError::Empty)?;
    if len > max as u64 {
        return Err(FramingError::MessageTooLarge { size: len, max });
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FramingError::Truncated
        } else {
            FramingError::Io(e)
        }
    })?;
    Ok(payload)
}

/// Read one frame and deserialize it
pub async fn read_message<R, M>(reader: &mut R, max: usize) -> Result<M, FramingError>
where
    R: AsyncRead + Unpin,
    M: DeserializeOwned,
{
    let payload = read_delimited(reader, max).await?;
    decode_message(&payload)
}
