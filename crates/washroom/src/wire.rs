// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Length-prefixed binary framing.
//!
//! Every message - UDP datagram payloads and TCP request/response frames
//! alike - is a 4-byte big-endian length followed by exactly that many
//! bytes of bincode-serialized payload:
//!
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | bincode payload   |
//! +----------------+-------------------+
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::WireError;

/// Maximum payload size on either protocol. Larger frames are rejected.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Serialize `value` into a single framed buffer.
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let payload = bincode::serialize(value)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(payload.len()));
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode one complete framed datagram.
///
/// The length prefix must agree exactly with the datagram size; anything
/// else is a framing error, never a panic.
pub fn decode_frame<T: DeserializeOwned>(datagram: &[u8]) -> Result<T, WireError> {
    if datagram.len() < 4 {
        return Err(WireError::MissingPrefix);
    }

    let declared = u32::from_be_bytes([datagram[0], datagram[1], datagram[2], datagram[3]]) as usize;
    if declared == 0 {
        return Err(WireError::EmptyFrame);
    }
    if declared > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(declared));
    }

    let actual = datagram.len() - 4;
    if declared != actual {
        return Err(WireError::LengthMismatch { declared, actual });
    }

    Ok(bincode::deserialize(&datagram[4..4 + declared])?)
}

/// Read one framed message from a stream.
///
/// Returns `Ok(None)` when the peer closed the connection cleanly before a
/// length prefix.
pub async fn read_frame<T, R>(stream: &mut R) -> Result<Option<T>, WireError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(WireError::EmptyFrame);
    }
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;

    Ok(Some(bincode::deserialize(&payload)?))
}

/// Write one framed message to a stream and flush it.
pub async fn write_frame<T, W>(stream: &mut W, value: &T) -> Result<(), WireError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let buf = encode_frame(value)?;
    stream.write_all(&buf).await?;
    stream.flush().await?;
    Ok(())
}
