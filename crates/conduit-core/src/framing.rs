//! Wire framing: an 8-byte big-endian length prefix followed by the payload.
//!
//! The source this protocol is drawn from wrote a 32-bit length into an 8-byte
//! buffer and read back only the first four bytes, silently discarding the upper
//! half. This implementation uses the full 64-bit width on both ends and rejects
//! any declared length above [`DEFAULT_MAX_FRAME_SIZE`] before allocating or
//! reading a single payload byte.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

const LENGTH_PREFIX_SIZE: usize = 8;

/// Default ceiling on a single frame's payload size (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u64 = 16 * 1024 * 1024;

/// Read one length-prefixed frame, using `read_exact` throughout so a short
/// read on the underlying stream can never silently truncate a frame.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: u64) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut len_buf).await?;
    let len = u64::from_be_bytes(len_buf);

    if len > max_frame_size {
        return Err(Error::framing_owned(format!(
            "frame length {len} exceeds maximum {max_frame_size}"
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Write one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = payload.len() as u64;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
