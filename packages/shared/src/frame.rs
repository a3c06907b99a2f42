//! Length-prefixed framing.
//!
//! ```text
//! [u64 LE length] [payload: length bytes]
//! ```
//!
//! The payload is opaque to this module. Reads and writes loop until the full
//! byte count has been transferred; a stream that ends early is an error, never
//! a short frame.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 8;

/// Default upper bound for a single payload (1 MiB).
pub const DEFAULT_MAX_FRAME_LEN: u64 = 1024 * 1024;

/// Prepend the little-endian length of `payload` to `payload`.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Read one frame and return its payload verbatim.
///
/// # Errors
///
/// * [`FrameError::Closed`] - the stream ended before the first prefix byte
/// * [`FrameError::Truncated`] - the stream ended inside the prefix or payload
/// * [`FrameError::TooLarge`] - the declared length is above `max_len`
/// * [`FrameError::Io`] - any other transport failure
pub async fn read_frame<R>(reader: &mut R, max_len: u64) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    let received = read_full(reader, &mut prefix).await?;
    if received == 0 {
        return Err(FrameError::Closed);
    }
    if received < LENGTH_PREFIX_LEN {
        return Err(FrameError::Truncated {
            expected: LENGTH_PREFIX_LEN as u64,
            received: received as u64,
        });
    }

    let len = u64::from_le_bytes(prefix);
    if len > max_len {
        return Err(FrameError::TooLarge { len, max: max_len });
    }
    let size = usize::try_from(len).map_err(|_| FrameError::TooLarge { len, max: max_len })?;

    let mut payload = vec![0u8; size];
    let received = read_full(reader, &mut payload).await?;
    if received < size {
        return Err(FrameError::Truncated {
            expected: len,
            received: received as u64,
        });
    }

    Ok(payload)
}

/// Write `payload` as one frame and flush.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode(payload)).await?;
    writer.flush().await?;
    Ok(())
}

/// Fill `buf` from `reader`, returning how many bytes arrived before EOF.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
