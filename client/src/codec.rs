//! Length-prefixed framing for the daemon control protocol.
//!
//! Every message on a control connection is a frame: an unsigned LEB128 varint holding the payload length,
//! followed by exactly that many payload bytes. The varint always uses the smallest encoding.
//!
//! Readers enforce a maximum frame size. A prefix announcing more than the maximum is rejected before any buffer
//! is allocated, so a corrupt or malicious peer cannot make us reserve arbitrary amounts of memory.

use crate::errors::FrameError;
use futures::Stream;
use prost::encoding::{decode_varint, encode_varint, encoded_len_varint};
use tokio::io::{AsyncRead, AsyncReadExt};

/// The default maximum payload size of a single frame (4 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// A u64 varint never needs more than 10 bytes.
const MAX_PREFIX_LEN: usize = 10;

/// Prefix `payload` with its varint-encoded length.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u64;
    let mut frame = Vec::with_capacity(encoded_len_varint(len) + payload.len());
    encode_varint(len, &mut frame);
    frame.extend_from_slice(payload);
    frame
}

/// Read a single frame from `io`.
///
/// Returns `Ok(None)` if the stream ends cleanly before the first prefix byte. A stream that ends anywhere inside
/// a frame yields [`FrameError::Truncated`].
pub async fn read_frame<R>(io: &mut R, max_frame_size: usize) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let Some(len) = read_length_prefix(io).await? else {
        return Ok(None);
    };
    if len > max_frame_size as u64 {
        return Err(FrameError::TooLarge { len, max: max_frame_size });
    }
    let len = usize::try_from(len).map_err(|_| FrameError::TooLarge { len, max: max_frame_size })?;
    let mut payload = vec![0u8; len];
    io.read_exact(&mut payload).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => FrameError::Truncated,
        _ => FrameError::Io(e),
    })?;
    Ok(Some(payload))
}

/// Lazily decode frames from `io` until the stream ends.
///
/// The sequence stops after the first error.
pub fn decode_frames<R>(io: R, max_frame_size: usize) -> impl Stream<Item = Result<Vec<u8>, FrameError>>
where
    R: AsyncRead + Unpin,
{
    futures::stream::try_unfold(io, move |mut io| async move {
        let frame = read_frame(&mut io, max_frame_size).await?;
        Ok(frame.map(|payload| (payload, io)))
    })
}

async fn read_length_prefix<R>(io: &mut R) -> Result<Option<u64>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; MAX_PREFIX_LEN];
    for i in 0..MAX_PREFIX_LEN {
        let n = io.read(&mut prefix[i..=i]).await?;
        if n == 0 {
            return if i == 0 { Ok(None) } else { Err(FrameError::Truncated) };
        }
        if prefix[i] & 0x80 == 0 {
            let mut buf = &prefix[..=i];
            return decode_varint(&mut buf).map(Some).map_err(|_| FrameError::InvalidPrefix);
        }
    }
    Err(FrameError::InvalidPrefix)
}
