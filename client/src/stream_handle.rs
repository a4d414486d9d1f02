//! A framed view over one daemon connection.

use crate::codec::{encode_frame, read_frame};
use crate::errors::{ClientError, FrameError};
use crate::transport::Connection;
use log::*;
use tokio::io::{AsyncWriteExt, BufReader};

/// Owns exactly one connection and reads/writes whole frames on it.
///
/// A handle is either open or closed. Once closed (explicitly via [`close`](Self::close), or by handing the
/// connection over with [`detach`](Self::detach)) every operation except another `close` fails with
/// [`ClientError::HandleClosed`]. Dropping the handle releases the connection.
pub struct StreamHandle {
    io: Option<BufReader<Connection>>,
    max_frame_size: usize,
}

impl StreamHandle {
    pub fn new(connection: Connection, max_frame_size: usize) -> Self {
        Self { io: Some(BufReader::new(connection)), max_frame_size }
    }

    pub fn is_closed(&self) -> bool {
        self.io.is_none()
    }

    /// Frame `payload` and send it immediately.
    pub async fn write(&mut self, payload: &[u8]) -> Result<(), ClientError> {
        if payload.len() > self.max_frame_size {
            return Err(FrameError::TooLarge { len: payload.len() as u64, max: self.max_frame_size }.into());
        }
        let io = self.io.as_mut().ok_or(ClientError::HandleClosed)?;
        io.write_all(&encode_frame(payload)).await?;
        io.flush().await?;
        Ok(())
    }

    /// Wait for the next frame. Returns `None` once the remote end has closed the connection.
    pub async fn read(&mut self) -> Result<Option<Vec<u8>>, ClientError> {
        let io = self.io.as_mut().ok_or(ClientError::HandleClosed)?;
        let frame = read_frame(io, self.max_frame_size).await?;
        Ok(frame)
    }

    /// Release the connection. Calling this more than once is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut io) = self.io.take() {
            if let Err(err) = io.shutdown().await {
                debug!("Error shutting down daemon connection: {err}");
            }
        }
    }

    /// Give up the framed protocol and hand the raw connection to the caller.
    ///
    /// Bytes that were already read ahead from the socket are not lost: they are the first bytes the returned
    /// connection yields.
    pub fn detach(mut self) -> Result<Connection, ClientError> {
        let io = self.io.take().ok_or(ClientError::HandleClosed)?;
        Ok(Box::new(io))
    }
}
