//! Sending requests to the daemon.
//!
//! Every request gets its own connection. Nothing is pooled or multiplexed, so a slow or stuck exchange can never
//! hold up an unrelated one, at the cost of one dial per call.

use crate::errors::{ClientError, FailureCode, FrameError};
use crate::pb;
use crate::request::Request;
use crate::response::{classify, Envelope};
use crate::stream_handle::StreamHandle;
use crate::transport::{format_multiaddr, Transport};
use libp2p::Multiaddr;
use log::*;
use std::sync::Arc;

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    daemon_addr: Multiaddr,
    max_frame_size: usize,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, daemon_addr: Multiaddr, max_frame_size: usize) -> Self {
        Self { transport, daemon_addr, max_frame_size }
    }

    pub fn daemon_addr(&self) -> &Multiaddr {
        &self.daemon_addr
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Fail with [`FrameError::TooLarge`] if `request` would not fit in one frame.
    pub fn check_request_size(&self, request: &Request) -> Result<(), FrameError> {
        let len = request.encoded_len();
        if len > self.max_frame_size {
            return Err(FrameError::TooLarge { len: len as u64, max: self.max_frame_size });
        }
        Ok(())
    }

    /// Dial the daemon, write `request` as one frame and return the handle without reading anything.
    ///
    /// A request too large for one frame is refused before dialing.
    pub async fn send(&self, request: &Request) -> Result<StreamHandle, ClientError> {
        let payload = request.encode();
        if payload.len() > self.max_frame_size {
            return Err(FrameError::TooLarge { len: payload.len() as u64, max: self.max_frame_size }.into());
        }
        trace!("Sending {request} to {}", format_multiaddr(&self.daemon_addr));
        let connection = self
            .transport
            .dial(&self.daemon_addr)
            .await
            .map_err(|source| ClientError::Connect { addr: self.daemon_addr.clone(), source })?;
        let mut handle = StreamHandle::new(connection, self.max_frame_size);
        handle.write(&payload).await?;
        Ok(handle)
    }

    /// A single-shot exchange: send `request`, read and classify the envelope, and close the connection.
    ///
    /// An ERROR envelope becomes [`ClientError::RemoteOperationFailed`] tagged with `failure`.
    pub async fn call(&self, request: Request, failure: FailureCode) -> Result<pb::Response, ClientError> {
        let mut handle = self.send(&request).await?;
        let result = read_envelope(&mut handle, failure).await;
        handle.close().await;
        result
    }

    /// Open a streaming exchange: send `request` and read the envelope.
    ///
    /// On OK the handle is returned still open, positioned at the first stream-specific frame. On any failure the
    /// handle is closed before the error is returned.
    pub async fn open(&self, request: Request, failure: FailureCode) -> Result<(pb::Response, StreamHandle), ClientError> {
        let mut handle = self.send(&request).await?;
        match read_envelope(&mut handle, failure).await {
            Ok(response) => Ok((response, handle)),
            Err(err) => {
                handle.close().await;
                Err(err)
            }
        }
    }
}

/// Read the first frame on `handle` and classify it.
pub async fn read_envelope(handle: &mut StreamHandle, failure: FailureCode) -> Result<pb::Response, ClientError> {
    let frame = handle.read().await?.ok_or(ClientError::NoResponse(failure))?;
    match classify(&frame)? {
        Envelope::Ok(response) => Ok(response),
        Envelope::Error(message) => {
            debug!("Daemon reported {failure}: {message}");
            Err(ClientError::remote(failure, message))
        }
    }
}
