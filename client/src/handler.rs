//! Inbound protocol streams.
//!
//! When a remote peer opens a stream for a protocol we registered, the daemon dials *us* on the address given in the
//! STREAM_HANDLER request. Each such connection starts with one framed `StreamInfo` describing the stream, after
//! which it carries raw application bytes.

use crate::errors::ClientError;
use crate::pb;
use crate::stream_handle::StreamHandle;
use crate::transport::{format_multiaddr, Connection, Listener};
use crate::types::{ProtocolStream, StreamInfo};
use async_trait::async_trait;
use libp2p::Multiaddr;
use log::*;
use prost::Message;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How long the accept loop waits after a temporary accept failure before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Receives inbound protocol streams. Each stream is handled in its own task.
///
/// Any `Fn(ProtocolStream) -> impl Future<Output = ()>` closure is a handler.
#[async_trait]
pub trait StreamHandler: Send + Sync + 'static {
    async fn handle(&self, stream: ProtocolStream);
}

#[async_trait]
impl<F, Fut> StreamHandler for F
where
    F: Fn(ProtocolStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, stream: ProtocolStream) {
        (self)(stream).await
    }
}

/// A running accept loop. Dropping it stops accepting; streams already handed to the handler are unaffected.
pub(crate) struct ActiveListener {
    addr: Multiaddr,
    task: JoinHandle<()>,
}

impl ActiveListener {
    pub fn spawn(listener: Box<dyn Listener>, handler: Arc<dyn StreamHandler>, max_frame_size: usize) -> Self {
        let addr = listener.local_addr();
        let task = tokio::spawn(accept_loop(listener, handler, max_frame_size));
        Self { addr, task }
    }

    /// The address the daemon should dial.
    pub fn addr(&self) -> &Multiaddr {
        &self.addr
    }

    /// False once the accept loop has given up on a fatal listener error.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop accepting and wait until the listener has been released.
    pub async fn stop(mut self) {
        self.task.abort();
        if let Err(err) = (&mut self.task).await {
            if !err.is_cancelled() {
                warn!("Stream handler listener on {} ended abnormally: {err}", format_multiaddr(&self.addr));
            }
        }
        debug!("Stopped listening on {}", format_multiaddr(&self.addr));
    }
}

impl Drop for ActiveListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(mut listener: Box<dyn Listener>, handler: Arc<dyn StreamHandler>, max_frame_size: usize) {
    let addr = format_multiaddr(&listener.local_addr());
    info!("Accepting inbound streams on {addr}");
    loop {
        let connection = match listener.accept().await {
            Ok(connection) => connection,
            Err(err) if is_temporary(&err) => {
                warn!("Accepting on {addr} failed, retrying: {err}");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
            Err(err) => {
                warn!("Listener on {addr} failed, no more inbound streams will be accepted: {err}");
                break;
            }
        };
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            match inbound_stream(connection, max_frame_size).await {
                Ok(stream) => {
                    debug!("Inbound {} stream from {}", stream.info.protocol, stream.info.peer);
                    handler.handle(stream).await;
                }
                Err(err) => warn!("Dropping inbound connection: {err}"),
            }
        });
    }
}

/// Accept failures that concern a single connection or a passing resource shortage rather than the listener itself.
fn is_temporary(err: &io::Error) -> bool {
    // EMFILE / ENFILE surface as `Other` with a raw os error.
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || matches!(err.raw_os_error(), Some(23) | Some(24))
}

/// Read the stream header from a connection the daemon opened to us and hand over the rest as raw bytes.
pub(crate) async fn inbound_stream(connection: Connection, max_frame_size: usize) -> Result<ProtocolStream, ClientError> {
    let mut handle = StreamHandle::new(connection, max_frame_size);
    let frame = handle
        .read()
        .await?
        .ok_or_else(|| ClientError::UnexpectedMessage("connection closed before the stream info arrived".into()))?;
    let info = StreamInfo::try_from(pb::StreamInfo::decode(frame.as_slice())?)?;
    let io = handle.detach()?;
    Ok(ProtocolStream { info, io })
}
