use crate::config::ClientConfig;
use crate::dht::Dht;
use crate::dispatch::Dispatcher;
use crate::errors::{ClientError, DecodeError, FailureCode};
use crate::handler::{ActiveListener, StreamHandler};
use crate::pb;
use crate::pubsub::Pubsub;
use crate::request::Request;
use crate::transport::{format_multiaddr, SocketTransport, Transport};
use crate::types::{PeerInfo, ProtocolStream, StreamInfo};
use libp2p::{Multiaddr, PeerId};
use log::*;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A client for a running libp2p daemon.
///
/// The client holds no connection of its own. Every call dials the daemon afresh, so a `Client` can be shared
/// between tasks (e.g. behind an `Arc`) and concurrent calls never wait on each other.
///
/// The only state is the optional inbound stream listener set up by [`Client::start`] or
/// [`Client::register_stream_handler`]. There is at most one; starting another replaces it.
pub struct Client {
    dispatcher: Dispatcher,
    listener: Mutex<Option<ActiveListener>>,
}

impl Client {
    /// Create a client that reaches the daemon over TCP or unix sockets.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(SocketTransport))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let dispatcher = Dispatcher::new(transport, config.daemon_addr, config.max_frame_size);
        Self { dispatcher, listener: Mutex::new(None) }
    }

    pub fn daemon_addr(&self) -> &Multiaddr {
        self.dispatcher.daemon_addr()
    }

    pub fn dht(&self) -> Dht<'_> {
        Dht::new(&self.dispatcher)
    }

    pub fn pubsub(&self) -> Pubsub<'_> {
        Pubsub::new(&self.dispatcher)
    }

    /// Ask the daemon for its own peer id and listen addresses.
    pub async fn identify(&self) -> Result<PeerInfo, ClientError> {
        let response = self.dispatcher.call(Request::Identify, FailureCode::IdentifyFailed).await?;
        let identify = response.identify.ok_or(DecodeError::MissingField("identify"))?;
        Ok(PeerInfo::try_from(identify)?)
    }

    /// Have the daemon connect to `peer`, trying `addrs` in addition to any addresses it already knows.
    pub async fn connect(&self, peer: &PeerId, addrs: &[Multiaddr]) -> Result<(), ClientError> {
        for addr in addrs {
            check_addr(addr)?;
        }
        let request = Request::Connect { peer: *peer, addrs: addrs.to_vec() };
        self.dispatcher.call(request, FailureCode::ConnectFailed).await?;
        info!("Daemon connected to {peer}");
        Ok(())
    }

    pub async fn disconnect(&self, peer: &PeerId) -> Result<(), ClientError> {
        let request = Request::Disconnect { peer: *peer };
        self.dispatcher.call(request, FailureCode::DisconnectFailed).await?;
        info!("Daemon disconnected from {peer}");
        Ok(())
    }

    /// The peers the daemon is currently connected to.
    pub async fn list_peers(&self) -> Result<Vec<PeerInfo>, ClientError> {
        let response = self.dispatcher.call(Request::ListPeers, FailureCode::ListPeersFailed).await?;
        let peers = response.peers.into_iter().map(PeerInfo::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok(peers)
    }

    /// Open a stream to `peer` speaking the first of `protocols` that the peer supports.
    ///
    /// On success the control connection is handed over: the returned [`ProtocolStream`] carries raw application
    /// bytes and is closed by dropping it.
    pub async fn open_stream(&self, peer: &PeerId, protocols: &[&str]) -> Result<ProtocolStream, ClientError> {
        if protocols.is_empty() {
            return Err(ClientError::InvalidProtocol("at least one protocol is required".into()));
        }
        for protocol in protocols {
            check_protocol(protocol)?;
        }
        let request = Request::StreamOpen { peer: *peer, protocols: protocols.iter().map(|p| p.to_string()).collect() };
        let (response, mut handle) = self.dispatcher.open(request, FailureCode::OpenStreamFailed).await?;
        let info = match stream_info(response) {
            Ok(info) => info,
            Err(err) => {
                handle.close().await;
                return Err(err);
            }
        };
        debug!("Opened {} stream to {}", info.protocol, info.peer);
        let io = handle.detach()?;
        Ok(ProtocolStream { info, io })
    }

    /// Listen on `addr` for protocol streams that the daemon forwards to us, and pass each one to `handler`.
    ///
    /// Any listener started earlier is stopped first. Returns the address actually bound, which differs from `addr`
    /// when e.g. TCP port 0 was requested.
    pub async fn start(&self, addr: &Multiaddr, handler: impl StreamHandler) -> Result<Multiaddr, ClientError> {
        check_addr(addr)?;
        let mut slot = self.listener.lock().await;
        if let Some(previous) = slot.take() {
            debug!("Replacing the stream listener on {}", format_multiaddr(previous.addr()));
            previous.stop().await;
        }
        let listener = self
            .dispatcher
            .transport()
            .listen(addr)
            .await
            .map_err(|source| ClientError::Listen { addr: addr.clone(), source })?;
        let active = ActiveListener::spawn(listener, Arc::new(handler), self.dispatcher.max_frame_size());
        let bound = active.addr().clone();
        *slot = Some(active);
        Ok(bound)
    }

    /// Stop the inbound stream listener, if there is one.
    pub async fn stop(&self) {
        if let Some(active) = self.listener.lock().await.take() {
            active.stop().await;
        }
    }

    /// Stop the listener only if it is still the one bound to `addr`; a concurrent `start` may have replaced it.
    async fn stop_if_bound_to(&self, addr: &Multiaddr) {
        let mut slot = self.listener.lock().await;
        if slot.as_ref().is_some_and(|active| active.addr() == addr) {
            if let Some(active) = slot.take() {
                active.stop().await;
            }
        }
    }

    /// The address of the running inbound stream listener.
    ///
    /// A listener whose accept loop died on a fatal error is released here and no longer reported.
    pub async fn listen_addr(&self) -> Option<Multiaddr> {
        let mut slot = self.listener.lock().await;
        if slot.as_ref().is_some_and(|active| !active.is_running()) {
            if let Some(dead) = slot.take() {
                warn!("Stream listener on {} is no longer accepting", format_multiaddr(dead.addr()));
            }
        }
        slot.as_ref().map(|active| active.addr().clone())
    }

    /// Ask the daemon to forward inbound streams for `protocol` to a listener on `addr`, served by `handler`.
    ///
    /// The listener is started before the daemon is told about it, and torn down again if the daemon refuses.
    pub async fn register_stream_handler(
        &self,
        addr: &Multiaddr,
        protocol: &str,
        handler: impl StreamHandler,
    ) -> Result<Multiaddr, ClientError> {
        check_addr(addr)?;
        check_protocol(protocol)?;
        let bound = self.start(addr, handler).await?;
        let request = Request::StreamHandler { addr: bound.clone(), protocols: vec![protocol.to_string()] };
        if let Err(err) = self.dispatcher.call(request, FailureCode::RegisterStreamHandlerFailed).await {
            self.stop_if_bound_to(&bound).await;
            return Err(err);
        }
        info!("Registered handler for {protocol} on {}", format_multiaddr(&bound));
        Ok(bound)
    }

    /// Release everything the client holds. Calls that are still running are unaffected.
    pub async fn close(&self) {
        self.stop().await;
    }
}

fn stream_info(response: pb::Response) -> Result<StreamInfo, ClientError> {
    let info = response.stream_info.ok_or(DecodeError::MissingField("stream_info"))?;
    Ok(StreamInfo::try_from(info)?)
}

fn check_addr(addr: &Multiaddr) -> Result<(), ClientError> {
    if addr.is_empty() {
        return Err(ClientError::InvalidAddress("empty multiaddr".into()));
    }
    Ok(())
}

/// Protocol ids are paths such as `/echo/1.0.0`.
fn check_protocol(protocol: &str) -> Result<(), ClientError> {
    if !protocol.starts_with('/') || protocol.len() < 2 {
        return Err(ClientError::InvalidProtocol(format!("`{protocol}` is not a protocol id")));
    }
    Ok(())
}
