//! An in-process stand-in for `p2pd`.
//!
//! The fake daemon listens on a unix socket inside a temporary directory and speaks just enough of the control
//! protocol to exercise the client: a key/value store behind the DHT requests, topic fan-out for pubsub, an echo
//! service behind STREAM_OPEN, and bookkeeping for STREAM_HANDLER registrations. In scripted mode it ignores the
//! request, replays a fixed list of frames and hangs up.
#![allow(dead_code)]

use async_trait::async_trait;
use libp2p::identity::Keypair;
use log::*;
use p2pd_client::codec::{encode_frame, read_frame, DEFAULT_MAX_FRAME_SIZE};
use p2pd_client::{
    pb, unix_multiaddr, Client, ClientConfig, Connection, Listener, Multiaddr, PeerId, PeerInfo, SocketTransport,
    Transport,
};
use prost::Message;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// The error message the fake daemon uses for a DHT miss.
pub const NOT_FOUND: &str = "routing: not found";

/// Stream handler registrations for this protocol are refused.
pub const REFUSED_PROTOCOL: &str = "/refused/1.0.0";

pub fn init_logging() {
    env_logger::try_init().ok();
}

enum Mode {
    Stateful,
    Scripted(Vec<Vec<u8>>),
}

struct State {
    keypair: Keypair,
    listen_addrs: Vec<Multiaddr>,
    mode: Mode,
    connections: AtomicUsize,
    requests: Mutex<Vec<pb::Request>>,
    store: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    peers: Mutex<Vec<PeerInfo>>,
    providers: Mutex<Vec<PeerInfo>>,
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<pb::PsMessage>>>>,
    handlers: Mutex<Vec<(Multiaddr, Vec<String>)>>,
    seqno: AtomicU64,
}

impl State {
    fn peer_id(&self) -> PeerId {
        self.keypair.public().to_peer_id()
    }

    /// Topics with at least one live subscriber, sorted.
    fn topics(&self) -> Vec<String> {
        let subscribers = self.subscribers.lock().unwrap();
        let mut topics = subscribers
            .iter()
            .filter(|(_, senders)| senders.iter().any(|tx| !tx.is_closed()))
            .map(|(topic, _)| topic.clone())
            .collect::<Vec<_>>();
        topics.sort();
        topics
    }
}

pub struct FakeDaemon {
    _dir: TempDir,
    addr: Multiaddr,
    state: Arc<State>,
    task: JoinHandle<()>,
}

impl FakeDaemon {
    /// A daemon that keeps state between requests.
    pub async fn start() -> Self {
        Self::spawn(Mode::Stateful).await
    }

    /// A daemon that answers every request with `frames` and then closes the connection.
    pub async fn scripted(frames: Vec<Vec<u8>>) -> Self {
        Self::spawn(Mode::Scripted(frames)).await
    }

    /// A daemon that reads each request and closes the connection without answering.
    pub async fn hang_up() -> Self {
        Self::scripted(Vec::new()).await
    }

    async fn spawn(mode: Mode) -> Self {
        init_logging();
        let dir = tempfile::tempdir().expect("create socket directory");
        let path = dir.path().join("p2pd.sock");
        let listener = UnixListener::bind(&path).expect("bind fake daemon socket");
        let state = Arc::new(State {
            keypair: Keypair::generate_ed25519(),
            listen_addrs: vec!["/ip4/127.0.0.1/tcp/4001".parse().unwrap()],
            mode,
            connections: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            store: Mutex::new(HashMap::new()),
            peers: Mutex::new(Vec::new()),
            providers: Mutex::new(Vec::new()),
            subscribers: Mutex::new(HashMap::new()),
            handlers: Mutex::new(Vec::new()),
            seqno: AtomicU64::new(1),
        });
        let task = tokio::spawn(serve(listener, Arc::clone(&state)));
        Self { _dir: dir, addr: unix_multiaddr(path), state, task }
    }

    pub fn addr(&self) -> &Multiaddr {
        &self.addr
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.addr.clone())
    }

    pub fn client(&self) -> Client {
        Client::new(self.config())
    }

    pub fn peer_id(&self) -> PeerId {
        self.state.peer_id()
    }

    pub fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.state.listen_addrs.clone()
    }

    pub fn public_key(&self) -> libp2p::identity::PublicKey {
        self.state.keypair.public()
    }

    /// How many connections the daemon has accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<pb::Request> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn add_peer(&self, peer: PeerInfo) {
        self.state.peers.lock().unwrap().push(peer);
    }

    pub fn set_providers(&self, providers: Vec<PeerInfo>) {
        *self.state.providers.lock().unwrap() = providers;
    }

    pub fn handlers(&self) -> Vec<(Multiaddr, Vec<String>)> {
        self.state.handlers.lock().unwrap().clone()
    }

    /// Act like a remote peer opening `protocol` to us: dial the most recently registered handler address and send
    /// the stream header. The returned connection carries raw bytes from then on.
    pub async fn dial_handler(&self, peer: PeerId, protocol: &str) -> Connection {
        let addr = self.state.handlers.lock().unwrap().last().map(|(addr, _)| addr.clone());
        let addr = addr.expect("no stream handler registered");
        let mut conn = SocketTransport.dial(&addr).await.expect("dial stream handler");
        let info = pb::StreamInfo {
            peer: peer.to_bytes(),
            addr: "/ip4/10.0.0.3/tcp/4001".parse::<Multiaddr>().unwrap().to_vec(),
            proto: protocol.into(),
        };
        conn.write_all(&encode_frame(&info.encode_to_vec())).await.unwrap();
        conn
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(listener: UnixListener, state: Arc<State>) {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(err) => {
                warn!("Fake daemon stopped accepting: {err}");
                break;
            }
        };
        state.connections.fetch_add(1, Ordering::SeqCst);
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, state).await {
                debug!("Fake daemon connection ended with an error: {err}");
            }
        });
    }
}

async fn respond(stream: &mut UnixStream, msg: impl Message) -> TestResult {
    stream.write_all(&encode_frame(&msg.encode_to_vec())).await?;
    Ok(())
}

fn dht_ok(dht: pb::DhtResponse) -> pb::Response {
    pb::Response { dht: Some(dht), ..pb::Response::ok() }
}

async fn handle_connection(mut stream: UnixStream, state: Arc<State>) -> TestResult {
    let Some(frame) = read_frame(&mut stream, DEFAULT_MAX_FRAME_SIZE).await? else {
        return Ok(());
    };
    let request = pb::Request::decode(frame.as_slice())?;
    state.requests.lock().unwrap().push(request.clone());
    if let Mode::Scripted(frames) = &state.mode {
        for frame in frames {
            stream.write_all(&encode_frame(frame)).await?;
        }
        return Ok(());
    }
    use pb::request::Type;
    match Type::try_from(request.r#type)? {
        Type::Identify => {
            let identify = pb::IdentifyResponse {
                id: state.peer_id().to_bytes(),
                addrs: state.listen_addrs.iter().map(|a| a.to_vec()).collect(),
            };
            respond(&mut stream, pb::Response { identify: Some(identify), ..pb::Response::ok() }).await
        }
        Type::Connect => {
            let connect = request.connect.unwrap_or_default();
            let peer = PeerId::from_bytes(&connect.peer)?;
            let addrs = connect.addrs.into_iter().map(Multiaddr::try_from).collect::<Result<Vec<_>, _>>()?;
            state.peers.lock().unwrap().push(PeerInfo::new(peer, addrs));
            respond(&mut stream, pb::Response::ok()).await
        }
        Type::Disconnect => {
            let peer = PeerId::from_bytes(&request.disconnect.unwrap_or_default().peer)?;
            let removed = {
                let mut peers = state.peers.lock().unwrap();
                let before = peers.len();
                peers.retain(|p| p.id != peer);
                peers.len() < before
            };
            if removed {
                respond(&mut stream, pb::Response::ok()).await
            } else {
                respond(&mut stream, pb::Response::error("not connected")).await
            }
        }
        Type::ListPeers => {
            let peers = state.peers.lock().unwrap().iter().map(pb::PeerInfo::from).collect::<Vec<_>>();
            respond(&mut stream, pb::Response { peers, ..pb::Response::ok() }).await
        }
        Type::StreamOpen => {
            let open = request.stream_open.unwrap_or_default();
            let Some(proto) = open.proto.first().cloned() else {
                return respond(&mut stream, pb::Response::error("no protocols given")).await;
            };
            let info = pb::StreamInfo {
                peer: open.peer,
                addr: "/ip4/10.0.0.2/tcp/4001".parse::<Multiaddr>()?.to_vec(),
                proto,
            };
            respond(&mut stream, pb::Response { stream_info: Some(info), ..pb::Response::ok() }).await?;
            let (mut reader, mut writer) = stream.split();
            tokio::io::copy(&mut reader, &mut writer).await?;
            Ok(())
        }
        Type::StreamHandler => {
            let handler = request.stream_handler.unwrap_or_default();
            if handler.proto.iter().any(|p| p == REFUSED_PROTOCOL) {
                return respond(&mut stream, pb::Response::error("protocol refused")).await;
            }
            let addr = Multiaddr::try_from(handler.addr)?;
            state.handlers.lock().unwrap().push((addr, handler.proto));
            respond(&mut stream, pb::Response::ok()).await
        }
        Type::Dht => dht(stream, &state, request.dht.unwrap_or_default()).await,
        Type::Pubsub => pubsub(stream, &state, request.pubsub.unwrap_or_default()).await,
    }
}

async fn dht(mut stream: UnixStream, state: &State, request: pb::DhtRequest) -> TestResult {
    use pb::dht_request::Type;
    match Type::try_from(request.r#type)? {
        Type::PutValue => {
            let (Some(key), Some(value)) = (request.key, request.value) else {
                return respond(&mut stream, pb::Response::error("missing key or value")).await;
            };
            state.store.lock().unwrap().insert(key, value);
            respond(&mut stream, pb::Response::ok()).await
        }
        Type::GetValue => {
            let value = request.key.and_then(|key| state.store.lock().unwrap().get(&key).cloned());
            match value {
                Some(value) => respond(&mut stream, dht_ok(pb::DhtResponse::with_value(value))).await,
                None => respond(&mut stream, pb::Response::error(NOT_FOUND)).await,
            }
        }
        Type::SearchValue => {
            let value = request.key.and_then(|key| state.store.lock().unwrap().get(&key).cloned());
            respond(&mut stream, dht_ok(pb::DhtResponse::begin())).await?;
            if let Some(value) = value {
                respond(&mut stream, pb::DhtResponse::with_value(value)).await?;
            }
            respond(&mut stream, pb::DhtResponse::end()).await
        }
        Type::FindPeer => {
            let peer = PeerId::from_bytes(&request.peer.unwrap_or_default())?;
            let found = state.peers.lock().unwrap().iter().find(|p| p.id == peer).cloned();
            match found {
                Some(info) => respond(&mut stream, dht_ok(pb::DhtResponse::with_peer((&info).into()))).await,
                None => respond(&mut stream, pb::Response::error(NOT_FOUND)).await,
            }
        }
        Type::FindProviders => {
            let providers = state.providers.lock().unwrap().clone();
            stream_peers(&mut stream, &providers).await
        }
        Type::FindPeersConnectedToPeer => {
            let peers = state.peers.lock().unwrap().clone();
            stream_peers(&mut stream, &peers).await
        }
        Type::GetClosestPeers => {
            let ids = state.peers.lock().unwrap().iter().map(|p| p.id).collect::<Vec<_>>();
            respond(&mut stream, dht_ok(pb::DhtResponse::begin())).await?;
            for id in ids {
                respond(&mut stream, pb::DhtResponse::with_value(id.to_bytes())).await?;
            }
            respond(&mut stream, pb::DhtResponse::end()).await
        }
        Type::GetPublicKey => {
            let peer = PeerId::from_bytes(&request.peer.unwrap_or_default())?;
            if peer == state.peer_id() {
                let key = state.keypair.public().encode_protobuf();
                respond(&mut stream, dht_ok(pb::DhtResponse::with_value(key))).await
            } else {
                respond(&mut stream, pb::Response::error(NOT_FOUND)).await
            }
        }
        Type::Provide => {
            cid::Cid::try_from(request.cid.unwrap_or_default().as_slice())?;
            respond(&mut stream, pb::Response::ok()).await
        }
    }
}

async fn stream_peers(stream: &mut UnixStream, peers: &[PeerInfo]) -> TestResult {
    respond(stream, dht_ok(pb::DhtResponse::begin())).await?;
    for peer in peers {
        respond(stream, pb::DhtResponse::with_peer(peer.into())).await?;
    }
    respond(stream, pb::DhtResponse::end()).await
}

async fn pubsub(mut stream: UnixStream, state: &State, request: pb::PsRequest) -> TestResult {
    use pb::ps_request::Type;
    match Type::try_from(request.r#type)? {
        Type::GetTopics => {
            let ps = pb::PsResponse { topics: state.topics(), peer_ids: vec![] };
            respond(&mut stream, pb::Response { pubsub: Some(ps), ..pb::Response::ok() }).await
        }
        Type::ListPeers => {
            let peer_ids = state.peers.lock().unwrap().iter().map(|p| p.id.to_bytes()).collect();
            let ps = pb::PsResponse { topics: vec![], peer_ids };
            respond(&mut stream, pb::Response { pubsub: Some(ps), ..pb::Response::ok() }).await
        }
        Type::Publish => {
            let topic = request.topic.unwrap_or_default();
            let msg = pb::PsMessage {
                from: Some(state.peer_id().to_bytes()),
                data: request.data,
                seqno: Some(state.seqno.fetch_add(1, Ordering::SeqCst).to_be_bytes().to_vec()),
                topic_ids: vec![topic.clone()],
                signature: None,
                key: None,
            };
            if let Some(senders) = state.subscribers.lock().unwrap().get_mut(&topic) {
                senders.retain(|tx| tx.send(msg.clone()).is_ok());
            }
            respond(&mut stream, pb::Response::ok()).await
        }
        Type::Subscribe => {
            let topic = request.topic.unwrap_or_default();
            let (tx, mut rx) = mpsc::unbounded_channel();
            state.subscribers.lock().unwrap().entry(topic).or_default().push(tx);
            respond(&mut stream, pb::Response::ok()).await?;
            let (mut reader, mut writer) = stream.split();
            let mut probe = [0u8; 1];
            loop {
                tokio::select! {
                    msg = rx.recv() => match msg {
                        Some(msg) => writer.write_all(&encode_frame(&msg.encode_to_vec())).await?,
                        None => break,
                    },
                    read = reader.read(&mut probe) => {
                        if !matches!(read, Ok(n) if n > 0) {
                            break;
                        }
                    }
                }
            }
            Ok(())
        }
    }
}

/// A transport that counts dial attempts and refuses every one of them.
#[derive(Default)]
pub struct CountingTransport {
    dials: AtomicUsize,
}

impl CountingTransport {
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for CountingTransport {
    async fn dial(&self, _addr: &Multiaddr) -> io::Result<Connection> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::from(io::ErrorKind::ConnectionRefused))
    }

    async fn listen(&self, _addr: &Multiaddr) -> io::Result<Box<dyn Listener>> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}
