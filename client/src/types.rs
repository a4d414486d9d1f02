use crate::errors::{ClientError, DecodeError};
use crate::pb;
use crate::transport::Connection;
use futures::stream::BoxStream;
use libp2p::{Multiaddr, PeerId};
use std::fmt::{Debug, Display, Formatter};

/// A lazily evaluated sequence of results read from one daemon connection.
///
/// The sequence owns its connection; dropping it closes the connection.
pub type ResultStream<T> = BoxStream<'static, Result<T, ClientError>>;

/// A peer and the addresses it can be reached on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

impl PeerInfo {
    pub fn new(id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self { id, addrs }
    }
}

impl Display for PeerInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)?;
        for addr in &self.addrs {
            write!(f, " {addr}")?;
        }
        Ok(())
    }
}

impl TryFrom<pb::PeerInfo> for PeerInfo {
    type Error = DecodeError;

    fn try_from(info: pb::PeerInfo) -> Result<Self, Self::Error> {
        let id = PeerId::from_bytes(&info.id)?;
        let addrs = decode_addrs(info.addrs)?;
        Ok(PeerInfo { id, addrs })
    }
}

impl TryFrom<pb::IdentifyResponse> for PeerInfo {
    type Error = DecodeError;

    fn try_from(identify: pb::IdentifyResponse) -> Result<Self, Self::Error> {
        let id = PeerId::from_bytes(&identify.id)?;
        let addrs = decode_addrs(identify.addrs)?;
        Ok(PeerInfo { id, addrs })
    }
}

impl From<&PeerInfo> for pb::PeerInfo {
    fn from(info: &PeerInfo) -> Self {
        pb::PeerInfo { id: info.id.to_bytes(), addrs: info.addrs.iter().map(|a| a.to_vec()).collect() }
    }
}

/// Describes a protocol stream that the daemon has opened between us and a remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub peer: PeerId,
    pub addr: Multiaddr,
    pub protocol: String,
}

impl TryFrom<pb::StreamInfo> for StreamInfo {
    type Error = DecodeError;

    fn try_from(info: pb::StreamInfo) -> Result<Self, Self::Error> {
        let peer = PeerId::from_bytes(&info.peer)?;
        let addr = Multiaddr::try_from(info.addr)?;
        Ok(StreamInfo { peer, addr, protocol: info.proto })
    }
}

impl From<&StreamInfo> for pb::StreamInfo {
    fn from(info: &StreamInfo) -> Self {
        pb::StreamInfo { peer: info.peer.to_bytes(), addr: info.addr.to_vec(), proto: info.protocol.clone() }
    }
}

/// A raw, unframed byte stream to a remote peer, together with what the daemon told us about it.
///
/// Whatever is read from or written to `io` is application data for `info.protocol`.
pub struct ProtocolStream {
    pub info: StreamInfo,
    pub io: Connection,
}

impl Debug for ProtocolStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolStream").field("info", &self.info).finish_non_exhaustive()
    }
}

/// A message received on a pubsub subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubsubMessage {
    pub from: Option<PeerId>,
    pub data: Vec<u8>,
    pub seqno: Option<Vec<u8>>,
    pub topics: Vec<String>,
    pub signature: Option<Vec<u8>>,
    pub key: Option<Vec<u8>>,
}

impl PubsubMessage {
    /// The sequence number as an integer, if the daemon supplied a big-endian one of at most 8 bytes.
    pub fn sequence_number(&self) -> Option<u64> {
        let seqno = self.seqno.as_ref()?;
        if seqno.len() > 8 {
            return None;
        }
        Some(seqno.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }
}

impl TryFrom<pb::PsMessage> for PubsubMessage {
    type Error = DecodeError;

    fn try_from(msg: pb::PsMessage) -> Result<Self, Self::Error> {
        let from = msg.from.map(|bytes| PeerId::from_bytes(&bytes)).transpose()?;
        Ok(PubsubMessage {
            from,
            data: msg.data.unwrap_or_default(),
            seqno: msg.seqno,
            topics: msg.topic_ids,
            signature: msg.signature,
            key: msg.key,
        })
    }
}

pub(crate) fn decode_addrs(addrs: Vec<Vec<u8>>) -> Result<Vec<Multiaddr>, DecodeError> {
    addrs.into_iter().map(|bytes| Multiaddr::try_from(bytes).map_err(DecodeError::from)).collect()
}

pub(crate) fn decode_peer_ids(ids: &[Vec<u8>]) -> Result<Vec<PeerId>, DecodeError> {
    ids.iter().map(|bytes| PeerId::from_bytes(bytes).map_err(DecodeError::from)).collect()
}
