//! Typed requests to the daemon.
//!
//! Each variant carries only the payload its operation needs. [`Request::to_wire`] produces the protocol message
//! with the matching type tag and exactly that one payload field populated.

use crate::pb;
use cid::Cid;
use libp2p::{Multiaddr, PeerId};
use prost::Message;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Identify,
    Connect { peer: PeerId, addrs: Vec<Multiaddr> },
    Disconnect { peer: PeerId },
    ListPeers,
    StreamOpen { peer: PeerId, protocols: Vec<String> },
    StreamHandler { addr: Multiaddr, protocols: Vec<String> },
    Dht(DhtRequest),
    Pubsub(PubsubRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DhtRequest {
    FindPeer { peer: PeerId },
    FindPeersConnectedToPeer { peer: PeerId },
    FindProviders { cid: Cid, count: u32 },
    GetClosestPeers { key: Vec<u8> },
    GetPublicKey { peer: PeerId },
    GetValue { key: Vec<u8> },
    SearchValue { key: Vec<u8> },
    PutValue { key: Vec<u8>, value: Vec<u8> },
    Provide { cid: Cid },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubsubRequest {
    GetTopics,
    ListPeers { topic: String },
    Publish { topic: String, data: Vec<u8> },
    Subscribe { topic: String },
}

impl Request {
    pub fn to_wire(&self) -> pb::Request {
        use pb::request::Type;
        let mut wire = pb::Request::default();
        match self {
            Request::Identify => wire.r#type = Type::Identify as i32,
            Request::Connect { peer, addrs } => {
                wire.r#type = Type::Connect as i32;
                wire.connect = Some(pb::ConnectRequest {
                    peer: peer.to_bytes(),
                    addrs: addrs.iter().map(|a| a.to_vec()).collect(),
                    timeout: None,
                });
            }
            Request::Disconnect { peer } => {
                wire.r#type = Type::Disconnect as i32;
                wire.disconnect = Some(pb::DisconnectRequest { peer: peer.to_bytes() });
            }
            Request::ListPeers => wire.r#type = Type::ListPeers as i32,
            Request::StreamOpen { peer, protocols } => {
                wire.r#type = Type::StreamOpen as i32;
                wire.stream_open =
                    Some(pb::StreamOpenRequest { peer: peer.to_bytes(), proto: protocols.clone(), timeout: None });
            }
            Request::StreamHandler { addr, protocols } => {
                wire.r#type = Type::StreamHandler as i32;
                wire.stream_handler = Some(pb::StreamHandlerRequest { addr: addr.to_vec(), proto: protocols.clone() });
            }
            Request::Dht(dht) => {
                wire.r#type = Type::Dht as i32;
                wire.dht = Some(dht.to_wire());
            }
            Request::Pubsub(pubsub) => {
                wire.r#type = Type::Pubsub as i32;
                wire.pubsub = Some(pubsub.to_wire());
            }
        }
        wire
    }

    /// The protobuf encoding of this request, ready to be framed.
    pub fn encode(&self) -> Vec<u8> {
        self.to_wire().encode_to_vec()
    }

    /// The length of [`Request::encode`]'s output.
    pub fn encoded_len(&self) -> usize {
        self.to_wire().encoded_len()
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Identify => write!(f, "IDENTIFY"),
            Request::Connect { peer, .. } => write!(f, "CONNECT({peer})"),
            Request::Disconnect { peer } => write!(f, "DISCONNECT({peer})"),
            Request::ListPeers => write!(f, "LIST_PEERS"),
            Request::StreamOpen { peer, protocols } => write!(f, "STREAM_OPEN({peer}, {})", protocols.join(",")),
            Request::StreamHandler { addr, protocols } => {
                write!(f, "STREAM_HANDLER({addr}, {})", protocols.join(","))
            }
            Request::Dht(dht) => write!(f, "DHT/{dht}"),
            Request::Pubsub(pubsub) => write!(f, "PUBSUB/{pubsub}"),
        }
    }
}

impl DhtRequest {
    fn to_wire(&self) -> pb::DhtRequest {
        use pb::dht_request::Type;
        let mut wire = pb::DhtRequest::default();
        match self {
            DhtRequest::FindPeer { peer } => {
                wire.r#type = Type::FindPeer as i32;
                wire.peer = Some(peer.to_bytes());
            }
            DhtRequest::FindPeersConnectedToPeer { peer } => {
                wire.r#type = Type::FindPeersConnectedToPeer as i32;
                wire.peer = Some(peer.to_bytes());
            }
            DhtRequest::FindProviders { cid, count } => {
                wire.r#type = Type::FindProviders as i32;
                wire.cid = Some(cid.to_bytes());
                wire.count = Some(i32::try_from(*count).unwrap_or(i32::MAX));
            }
            DhtRequest::GetClosestPeers { key } => {
                wire.r#type = Type::GetClosestPeers as i32;
                wire.key = Some(key.clone());
            }
            DhtRequest::GetPublicKey { peer } => {
                wire.r#type = Type::GetPublicKey as i32;
                wire.peer = Some(peer.to_bytes());
            }
            DhtRequest::GetValue { key } => {
                wire.r#type = Type::GetValue as i32;
                wire.key = Some(key.clone());
            }
            DhtRequest::SearchValue { key } => {
                wire.r#type = Type::SearchValue as i32;
                wire.key = Some(key.clone());
            }
            DhtRequest::PutValue { key, value } => {
                wire.r#type = Type::PutValue as i32;
                wire.key = Some(key.clone());
                wire.value = Some(value.clone());
            }
            DhtRequest::Provide { cid } => {
                wire.r#type = Type::Provide as i32;
                wire.cid = Some(cid.to_bytes());
            }
        }
        wire
    }
}

impl Display for DhtRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DhtRequest::FindPeer { peer } => write!(f, "FIND_PEER({peer})"),
            DhtRequest::FindPeersConnectedToPeer { peer } => write!(f, "FIND_PEERS_CONNECTED_TO_PEER({peer})"),
            DhtRequest::FindProviders { cid, count } => write!(f, "FIND_PROVIDERS({cid}, {count})"),
            DhtRequest::GetClosestPeers { key } => write!(f, "GET_CLOSEST_PEERS({} byte key)", key.len()),
            DhtRequest::GetPublicKey { peer } => write!(f, "GET_PUBLIC_KEY({peer})"),
            DhtRequest::GetValue { key } => write!(f, "GET_VALUE({} byte key)", key.len()),
            DhtRequest::SearchValue { key } => write!(f, "SEARCH_VALUE({} byte key)", key.len()),
            DhtRequest::PutValue { key, value } => {
                write!(f, "PUT_VALUE({} byte key, {} byte value)", key.len(), value.len())
            }
            DhtRequest::Provide { cid } => write!(f, "PROVIDE({cid})"),
        }
    }
}

impl PubsubRequest {
    fn to_wire(&self) -> pb::PsRequest {
        use pb::ps_request::Type;
        match self {
            PubsubRequest::GetTopics => pb::PsRequest { r#type: Type::GetTopics as i32, topic: None, data: None },
            PubsubRequest::ListPeers { topic } => {
                pb::PsRequest { r#type: Type::ListPeers as i32, topic: Some(topic.clone()), data: None }
            }
            PubsubRequest::Publish { topic, data } => {
                pb::PsRequest { r#type: Type::Publish as i32, topic: Some(topic.clone()), data: Some(data.clone()) }
            }
            PubsubRequest::Subscribe { topic } => {
                pb::PsRequest { r#type: Type::Subscribe as i32, topic: Some(topic.clone()), data: None }
            }
        }
    }
}

impl Display for PubsubRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PubsubRequest::GetTopics => write!(f, "GET_TOPICS"),
            PubsubRequest::ListPeers { topic } => write!(f, "LIST_PEERS({topic})"),
            PubsubRequest::Publish { topic, data } => write!(f, "PUBLISH({topic}, {} bytes)", data.len()),
            PubsubRequest::Subscribe { topic } => write!(f, "SUBSCRIBE({topic})"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exactly_one_payload_is_populated() {
        let peer = PeerId::random();
        let wire = Request::Connect { peer, addrs: vec!["/ip4/1.2.3.4/tcp/1".parse().unwrap()] }.to_wire();
        assert_eq!(wire.r#type, pb::request::Type::Connect as i32);
        assert_eq!(wire.connect.as_ref().map(|c| c.peer.clone()), Some(peer.to_bytes()));
        assert!(wire.dht.is_none() && wire.pubsub.is_none() && wire.stream_open.is_none());

        let wire = Request::Dht(DhtRequest::PutValue { key: b"/k".to_vec(), value: b"v".to_vec() }).to_wire();
        assert_eq!(wire.r#type, pb::request::Type::Dht as i32);
        assert!(wire.connect.is_none() && wire.pubsub.is_none());
        let dht = wire.dht.unwrap();
        assert_eq!(dht.r#type, pb::dht_request::Type::PutValue as i32);
        assert_eq!(dht.key.as_deref(), Some(&b"/k"[..]));
        assert_eq!(dht.value.as_deref(), Some(&b"v"[..]));
        assert!(dht.peer.is_none() && dht.cid.is_none());
    }

    #[test]
    fn identify_and_list_peers_carry_no_payload() {
        for request in [Request::Identify, Request::ListPeers] {
            let wire = request.to_wire();
            assert_eq!(wire, pb::Request { r#type: wire.r#type, ..Default::default() });
        }
    }

    #[test]
    fn encoded_request_decodes_back() {
        let request = Request::Pubsub(PubsubRequest::Publish { topic: "t".into(), data: vec![1, 2, 3] });
        let decoded = pb::Request::decode(request.encode().as_slice()).unwrap();
        assert_eq!(decoded, request.to_wire());
        assert_eq!(request.to_string(), "PUBSUB/PUBLISH(t, 3 bytes)");
    }

    #[test]
    fn provider_count_is_sent() {
        let cid: Cid = "QmPZ9gcCEpqKTo6aq61g2nXGUhM4iCL3ewB6LDXZCtioEB".parse().unwrap();
        let wire = Request::Dht(DhtRequest::FindProviders { cid, count: 5 }).to_wire();
        let dht = wire.dht.unwrap();
        assert_eq!(dht.count, Some(5));
        assert_eq!(dht.cid, Some(cid.to_bytes()));
    }
}
