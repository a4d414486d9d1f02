//! Protocol buffer messages of the daemon control protocol.
//!
//! These mirror the daemon's versioned `p2pd.proto` schema field for field. Field numbers and enum values must not
//! change; the rest of the crate converts between these and the typed values in [`crate::types`] and
//! [`crate::request`].

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct Request {
    #[prost(enumeration = "request::Type", required, tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "2")]
    pub connect: Option<ConnectRequest>,
    #[prost(message, optional, tag = "3")]
    pub stream_open: Option<StreamOpenRequest>,
    #[prost(message, optional, tag = "4")]
    pub stream_handler: Option<StreamHandlerRequest>,
    #[prost(message, optional, tag = "5")]
    pub dht: Option<DhtRequest>,
    #[prost(message, optional, tag = "7")]
    pub disconnect: Option<DisconnectRequest>,
    #[prost(message, optional, tag = "8")]
    pub pubsub: Option<PsRequest>,
}

pub mod request {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Identify = 0,
        Connect = 1,
        StreamOpen = 2,
        StreamHandler = 3,
        Dht = 4,
        ListPeers = 5,
        Disconnect = 7,
        Pubsub = 8,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Response {
    #[prost(enumeration = "response::Type", required, tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "2")]
    pub error: Option<ErrorResponse>,
    #[prost(message, optional, tag = "3")]
    pub stream_info: Option<StreamInfo>,
    #[prost(message, optional, tag = "4")]
    pub identify: Option<IdentifyResponse>,
    #[prost(message, optional, tag = "5")]
    pub dht: Option<DhtResponse>,
    #[prost(message, repeated, tag = "6")]
    pub peers: Vec<PeerInfo>,
    #[prost(message, optional, tag = "7")]
    pub pubsub: Option<PsResponse>,
}

pub mod response {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Ok = 0,
        Error = 1,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct IdentifyResponse {
    #[prost(bytes = "vec", required, tag = "1")]
    pub id: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub addrs: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ConnectRequest {
    #[prost(bytes = "vec", required, tag = "1")]
    pub peer: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub addrs: Vec<Vec<u8>>,
    #[prost(int64, optional, tag = "3")]
    pub timeout: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DisconnectRequest {
    #[prost(bytes = "vec", required, tag = "1")]
    pub peer: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StreamOpenRequest {
    #[prost(bytes = "vec", required, tag = "1")]
    pub peer: Vec<u8>,
    #[prost(string, repeated, tag = "2")]
    pub proto: Vec<String>,
    #[prost(int64, optional, tag = "3")]
    pub timeout: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StreamHandlerRequest {
    #[prost(bytes = "vec", required, tag = "1")]
    pub addr: Vec<u8>,
    #[prost(string, repeated, tag = "2")]
    pub proto: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ErrorResponse {
    #[prost(string, required, tag = "1")]
    pub msg: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct StreamInfo {
    #[prost(bytes = "vec", required, tag = "1")]
    pub peer: Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub addr: Vec<u8>,
    #[prost(string, required, tag = "3")]
    pub proto: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct DhtRequest {
    #[prost(enumeration = "dht_request::Type", required, tag = "1")]
    pub r#type: i32,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub peer: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub cid: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub value: Option<Vec<u8>>,
    #[prost(int32, optional, tag = "6")]
    pub count: Option<i32>,
    #[prost(int64, optional, tag = "7")]
    pub timeout: Option<i64>,
}

pub mod dht_request {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        FindPeer = 0,
        FindPeersConnectedToPeer = 1,
        FindProviders = 2,
        GetClosestPeers = 3,
        GetPublicKey = 4,
        GetValue = 5,
        SearchValue = 6,
        PutValue = 7,
        Provide = 8,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct DhtResponse {
    #[prost(enumeration = "dht_response::Type", required, tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "2")]
    pub peer: Option<PeerInfo>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub value: Option<Vec<u8>>,
}

pub mod dht_response {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Begin = 0,
        Value = 1,
        End = 2,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct PeerInfo {
    #[prost(bytes = "vec", required, tag = "1")]
    pub id: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub addrs: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PsRequest {
    #[prost(enumeration = "ps_request::Type", required, tag = "1")]
    pub r#type: i32,
    #[prost(string, optional, tag = "2")]
    pub topic: Option<String>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub data: Option<Vec<u8>>,
}

pub mod ps_request {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        GetTopics = 0,
        ListPeers = 1,
        Publish = 2,
        Subscribe = 3,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct PsMessage {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub from: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub data: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub seqno: Option<Vec<u8>>,
    #[prost(string, repeated, tag = "4")]
    pub topic_ids: Vec<String>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub signature: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub key: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PsResponse {
    #[prost(string, repeated, tag = "1")]
    pub topics: Vec<String>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub peer_ids: Vec<Vec<u8>>,
}

impl Response {
    /// An OK envelope with no payload.
    pub fn ok() -> Self {
        Response { r#type: response::Type::Ok as i32, ..Default::default() }
    }

    /// An ERROR envelope carrying `msg`.
    pub fn error(msg: impl Into<String>) -> Self {
        Response {
            r#type: response::Type::Error as i32,
            error: Some(ErrorResponse { msg: msg.into() }),
            ..Default::default()
        }
    }
}

impl DhtResponse {
    pub fn begin() -> Self {
        DhtResponse { r#type: dht_response::Type::Begin as i32, ..Default::default() }
    }

    pub fn end() -> Self {
        DhtResponse { r#type: dht_response::Type::End as i32, ..Default::default() }
    }

    pub fn with_peer(peer: PeerInfo) -> Self {
        DhtResponse { r#type: dht_response::Type::Value as i32, peer: Some(peer), value: None }
    }

    pub fn with_value(value: Vec<u8>) -> Self {
        DhtResponse { r#type: dht_response::Type::Value as i32, peer: None, value: Some(value) }
    }
}
