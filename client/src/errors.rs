use libp2p::Multiaddr;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// The message used when the daemon reports a failure without saying why.
pub const UNSPECIFIED_ERROR: &str = "unspecified";

/// Identifies which remote operation the daemon refused, akin to an HTTP error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCode {
    ConnectFailed,
    DisconnectFailed,
    IdentifyFailed,
    ListPeersFailed,
    OpenStreamFailed,
    RegisterStreamHandlerFailed,
    DhtPutFailed,
    DhtGetFailed,
    DhtFindPeerFailed,
    DhtProvideFailed,
    DhtGetPublicKeyFailed,
    DhtFindProvidersFailed,
    DhtGetClosestPeersFailed,
    DhtFindPeersConnectedToPeerFailed,
    DhtSearchValueFailed,
    PubsubGetTopicsFailed,
    PubsubListPeersFailed,
    PubsubPublishFailed,
    PubsubSubscribeFailed,
}

impl FailureCode {
    /// The stable, machine-readable form of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::ConnectFailed => "ERR_CONNECT_FAILED",
            FailureCode::DisconnectFailed => "ERR_DISCONNECT_FAILED",
            FailureCode::IdentifyFailed => "ERR_IDENTIFY_FAILED",
            FailureCode::ListPeersFailed => "ERR_LIST_PEERS_FAILED",
            FailureCode::OpenStreamFailed => "ERR_OPEN_STREAM_FAILED",
            FailureCode::RegisterStreamHandlerFailed => "ERR_REGISTER_STREAM_HANDLER_FAILED",
            FailureCode::DhtPutFailed => "ERR_DHT_PUT_FAILED",
            FailureCode::DhtGetFailed => "ERR_DHT_GET_FAILED",
            FailureCode::DhtFindPeerFailed => "ERR_DHT_FIND_PEER_FAILED",
            FailureCode::DhtProvideFailed => "ERR_DHT_PROVIDE_FAILED",
            FailureCode::DhtGetPublicKeyFailed => "ERR_DHT_GET_PUBLIC_KEY_FAILED",
            FailureCode::DhtFindProvidersFailed => "ERR_DHT_FIND_PROVIDERS_FAILED",
            FailureCode::DhtGetClosestPeersFailed => "ERR_DHT_GET_CLOSEST_PEERS_FAILED",
            FailureCode::DhtFindPeersConnectedToPeerFailed => "ERR_DHT_FIND_PEERS_CONNECTED_TO_PEER_FAILED",
            FailureCode::DhtSearchValueFailed => "ERR_DHT_SEARCH_VALUE_FAILED",
            FailureCode::PubsubGetTopicsFailed => "ERR_PUBSUB_GET_TOPICS_FAILED",
            FailureCode::PubsubListPeersFailed => "ERR_PUBSUB_LIST_PEERS_FAILED",
            FailureCode::PubsubPublishFailed => "ERR_PUBSUB_PUBLISH_FAILED",
            FailureCode::PubsubSubscribeFailed => "ERR_PUBSUB_SUBSCRIBE_FAILED",
        }
    }
}

impl Display for FailureCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame of {len} bytes exceeds the maximum frame size of {max} bytes.")]
    TooLarge { len: u64, max: usize },
    #[error("The stream ended in the middle of a frame.")]
    Truncated,
    #[error("Invalid frame length prefix.")]
    InvalidPrefix,
    #[error("I/O error. {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed protocol message. {0}")]
    Protobuf(#[from] prost::DecodeError),
    #[error("Unknown {kind} type: {value}")]
    UnknownType { kind: &'static str, value: i32 },
    #[error("Required field `{0}` is missing.")]
    MissingField(&'static str),
    #[error("Invalid peer id. {0}")]
    PeerId(#[from] libp2p::identity::ParseError),
    #[error("Invalid multiaddr. {0}")]
    Multiaddr(#[from] libp2p::multiaddr::Error),
    #[error("Invalid public key. {0}")]
    PublicKey(#[from] libp2p::identity::DecodingError),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid key. {0}")]
    InvalidKey(String),
    #[error("Invalid value. {0}")]
    InvalidValue(String),
    #[error("Invalid topic. {0}")]
    InvalidTopic(String),
    #[error("Invalid data. {0}")]
    InvalidData(String),
    #[error("Invalid address. {0}")]
    InvalidAddress(String),
    #[error("Invalid protocol. {0}")]
    InvalidProtocol(String),
    #[error("Could not connect to the daemon at {addr}. {source}")]
    Connect {
        addr: Multiaddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not listen on {addr}. {source}")]
    Listen {
        addr: Multiaddr,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error. {0}")]
    Io(#[from] std::io::Error),
    #[error("Framing error. {0}")]
    Frame(FrameError),
    #[error("Could not decode daemon message. {0}")]
    Decode(#[from] DecodeError),
    #[error("Unexpected message received. {0}")]
    UnexpectedMessage(String),
    #[error("{code}: {message}")]
    RemoteOperationFailed { code: FailureCode, message: String },
    #[error("{0}: the daemon closed the connection without responding.")]
    NoResponse(FailureCode),
    #[error("The stream handle has already been closed.")]
    HandleClosed,
}

impl ClientError {
    pub fn remote(code: FailureCode, message: impl Into<String>) -> Self {
        ClientError::RemoteOperationFailed { code, message: message.into() }
    }

    /// A stable, machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::InvalidKey(_) => "ERR_INVALID_KEY",
            ClientError::InvalidValue(_) => "ERR_INVALID_VALUE",
            ClientError::InvalidTopic(_) => "ERR_INVALID_TOPIC",
            ClientError::InvalidData(_) => "ERR_INVALID_DATA",
            ClientError::InvalidAddress(_) => "ERR_INVALID_ADDRESS",
            ClientError::InvalidProtocol(_) => "ERR_INVALID_PROTOCOL",
            ClientError::Connect { .. } => "ERR_CONNECT",
            ClientError::Listen { .. } => "ERR_LISTEN",
            ClientError::Io(_) => "ERR_IO",
            ClientError::Frame(_) => "ERR_FRAME",
            ClientError::Decode(_) => "ERR_DECODE",
            ClientError::UnexpectedMessage(_) => "ERR_UNEXPECTED_MESSAGE_RECEIVED",
            ClientError::RemoteOperationFailed { code, .. } | ClientError::NoResponse(code) => code.as_str(),
            ClientError::HandleClosed => "ERR_HANDLE_CLOSED",
        }
    }

    /// True for errors raised locally from bad input, before any connection was made.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidKey(_)
                | ClientError::InvalidValue(_)
                | ClientError::InvalidTopic(_)
                | ClientError::InvalidData(_)
                | ClientError::InvalidAddress(_)
                | ClientError::InvalidProtocol(_)
        )
    }
}

/// I/O failures inside the codec are transport errors, not protocol violations.
impl From<FrameError> for ClientError {
    fn from(error: FrameError) -> Self {
        match error {
            FrameError::Io(err) => ClientError::Io(err),
            other => ClientError::Frame(other),
        }
    }
}

impl From<prost::DecodeError> for ClientError {
    fn from(error: prost::DecodeError) -> Self {
        ClientError::Decode(DecodeError::Protobuf(error))
    }
}
