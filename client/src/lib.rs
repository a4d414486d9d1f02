//! A client for the libp2p daemon (`p2pd`) control protocol.
//!
//! The daemon owns the libp2p host. This crate talks to it over its control socket: each operation opens a fresh
//! connection, writes one varint-length-prefixed protobuf request and reads back a response envelope, followed by
//! more frames for streaming operations (DHT lookups, pubsub subscriptions) or raw bytes for protocol streams.
//!
//! ```no_run
//! # async fn demo() -> Result<(), p2pd_client::ClientError> {
//! use futures::StreamExt;
//! use p2pd_client::{Client, ClientConfig};
//!
//! let client = Client::new(ClientConfig::default());
//! let me = client.identify().await?;
//! println!("daemon is {me}");
//! client.dht().put(b"/v/key", b"oh hello there").await?;
//! let mut messages = client.pubsub().subscribe("news").await?;
//! while let Some(msg) = messages.next().await {
//!     println!("{:?}", msg?.data);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
pub mod codec;
pub mod config;
pub mod dht;
pub mod dispatch;
pub mod errors;
mod handler;
pub mod pb;
pub mod pubsub;
pub mod request;
pub mod response;
pub mod stream_handle;
pub mod transport;
pub mod types;

pub use client::Client;
pub use config::{ClientConfig, ConfigError, DEFAULT_DAEMON_SOCKET};
pub use dht::{Dht, DEFAULT_PROVIDER_COUNT};
pub use errors::{ClientError, DecodeError, FailureCode, FrameError, UNSPECIFIED_ERROR};
pub use handler::StreamHandler;
pub use pubsub::Pubsub;
pub use transport::{format_multiaddr, parse_multiaddr, unix_multiaddr, Connection, Listener, SocketTransport, Transport};
pub use types::{PeerInfo, ProtocolStream, PubsubMessage, ResultStream, StreamInfo};

pub use cid::Cid;
pub use libp2p::identity::PublicKey;
pub use libp2p::{Multiaddr, PeerId};
