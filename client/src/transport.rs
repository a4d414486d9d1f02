//! Socket transport for reaching the daemon.
//!
//! The protocol engine only needs two things from the outside world: dialling the daemon's control address, and
//! listening for the daemon dialling back with inbound protocol streams. Both are expressed by the [`Transport`]
//! trait so that the rest of the crate stays transport agnostic. [`SocketTransport`] is the default implementation,
//! speaking TCP and unix-domain sockets addressed by multiaddr.

use async_trait::async_trait;
use libp2p::multiaddr::Protocol;
use libp2p::Multiaddr;
use log::*;
use std::io;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// Anything that can carry a bidirectional byte stream.
pub trait AsyncDuplex: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> AsyncDuplex for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// An owned duplex byte connection.
pub type Connection = Box<dyn AsyncDuplex>;

/// Dials the daemon and listens for connections from it.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new connection to `addr`.
    async fn dial(&self, addr: &Multiaddr) -> io::Result<Connection>;

    /// Start listening on `addr`.
    async fn listen(&self, addr: &Multiaddr) -> io::Result<Box<dyn Listener>>;
}

/// An active listener created by [`Transport::listen`]. Dropping it stops listening.
#[async_trait]
pub trait Listener: Send + 'static {
    /// The address the listener is actually bound to, e.g. with the real port if port 0 was requested.
    fn local_addr(&self) -> Multiaddr;

    /// Wait for the next inbound connection.
    async fn accept(&mut self) -> io::Result<Connection>;
}

/// The default transport: TCP (`/ip4`, `/ip6`, `/dns*` followed by `/tcp`) and unix-domain sockets (`/unix`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketTransport;

#[async_trait]
impl Transport for SocketTransport {
    async fn dial(&self, addr: &Multiaddr) -> io::Result<Connection> {
        trace!("Dialling {}", format_multiaddr(addr));
        match SocketTarget::try_from(addr)? {
            SocketTarget::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), port)).await?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            SocketTarget::Unix(path) => {
                let stream = UnixStream::connect(path).await?;
                Ok(Box::new(stream))
            }
        }
    }

    async fn listen(&self, addr: &Multiaddr) -> io::Result<Box<dyn Listener>> {
        match SocketTarget::try_from(addr)? {
            SocketTarget::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), port)).await?;
                let local = listener.local_addr()?;
                let addr = Multiaddr::empty().with(Protocol::from(local.ip())).with(Protocol::Tcp(local.port()));
                debug!("Listening on {addr}");
                Ok(Box::new(TcpSocketListener { listener, addr }))
            }
            #[cfg(unix)]
            SocketTarget::Unix(path) => {
                let listener = UnixListener::bind(&path)?;
                debug!("Listening on unix socket {}", path.display());
                Ok(Box::new(UnixSocketListener { listener, addr: addr.clone(), path }))
            }
        }
    }
}

struct TcpSocketListener {
    listener: TcpListener,
    addr: Multiaddr,
}

#[async_trait]
impl Listener for TcpSocketListener {
    fn local_addr(&self) -> Multiaddr {
        self.addr.clone()
    }

    async fn accept(&mut self) -> io::Result<Connection> {
        let (stream, remote) = self.listener.accept().await?;
        trace!("Accepted connection from {remote}");
        Ok(Box::new(stream))
    }
}

#[cfg(unix)]
struct UnixSocketListener {
    listener: UnixListener,
    addr: Multiaddr,
    path: PathBuf,
}

#[cfg(unix)]
#[async_trait]
impl Listener for UnixSocketListener {
    fn local_addr(&self) -> Multiaddr {
        self.addr.clone()
    }

    async fn accept(&mut self) -> io::Result<Connection> {
        let (stream, _) = self.listener.accept().await?;
        Ok(Box::new(stream))
    }
}

#[cfg(unix)]
impl Drop for UnixSocketListener {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            debug!("Could not remove socket file {}: {err}", self.path.display());
        }
    }
}

enum SocketTarget {
    Tcp { host: String, port: u16 },
    #[cfg(unix)]
    Unix(PathBuf),
}

impl TryFrom<&Multiaddr> for SocketTarget {
    type Error = io::Error;

    fn try_from(addr: &Multiaddr) -> Result<Self, Self::Error> {
        let mut components = addr.iter();
        let target = match (components.next(), components.next()) {
            (Some(Protocol::Ip4(ip)), Some(Protocol::Tcp(port))) => SocketTarget::Tcp { host: ip.to_string(), port },
            (Some(Protocol::Ip6(ip)), Some(Protocol::Tcp(port))) => SocketTarget::Tcp { host: ip.to_string(), port },
            (Some(Protocol::Dns(host) | Protocol::Dns4(host) | Protocol::Dns6(host)), Some(Protocol::Tcp(port))) => {
                SocketTarget::Tcp { host: host.to_string(), port }
            }
            #[cfg(unix)]
            (Some(Protocol::Unix(path)), None) => SocketTarget::Unix(PathBuf::from(path.into_owned())),
            _ => return Err(unsupported(addr)),
        };
        if components.next().is_some() {
            return Err(unsupported(addr));
        }
        Ok(target)
    }
}

fn unsupported(addr: &Multiaddr) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("unsupported socket address: {}", format_multiaddr(addr)))
}

/// Build a `/unix` multiaddr for a socket path.
pub fn unix_multiaddr(path: impl Into<PathBuf>) -> Multiaddr {
    let path = path.into().to_string_lossy().into_owned();
    Multiaddr::empty().with(Protocol::Unix(path.into()))
}

/// Parse a multiaddr from text.
///
/// A `/unix` address takes the whole remainder of the string as the socket path, so `/unix/tmp/p2pd.sock` names
/// the socket `/tmp/p2pd.sock`. Everything else is parsed as a regular multiaddr.
pub fn parse_multiaddr(s: &str) -> Result<Multiaddr, libp2p::multiaddr::Error> {
    match s.strip_prefix("/unix") {
        Some(path) if path.starts_with('/') && path.len() > 1 => Ok(unix_multiaddr(path)),
        _ => s.parse(),
    }
}

/// Format a multiaddr so that [`parse_multiaddr`] reads it back unchanged.
pub fn format_multiaddr(addr: &Multiaddr) -> String {
    let mut components = addr.iter();
    match (components.next(), components.next()) {
        (Some(Protocol::Unix(path)), None) if path.starts_with('/') => format!("/unix{path}"),
        (Some(Protocol::Unix(path)), None) => format!("/unix/{path}"),
        _ => addr.to_string(),
    }
}
