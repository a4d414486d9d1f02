use clap::{Parser, Subcommand};
use libp2p::multiaddr;
use libp2p::{Multiaddr, PeerId};
use p2pd_client::{parse_multiaddr, Cid};
use std::path::PathBuf;

/// libp2p daemon client.
///
/// Talks to a running `p2pd` over its control socket.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Config {
    /// Path to the configuration file. The default is `$HOME/.p2pd/client.yml`.
    #[arg(long = "config-file", short = 'c')]
    pub config_file: Option<PathBuf>,
    /// The daemon's control address, e.g. `/unix/tmp/p2pd.sock` or `/ip4/127.0.0.1/tcp/5005`. Overrides the
    /// configuration file.
    #[arg(long = "daemon", short = 'd', env = "P2PD_DAEMON", value_parser = parse_addr)]
    pub daemon: Option<Multiaddr>,
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Show the daemon's peer id and listen addresses.
    #[command(name = "identify", alias = "id")]
    Identify,
    /// List the peers the daemon is connected to.
    #[command(name = "peers", alias = "ls")]
    Peers,
    /// Connect the daemon to a peer.
    Connect {
        peer: PeerId,
        /// Addresses to try, in addition to any the daemon already knows.
        #[arg(value_parser = parse_addr)]
        addrs: Vec<Multiaddr>,
    },
    /// Disconnect the daemon from a peer.
    Disconnect { peer: PeerId },
    /// Distributed hash table operations.
    #[command(subcommand)]
    Dht(DhtCommand),
    /// Publish/subscribe operations.
    #[command(subcommand, name = "pubsub", alias = "ps")]
    Pubsub(PubsubCommand),
    /// Show or save the client configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum DhtCommand {
    /// Fetch the value stored under a key.
    Get {
        key: String,
        /// Print the value as hex instead of text.
        #[arg(long = "hex", default_value_t = false)]
        hex: bool,
    },
    /// Store a value under a key.
    Put { key: String, value: String },
    /// Look up a peer's addresses.
    #[command(name = "find-peer")]
    FindPeer { peer: PeerId },
    /// Find peers that provide a CID.
    #[command(name = "providers")]
    Providers {
        cid: Cid,
        /// How many providers to ask the daemon for.
        #[arg(long = "count", short = 'n')]
        count: Option<u32>,
    },
    /// Find the peers closest to a key.
    #[command(name = "closest")]
    Closest { key: String },
    /// Fetch a peer's public key.
    #[command(name = "public-key")]
    PublicKey { peer: PeerId },
    /// Announce that the daemon provides a CID.
    Provide { cid: Cid },
}

#[derive(Debug, Subcommand)]
pub enum PubsubCommand {
    /// List the topics the daemon is subscribed to.
    Topics,
    /// Publish a message on a topic.
    Publish { topic: String, message: String },
    /// Print messages published on a topic until interrupted.
    #[command(name = "subscribe", alias = "sub")]
    Subscribe { topic: String },
    /// List the peers on a topic, or on all topics if none is given.
    Peers { topic: Option<String> },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration.
    Show,
    /// Write the effective configuration to the configuration file.
    Save,
}

pub struct GlobalOptions {
    pub config_file: Option<PathBuf>,
    pub daemon: Option<Multiaddr>,
}

impl Config {
    pub fn to_parts(self) -> (GlobalOptions, CliCommand) {
        let global = GlobalOptions { config_file: self.config_file, daemon: self.daemon };
        (global, self.command)
    }
}

fn parse_addr(s: &str) -> Result<Multiaddr, multiaddr::Error> {
    parse_multiaddr(s)
}
