use crate::config::{CliCommand, ConfigCommand, DhtCommand, GlobalOptions, PubsubCommand};
use anyhow::{anyhow, Context};
use futures::{StreamExt, TryStreamExt};
use log::*;
use p2pd_client::{format_multiaddr, Client, ClientConfig, PeerInfo, PubsubMessage};
use std::path::{Path, PathBuf};

pub fn default_config_path() -> PathBuf {
    #[allow(deprecated)]
    let mut home = std::env::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.push(".p2pd");
    home.push("client.yml");
    home
}

/// Load the configuration file, falling back to the defaults if it does not exist, and apply command-line overrides.
pub fn load_config(global: &GlobalOptions) -> Result<ClientConfig, anyhow::Error> {
    let path = global.config_file.clone().unwrap_or_else(default_config_path);
    let mut config = if path.exists() {
        ClientConfig::load(&path).with_context(|| format!("loading {}", path.display()))?
    } else {
        debug!("No configuration file at {}, using defaults", path.display());
        ClientConfig::default()
    };
    if let Some(daemon) = &global.daemon {
        config.daemon_addr = daemon.clone();
    }
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &ClientConfig) -> Result<(), anyhow::Error> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    config.save(path)?;
    Ok(())
}

pub async fn execute(command: CliCommand, global: GlobalOptions) -> Result<(), anyhow::Error> {
    let config = load_config(&global)?;
    if let CliCommand::Config(cmd) = command {
        return exec_config_command(cmd, &global, &config);
    }
    info!("Using daemon at {}", format_multiaddr(&config.daemon_addr));
    let client = Client::new(config);
    exec_daemon_command(&client, command).await
}

async fn exec_daemon_command(client: &Client, command: CliCommand) -> Result<(), anyhow::Error> {
    match command {
        CliCommand::Identify => {
            let me = client.identify().await?;
            println!("Peer id: {}", me.id);
            for addr in &me.addrs {
                println!("  {addr}");
            }
        }
        CliCommand::Peers => {
            let peers = client.list_peers().await?;
            println!("{} connected peers.", peers.len());
            peers.iter().for_each(print_peer);
        }
        CliCommand::Connect { peer, addrs } => {
            client.connect(&peer, &addrs).await?;
            println!("Connected to {peer}");
        }
        CliCommand::Disconnect { peer } => {
            client.disconnect(&peer).await?;
            println!("Disconnected from {peer}");
        }
        CliCommand::Dht(cmd) => exec_dht_command(client, cmd).await?,
        CliCommand::Pubsub(cmd) => exec_pubsub_command(client, cmd).await?,
        CliCommand::Config(_) => return Err(anyhow!("config commands do not talk to the daemon")),
    }
    Ok(())
}

fn exec_config_command(cmd: ConfigCommand, global: &GlobalOptions, config: &ClientConfig) -> Result<(), anyhow::Error> {
    match cmd {
        ConfigCommand::Show => print!("{}", config.to_yml()?),
        ConfigCommand::Save => {
            let path = global.config_file.clone().unwrap_or_else(default_config_path);
            save_config(&path, config)?;
            println!("Configuration saved to {}", path.display());
        }
    }
    Ok(())
}

async fn exec_dht_command(client: &Client, cmd: DhtCommand) -> Result<(), anyhow::Error> {
    let dht = client.dht();
    match cmd {
        DhtCommand::Get { key, hex } => {
            let value = dht.get(key.as_bytes()).await?;
            println!("{}", display_bytes(&value, hex));
        }
        DhtCommand::Put { key, value } => {
            dht.put(key.as_bytes(), value.as_bytes()).await?;
            println!("Stored {} bytes under {key}", value.len());
        }
        DhtCommand::FindPeer { peer } => print_peer(&dht.find_peer(&peer).await?),
        DhtCommand::Providers { cid, count } => {
            let mut providers = dht.find_providers(&cid, count).await?;
            let mut found = 0usize;
            while let Some(provider) = providers.try_next().await? {
                print_peer(&provider);
                found += 1;
            }
            println!("{found} providers found for {cid}");
        }
        DhtCommand::Closest { key } => {
            let peers: Vec<PeerInfo> = dht.get_closest_peers(key.as_bytes()).await?.try_collect().await?;
            peers.iter().for_each(print_peer);
        }
        DhtCommand::PublicKey { peer } => {
            let key = dht.get_public_key(&peer).await?;
            if key.to_peer_id() != peer {
                return Err(anyhow!("The daemon returned a key that does not belong to {peer}"));
            }
            println!("{}", hex::encode(key.encode_protobuf()));
        }
        DhtCommand::Provide { cid } => {
            dht.provide(&cid).await?;
            println!("Providing {cid}");
        }
    }
    Ok(())
}

async fn exec_pubsub_command(client: &Client, cmd: PubsubCommand) -> Result<(), anyhow::Error> {
    let pubsub = client.pubsub();
    match cmd {
        PubsubCommand::Topics => {
            for topic in pubsub.get_topics().await? {
                println!("{topic}");
            }
        }
        PubsubCommand::Publish { topic, message } => {
            pubsub.publish(&topic, message.as_bytes()).await?;
            println!("Published {} bytes to {topic}", message.len());
        }
        PubsubCommand::Peers { topic } => {
            for peer in pubsub.list_peers(topic.as_deref().unwrap_or_default()).await? {
                println!("{peer}");
            }
        }
        PubsubCommand::Subscribe { topic } => {
            let mut messages = pubsub.subscribe(&topic).await?;
            println!("Subscribed to {topic}. Press Ctrl-C to stop.");
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        println!("Unsubscribing from {topic}");
                        break;
                    }
                    next = messages.next() => match next {
                        Some(msg) => print_message(&msg?),
                        None => {
                            println!("The daemon closed the subscription.");
                            break;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_peer(peer: &PeerInfo) {
    println!("{}", peer.id);
    for addr in &peer.addrs {
        println!("  {addr}");
    }
}

fn print_message(msg: &PubsubMessage) {
    let from = msg.from.map(|p| p.to_string()).unwrap_or_else(|| "unknown".into());
    let seqno = msg.sequence_number().map(|n| format!(" #{n}")).unwrap_or_default();
    println!("[{from}{seqno}] {}", display_bytes(&msg.data, false));
}

/// Text if the bytes are printable UTF-8, hex otherwise.
fn display_bytes(bytes: &[u8], force_hex: bool) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if !force_hex && !text.chars().any(char::is_control) => text.to_string(),
        _ => hex::encode(bytes),
    }
}
