//! MirrorBridge CLI - runs a relay hub or attaches clients to one.
//!
//! This is the main binary entry point. See the `mirrorbridge` library
//! for the core functionality.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use mirrorbridge::{
    Bridge, BridgeEvent, Config, ConnectionStatus, ContentMirror, HubHandle, RelayTransport,
    SocketServer, SocketTransport, WsServer, WsTransport,
};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "mirrorbridge")]
#[command(version)]
#[command(about = "Broadcast relay and request/reply bridge for mirrored content")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay hub until Ctrl-C
    Hub {
        /// Unix socket path (defaults to the configured socket)
        #[arg(long)]
        socket: Option<PathBuf>,
        /// Also accept WebSocket endpoints on this address (e.g. 127.0.0.1:8765)
        #[arg(long)]
        ws: Option<String>,
    },
    /// Attach a content mirror; each stdin line replaces the shared content
    Client {
        /// Client id used as the envelope source
        #[arg(long)]
        id: String,
        #[command(flatten)]
        relay: RelayArgs,
    },
    /// Send one request and print its result as JSON (an error reply exits non-zero)
    Request {
        /// Client id used as the envelope source
        #[arg(long)]
        id: String,
        /// Action name
        #[arg(long)]
        action: String,
        /// Request payload (JSON)
        #[arg(long)]
        payload: Option<String>,
        /// Reply timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[command(flatten)]
        relay: RelayArgs,
    },
}

#[derive(clap::Args)]
struct RelayArgs {
    /// Hub Unix socket path
    #[arg(long, conflicts_with = "ws")]
    socket: Option<PathBuf>,
    /// Hub WebSocket URL (e.g. ws://127.0.0.1:8765)
    #[arg(long)]
    ws: Option<String>,
}

impl RelayArgs {
    fn transport(self, config: &Config) -> Box<dyn RelayTransport> {
        match (self.ws, self.socket) {
            (Some(url), _) => Box::new(WsTransport::new(url)),
            (None, Some(path)) => Box::new(SocketTransport::new(path)),
            (None, None) => Box::new(SocketTransport::new(config.socket_path.clone())),
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Hub { socket, ws } => run_hub(&config, socket, ws).await,
            Commands::Client { id, relay } => {
                let transport = relay.transport(&config);
                run_client(&config, id, transport).await
            }
            Commands::Request {
                id,
                action,
                payload,
                timeout_ms,
                relay,
            } => {
                let transport = relay.transport(&config);
                run_request(&config, id, transport, &action, payload, timeout_ms).await
            }
        }
    })
}

async fn run_hub(config: &Config, socket: Option<PathBuf>, ws: Option<String>) -> Result<()> {
    let socket_path = socket.unwrap_or_else(|| config.socket_path.clone());
    let ws_addr = ws.or_else(|| config.ws_addr.clone());

    let (hub, hub_task) = HubHandle::spawn();
    let server = SocketServer::start(socket_path.clone(), hub.event_sender())?;
    let _socket_cleanup = scopeguard::guard(socket_path, |path| {
        if let Err(e) = std::fs::remove_file(&path) {
            log::debug!("Socket file already gone ({}): {e}", path.display());
        }
    });

    let ws_server = match ws_addr {
        Some(addr) => Some(WsServer::start(&addr, hub.event_sender()).await?),
        None => None,
    };

    println!("hub listening on {}", server.socket_path().display());
    if let Some(ws) = &ws_server {
        println!("hub accepting WebSocket endpoints on ws://{}", ws.local_addr());
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    log::info!("Shutdown requested");

    server.shutdown();
    if let Some(ws) = ws_server {
        ws.shutdown();
    }
    hub.shutdown();
    let _ = hub_task.await;
    Ok(())
}

async fn run_client(config: &Config, id: String, transport: Box<dyn RelayTransport>) -> Result<()> {
    let bridge = Bridge::with_config(id, transport, config.bridge_config());
    let mirror = Arc::new(ContentMirror::attach(&bridge));
    let mut events = bridge.subscribe();
    let mut content = mirror.subscribe();

    bridge.connect().await.context("Failed to connect to hub")?;
    println!("connected as {}", bridge.client_id());

    // Pull existing content without blocking stdin.
    let syncing = Arc::clone(&mirror);
    tokio::spawn(async move {
        match syncing.sync_from_peers().await {
            Ok(true) => log::info!("Content synced from peers"),
            Ok(false) => log::info!("No peer content to sync"),
            Err(e) => log::info!("Content sync skipped: {e}"),
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("Failed to read stdin")? {
                Some(line) => {
                    if let Err(e) = mirror.edit(line) {
                        log::warn!("Edit not broadcast: {e}");
                    }
                }
                None => break,
            },
            event = events.recv() => match event {
                Ok(BridgeEvent::PeerStatus { id, status }) => println!("[peer] {id} {status}"),
                Ok(BridgeEvent::Mirror { source, payload }) => {
                    if let Some(text) = payload.as_str() {
                        log::debug!("Plain mirror payload from {source}");
                        mirror.apply_remote(text);
                    }
                }
                Ok(BridgeEvent::Connection(ConnectionStatus::Disconnected)) => {
                    println!("hub connection lost");
                    break;
                }
                Ok(BridgeEvent::Connection(ConnectionStatus::Connected)) => {}
                Err(RecvError::Lagged(n)) => log::warn!("Dropped {n} bridge event(s)"),
                Err(RecvError::Closed) => break,
            },
            changed = content.changed() => {
                if changed.is_err() {
                    break;
                }
                let text = content.borrow_and_update().clone();
                println!("[content] {text}");
            }
            _ = &mut ctrl_c => break,
        }
    }

    bridge.disconnect();
    Ok(())
}

async fn run_request(
    config: &Config,
    id: String,
    transport: Box<dyn RelayTransport>,
    action: &str,
    payload: Option<String>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let payload = match payload {
        Some(raw) => serde_json::from_str(&raw).context("--payload is not valid JSON")?,
        None => Value::Null,
    };
    let timeout = timeout_ms.map_or(config.bridge_config().request_timeout, Duration::from_millis);

    let bridge = Bridge::with_config(id, transport, config.bridge_config());
    bridge.connect().await.context("Failed to connect to hub")?;
    let reply = bridge
        .send_request_with_timeout(action, payload, timeout)
        .await
        .with_context(|| format!("Request '{action}' failed"));
    bridge.disconnect();

    match reply?.into_result() {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => anyhow::bail!("Peer answered '{action}' with an error: {e}"),
    }
}
