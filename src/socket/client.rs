//! Bridge-side socket transport.
//!
//! ```text
//! Bridge <--RelayLink--> SocketTransport tasks <--frames--> Unix Socket <--> Hub
//! ```
//!
//! The reader task is owned by the link and aborted with it. The writer
//! task ends when the link's sender is dropped, which closes the socket's
//! write half and lets the Hub see EOF.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::framing::{encode_json, FrameDecoder};
use crate::bridge::{BridgeError, RelayLink, RelayTransport};
use crate::constants::SOCKET_READ_BUFFER;
use crate::timer::ScopedTask;

/// Connects a bridge to a Hub's [`SocketServer`](super::SocketServer).
#[derive(Debug, Clone)]
pub struct SocketTransport {
    path: PathBuf,
}

impl SocketTransport {
    /// Transport for the socket at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Socket path this transport dials.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RelayTransport for SocketTransport {
    async fn open(&self) -> Result<RelayLink, BridgeError> {
        let stream = UnixStream::connect(&self.path).await.map_err(|e| {
            BridgeError::Transport(format!("connect {}: {e}", self.path.display()))
        })?;
        log::info!("[Socket] Connected to hub at {}", self.path.display());

        let (reader, writer) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Value>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Value>();

        tokio::spawn(write_loop(writer, outbound_rx));
        let reader = ScopedTask::spawn(read_loop(reader, inbound_tx));

        Ok(RelayLink::new(Box::new(outbound_tx), inbound_rx, Some(reader)))
    }
}

/// Socket frames → inbound channel. Dropping `inbound_tx` on exit signals
/// the bridge that the link is gone.
async fn read_loop(mut reader: OwnedReadHalf, inbound_tx: UnboundedSender<Value>) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; SOCKET_READ_BUFFER];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                log::info!("[Socket] EOF, hub disconnected");
                break;
            }
            Ok(n) => match decoder.feed(&buf[..n]) {
                Ok(messages) => {
                    for msg in messages {
                        if inbound_tx.send(msg).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    log::error!("[Socket] Frame decode error: {e}");
                    break;
                }
            },
            Err(e) => {
                log::error!("[Socket] Read error: {e}");
                break;
            }
        }
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut outbound_rx: UnboundedReceiver<Value>) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = writer.write_all(&encode_json(&msg)).await {
            log::error!("[Socket] Write error: {e}");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
