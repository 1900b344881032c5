//! Bridge-side WebSocket transport.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{connect, Inbound, WsReader, WsWriter};
use crate::bridge::{BridgeError, RelayLink, RelayTransport};
use crate::timer::ScopedTask;

/// Connects a bridge to a Hub's [`WsServer`](super::WsServer).
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    /// Transport dialing `url` (`ws://` or `wss://`).
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// URL this transport dials.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RelayTransport for WsTransport {
    async fn open(&self) -> Result<RelayLink, BridgeError> {
        let (writer, reader) = connect(&self.url)
            .await
            .map_err(|e| BridgeError::Transport(format!("{e:#}")))?;
        log::info!("[Ws] Connected to hub at {}", self.url);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Value>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Value>();

        tokio::spawn(write_loop(writer, outbound_rx));
        let reader = ScopedTask::spawn(read_loop(reader, inbound_tx));

        Ok(RelayLink::new(Box::new(outbound_tx), inbound_rx, Some(reader)))
    }
}

async fn read_loop(mut reader: WsReader, inbound_tx: UnboundedSender<Value>) {
    while let Some(inbound) = reader.next_message().await {
        let value = match inbound {
            Ok(Inbound::Message(value)) => value,
            Ok(Inbound::Closed { code, reason }) => {
                log::info!("[Ws] Hub closed connection ({code}): {reason}");
                break;
            }
            Err(e) => {
                log::warn!("[Ws] {e}");
                break;
            }
        };
        if inbound_tx.send(value).is_err() {
            return;
        }
    }
}

async fn write_loop(mut writer: WsWriter, mut outbound_rx: UnboundedReceiver<Value>) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = writer.send(&msg).await {
            log::warn!("[Ws] {e:#}");
            return;
        }
    }
    let _ = writer.close().await;
}
