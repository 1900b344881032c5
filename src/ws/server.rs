//! WebSocket listener for browser endpoints.
//!
//! Every accepted connection becomes a Hub endpoint with id `ws:<..>`.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::{accept, Inbound, WsReader, WsWriter};
use crate::hub::{generate_endpoint_id, EndpointId, HubEvent};

/// WebSocket listener feeding the Hub.
#[derive(Debug)]
pub struct WsServer {
    local_addr: SocketAddr,
    accept_handle: JoinHandle<()>,
}

impl WsServer {
    /// Bind `addr` and start accepting WebSocket connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(addr: &str, hub_event_tx: UnboundedSender<HubEvent>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind WebSocket listener: {addr}"))?;
        let local_addr = listener.local_addr()?;
        log::info!("[Ws] Listening on ws://{}", local_addr);

        let accept_handle = tokio::spawn(Self::accept_loop(listener, hub_event_tx));
        Ok(Self {
            local_addr,
            accept_handle,
        })
    }

    async fn accept_loop(listener: TcpListener, hub_event_tx: UnboundedSender<HubEvent>) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    if hub_event_tx.is_closed() {
                        log::warn!("[Ws] Hub event channel closed, stopping accept loop");
                        break;
                    }
                    // Handshake off the accept loop so a slow peer can't stall it.
                    tokio::spawn(handshake(stream, peer, hub_event_tx.clone()));
                }
                Err(e) => {
                    log::error!("[Ws] Accept error: {e}");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections. Already-attached endpoints keep relaying.
    pub fn shutdown(self) {
        self.accept_handle.abort();
    }
}

async fn handshake(stream: TcpStream, peer: SocketAddr, hub_event_tx: UnboundedSender<HubEvent>) {
    let (writer, reader) = match accept(stream).await {
        Ok(halves) => halves,
        Err(e) => {
            log::warn!("[Ws] {peer}: {e:#}");
            return;
        }
    };

    let endpoint_id = generate_endpoint_id("ws");
    log::info!("[Ws] Endpoint accepted: {} ({})", endpoint_id, peer);

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Value>();
    if hub_event_tx
        .send(HubEvent::EndpointConnected {
            endpoint_id: endpoint_id.clone(),
            outbound: outbound_tx,
        })
        .is_err()
    {
        return;
    }

    tokio::spawn(write_loop(endpoint_id.clone(), writer, outbound_rx));
    read_loop(endpoint_id, reader, hub_event_tx).await;
}

async fn read_loop(
    endpoint_id: EndpointId,
    mut reader: WsReader<TcpStream>,
    hub_event_tx: UnboundedSender<HubEvent>,
) {
    while let Some(inbound) = reader.next_message().await {
        let msg = match inbound {
            Ok(Inbound::Message(msg)) => msg,
            Ok(Inbound::Closed { code, reason }) => {
                log::info!("[Ws] Endpoint {} closed ({code}): {reason}", endpoint_id);
                break;
            }
            Err(e) => {
                log::warn!("[Ws] {}: {e}", endpoint_id);
                break;
            }
        };
        let event = HubEvent::EndpointMessage {
            endpoint_id: endpoint_id.clone(),
            msg,
        };
        if hub_event_tx.send(event).is_err() {
            return;
        }
    }

    let _ = hub_event_tx.send(HubEvent::EndpointDisconnected { endpoint_id });
}

async fn write_loop(
    endpoint_id: EndpointId,
    mut writer: WsWriter<TcpStream>,
    mut outbound_rx: UnboundedReceiver<Value>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = writer.send(&msg).await {
            log::warn!("[Ws] Write error for {}: {e}", endpoint_id);
            return;
        }
    }
    let _ = writer.close().await;
    log::debug!("[Ws] Write loop finished for {}", endpoint_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connect;
    use serde_json::json;
    use std::time::Duration;

    async fn next_event(rx: &mut UnboundedReceiver<HubEvent>) -> HubEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .expect("closed")
    }

    #[tokio::test]
    async fn test_text_frames_become_endpoint_messages() {
        let (hub_tx, mut hub_rx) = mpsc::unbounded_channel();
        let server = WsServer::start("127.0.0.1:0", hub_tx).await.unwrap();
        let url = format!("ws://{}", server.local_addr());

        let (mut writer, mut reader) = connect(&url).await.unwrap();
        let outbound = match next_event(&mut hub_rx).await {
            HubEvent::EndpointConnected {
                endpoint_id,
                outbound,
            } => {
                assert!(endpoint_id.starts_with("ws:"));
                outbound
            }
            other => panic!("Expected EndpointConnected, got: {other:?}"),
        };

        writer.send(&json!({"kind": "mirror", "source": "tab"})).await.unwrap();
        writer.send(&json!("just words")).await.unwrap();
        match next_event(&mut hub_rx).await {
            HubEvent::EndpointMessage { msg, .. } => assert_eq!(msg["source"], "tab"),
            other => panic!("Expected EndpointMessage, got: {other:?}"),
        }
        match next_event(&mut hub_rx).await {
            HubEvent::EndpointMessage { msg, .. } => assert_eq!(msg, json!("just words")),
            other => panic!("Expected EndpointMessage, got: {other:?}"),
        }

        outbound.send(json!({"relayed": 1})).unwrap();
        match tokio::time::timeout(Duration::from_secs(2), reader.next_message()).await.unwrap() {
            Some(Ok(Inbound::Message(msg))) => assert_eq!(msg, json!({"relayed": 1})),
            other => panic!("Expected relayed message, got: {other:?}"),
        }

        writer.close().await.unwrap();
        assert!(matches!(
            next_event(&mut hub_rx).await,
            HubEvent::EndpointDisconnected { .. }
        ));
        server.shutdown();
    }
}
