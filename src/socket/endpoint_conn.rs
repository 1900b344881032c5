//! Per-connection tasks for socket endpoints (Hub-side).
//!
//! Each accepted socket connection is announced to the Hub and gets two
//! detached tasks:
//! - Read task: decodes frames from the socket → `HubEvent::EndpointMessage`
//! - Write task: receives messages from the Hub → encodes → writes to socket
//!
//! The write task ends when the Hub drops the endpoint's outbound sender
//! (on disconnect or Hub shutdown), which closes the socket's write half.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::framing::{encode_json, FrameDecoder};
use crate::constants::SOCKET_READ_BUFFER;
use crate::hub::{EndpointId, HubEvent};
use serde_json::Value;

/// Register `stream` with the Hub and start its read/write tasks.
///
/// Returns `false` if the Hub event channel is closed.
pub(crate) fn attach(
    endpoint_id: EndpointId,
    stream: UnixStream,
    hub_event_tx: &UnboundedSender<HubEvent>,
) -> bool {
    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Value>();

    // Announce before reading so the Hub knows the endpoint before its first message.
    if hub_event_tx
        .send(HubEvent::EndpointConnected {
            endpoint_id: endpoint_id.clone(),
            outbound: outbound_tx,
        })
        .is_err()
    {
        return false;
    }

    tokio::spawn(write_loop(endpoint_id.clone(), write_half, outbound_rx));
    tokio::spawn(read_loop(endpoint_id, read_half, hub_event_tx.clone()));
    true
}

/// Decode frames from the socket into `EndpointMessage` events.
async fn read_loop(
    endpoint_id: EndpointId,
    mut reader: OwnedReadHalf,
    hub_event_tx: UnboundedSender<HubEvent>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; SOCKET_READ_BUFFER];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                log::info!("[Socket] Endpoint closed: {}", endpoint_id);
                break;
            }
            Ok(n) => match decoder.feed(&buf[..n]) {
                Ok(messages) => {
                    for msg in messages {
                        let event = HubEvent::EndpointMessage {
                            endpoint_id: endpoint_id.clone(),
                            msg,
                        };
                        if hub_event_tx.send(event).is_err() {
                            return; // Hub stopped
                        }
                    }
                }
                Err(e) => {
                    log::error!("[Socket] Frame decode error for {}: {e}", endpoint_id);
                    break;
                }
            },
            Err(e) => {
                log::error!("[Socket] Read error for {}: {e}", endpoint_id);
                break;
            }
        }
    }

    let _ = hub_event_tx.send(HubEvent::EndpointDisconnected { endpoint_id });
}

/// Frame and write everything the Hub relays to this endpoint.
async fn write_loop(
    endpoint_id: EndpointId,
    mut writer: OwnedWriteHalf,
    mut outbound_rx: UnboundedReceiver<Value>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = writer.write_all(&encode_json(&msg)).await {
            log::error!("[Socket] Write error for {}: {e}", endpoint_id);
            break;
        }
    }
    log::debug!("[Socket] Write loop finished for {}", endpoint_id);
}
