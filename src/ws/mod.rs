//! Relay traffic over WebSocket.
//!
//! Browser tabs cannot open a Unix socket, so the Hub also listens for
//! WebSocket endpoints ([`server`]) and bridges can dial one ([`client`]).
//! One envelope travels per frame, normally as text. Binary frames holding
//! JSON are tolerated. Control frames never reach the relay.
//!
//! [`connect`] and [`accept`] hand back split halves so reading and writing
//! run on separate tasks.

pub mod client;
pub mod server;

use anyhow::{anyhow, Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub use client::WsTransport;
pub use server::WsServer;

/// Stream type produced by [`connect`].
pub type ClientStream = MaybeTlsStream<TcpStream>;

/// Close code reported when the peer sent no status.
const NO_STATUS_CODE: u16 = 1005;

/// What [`WsReader::next_message`] yields.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    /// A relayable message.
    Message(Value),
    /// The peer sent a close frame.
    Closed {
        /// Close status (1000 = normal, 1005 = none given).
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
}

/// Write half of a connection.
#[derive(Debug)]
pub struct WsWriter<S = ClientStream> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send `value` as one text frame.
    ///
    /// # Errors
    ///
    /// Fails once the connection is closed or the socket errors.
    pub async fn send(&mut self, value: &Value) -> Result<()> {
        self.sink
            .send(Message::Text(value.to_string()))
            .await
            .context("WebSocket send failed")
    }

    /// Send a close frame without a status.
    ///
    /// # Errors
    ///
    /// Fails if the connection is already gone.
    pub async fn close(&mut self) -> Result<()> {
        self.sink
            .send(Message::Close(None))
            .await
            .context("WebSocket close failed")
    }
}

/// Read half of a connection.
#[derive(Debug)]
pub struct WsReader<S = ClientStream> {
    stream: SplitStream<WebSocketStream<S>>,
}

impl<S> WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Next relayable message or close, `None` once the stream ends.
    ///
    /// Ping, pong and binary frames that are not JSON are skipped.
    pub async fn next_message(&mut self) -> Option<Result<Inbound>> {
        while let Some(frame) = self.stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => return Some(Err(anyhow!("WebSocket read error: {e}"))),
            };
            match frame {
                Message::Text(text) => return Some(Ok(Inbound::Message(text_to_value(&text)))),
                Message::Binary(data) => match serde_json::from_slice(&data) {
                    Ok(value) => return Some(Ok(Inbound::Message(value))),
                    Err(_) => log::debug!("[Ws] Skipping non-JSON binary frame"),
                },
                Message::Close(frame) => {
                    let (code, reason) = frame.map_or((NO_STATUS_CODE, String::new()), |f| {
                        (u16::from(f.code), f.reason.into_owned())
                    });
                    return Some(Ok(Inbound::Closed { code, reason }));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        None
    }
}

/// Interpret a text frame as relay traffic.
///
/// Text that is not JSON is kept as a JSON string so plain mirror payloads
/// survive the relay.
pub fn text_to_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Dial `url` (`ws://` or `wss://`) and split the connection.
///
/// # Errors
///
/// Fails if the URL is invalid or the handshake does not complete.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let (ws, _response) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("WebSocket connect to {url} failed"))?;
    let (sink, stream) = ws.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Complete the server handshake on an accepted TCP stream and split it.
///
/// # Errors
///
/// Fails if the peer does not speak WebSocket.
pub async fn accept(stream: TcpStream) -> Result<(WsWriter<TcpStream>, WsReader<TcpStream>)> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .context("WebSocket handshake failed")?;
    let (sink, stream) = ws.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}
