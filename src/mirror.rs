//! Shared text content mirrored across bridges.
//!
//! A `ContentMirror` keeps one string in sync with every peer on the relay:
//! local edits are broadcast as `content:update`, incoming updates replace
//! the local copy without being re-broadcast, and a newcomer can pull the
//! current text with a `content:get` request.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::watch;

use crate::bridge::{handler_fn, Bridge, BridgeError, HandlerError, HandlerId};
use crate::envelope::ReplyPayload;

/// Notification carrying `{"text": ..}` after a local edit.
pub const CONTENT_UPDATE: &str = "content:update";

/// Request answered with `{"text": ..}`.
pub const CONTENT_GET: &str = "content:get";

/// Text content kept in sync through a [`Bridge`].
#[derive(Debug)]
pub struct ContentMirror {
    bridge: Bridge,
    text: Arc<watch::Sender<String>>,
    update_handler: HandlerId,
    get_handler: HandlerId,
}

impl ContentMirror {
    /// Register the mirror's handlers on `bridge`, starting from empty text.
    pub fn attach(bridge: &Bridge) -> Self {
        let (text, _) = watch::channel(String::new());
        let text = Arc::new(text);

        let updates = Arc::clone(&text);
        let update_handler = bridge.on(
            CONTENT_UPDATE,
            handler_fn(move |msg| {
                let updates = Arc::clone(&updates);
                async move {
                    let Some(incoming) = text_field(&msg.payload) else {
                        return Err(HandlerError::from("content:update without text"));
                    };
                    log::debug!("[Mirror] Update from {} ({} bytes)", msg.source, incoming.len());
                    updates.send_replace(incoming);
                    Ok(Value::Null)
                }
            }),
        );

        let reads = Arc::clone(&text);
        let get_handler = bridge.on(
            CONTENT_GET,
            handler_fn(move |_msg| {
                let current = reads.borrow().clone();
                async move { Ok(json!({ "text": current })) }
            }),
        );

        Self {
            bridge: bridge.clone(),
            text,
            update_handler,
            get_handler,
        }
    }

    /// Current text.
    pub fn text(&self) -> String {
        self.text.borrow().clone()
    }

    /// Watch the text; the receiver sees every remote and local change.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.text.subscribe()
    }

    /// Replace the text locally and broadcast it to peers.
    ///
    /// The local copy is updated even when the broadcast fails.
    ///
    /// # Errors
    ///
    /// Returns the bridge error if the update could not be sent.
    pub fn edit(&self, text: impl Into<String>) -> Result<(), BridgeError> {
        let text = text.into();
        self.text.send_replace(text.clone());
        self.bridge
            .send_notification(CONTENT_UPDATE, json!({ "text": text }))
    }

    /// Apply a plain-text payload from a client that predates actions.
    pub fn apply_remote(&self, text: impl Into<String>) {
        self.text.send_replace(text.into());
    }

    /// Ask peers for their text and adopt the first answer.
    ///
    /// Returns `Ok(true)` if the text was replaced, `Ok(false)` if the peer
    /// that answered first could not provide it (e.g. `no-handler`).
    ///
    /// # Errors
    ///
    /// `NotConnected`, `Timeout` or `Disconnected` from the request.
    pub async fn sync_from_peers(&self) -> Result<bool, BridgeError> {
        match self.bridge.send_request(CONTENT_GET, Value::Null).await? {
            ReplyPayload::Result(result) => match text_field(&result) {
                Some(text) => {
                    self.text.send_replace(text);
                    Ok(true)
                }
                None => Ok(false),
            },
            ReplyPayload::Error(e) => {
                log::debug!("[Mirror] Sync declined: {e}");
                Ok(false)
            }
        }
    }

    /// Unregister the mirror's handlers.
    pub fn detach(self) {
        self.bridge.off(CONTENT_UPDATE, Some(self.update_handler));
        self.bridge.off(CONTENT_GET, Some(self.get_handler));
    }
}

fn text_field(payload: &Value) -> Option<String> {
    payload.get("text")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::LocalTransport;
    use crate::hub::HubHandle;
    use std::time::Duration;

    async fn connected_pair() -> (Bridge, Bridge) {
        let (hub, _task) = HubHandle::spawn();
        let main = Bridge::new("main", LocalTransport::new(hub.clone()));
        let sub = Bridge::new("sub", LocalTransport::new(hub));
        main.connect().await.unwrap();
        sub.connect().await.unwrap();
        (main, sub)
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_reaches_peer() {
        let (main, sub) = connected_pair().await;
        let main_mirror = ContentMirror::attach(&main);
        let sub_mirror = ContentMirror::attach(&sub);
        let mut watcher = sub_mirror.subscribe();

        main_mirror.edit("hello").unwrap();
        tokio::time::timeout(Duration::from_secs(1), watcher.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub_mirror.text(), "hello");
        assert_eq!(main_mirror.text(), "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_from_peers_adopts_text() {
        let (main, sub) = connected_pair().await;
        let main_mirror = ContentMirror::attach(&main);
        main_mirror.apply_remote("already here");

        let sub_mirror = ContentMirror::attach(&sub);
        assert_eq!(sub_mirror.sync_from_peers().await, Ok(true));
        assert_eq!(sub_mirror.text(), "already here");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_declined_without_peer_mirror() {
        let (_main, sub) = connected_pair().await;
        let sub_mirror = ContentMirror::attach(&sub);
        assert_eq!(sub_mirror.sync_from_peers().await, Ok(false));
        assert_eq!(sub_mirror.text(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_while_disconnected_keeps_local_text() {
        let (hub, _task) = HubHandle::spawn();
        let bridge = Bridge::new("main", LocalTransport::new(hub));
        let mirror = ContentMirror::attach(&bridge);

        assert_eq!(mirror.edit("draft"), Err(BridgeError::NotConnected));
        assert_eq!(mirror.text(), "draft");
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_unregisters_handlers() {
        let (main, sub) = connected_pair().await;
        let main_mirror = ContentMirror::attach(&main);
        main_mirror.detach();

        let reply = sub.send_request(CONTENT_GET, Value::Null).await.unwrap();
        assert_eq!(reply, ReplyPayload::Error("no-handler".into()));
    }
}
