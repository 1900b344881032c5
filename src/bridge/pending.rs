//! Outstanding requests awaiting a reply.
//!
//! Each entry owns the oneshot that completes the caller's future and the
//! timeout timer for that request. An entry leaves the table exactly once,
//! through a matching reply, its timeout, or a disconnect; the timer is
//! dropped (and thereby cancelled) before the caller is woken.

use std::collections::HashMap;

use tokio::sync::oneshot;

use super::error::BridgeError;
use crate::envelope::ReplyPayload;
use crate::timer::ScopedTask;

/// Channel completing a caller's `send_request` future.
pub type ReplySender = oneshot::Sender<Result<ReplyPayload, BridgeError>>;

/// One request in flight.
#[derive(Debug)]
pub struct PendingRequest {
    reply_tx: ReplySender,
    timeout: ScopedTask,
}

impl PendingRequest {
    /// Pair the caller's completion channel with its timeout timer.
    pub fn new(reply_tx: ReplySender, timeout: ScopedTask) -> Self {
        Self { reply_tx, timeout }
    }

    /// Complete with the reply payload.
    pub fn resolve(self, reply: ReplyPayload) {
        self.finish(Ok(reply));
    }

    /// Complete with an error.
    pub fn fail(self, err: BridgeError) {
        self.finish(Err(err));
    }

    fn finish(self, outcome: Result<ReplyPayload, BridgeError>) {
        let Self { reply_tx, timeout } = self;
        drop(timeout);
        // Caller may have stopped waiting; nothing to do then.
        let _ = reply_tx.send(outcome);
    }
}

/// Correlation id → pending request.
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: HashMap<String, PendingRequest>,
}

impl PendingRequests {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new request.
    pub fn insert(&mut self, id: String, request: PendingRequest) {
        self.entries.insert(id, request);
    }

    /// Remove the entry for `id`, if it is still outstanding.
    pub fn take(&mut self, id: &str) -> Option<PendingRequest> {
        self.entries.remove(id)
    }

    /// Remove every entry.
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        self.entries.drain().map(|(_, request)| request).collect()
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending() -> (PendingRequest, oneshot::Receiver<Result<ReplyPayload, BridgeError>>) {
        let (tx, rx) = oneshot::channel();
        let timer = ScopedTask::spawn(std::future::pending());
        (PendingRequest::new(tx, timer), rx)
    }

    #[tokio::test]
    async fn test_take_removes_once() {
        let mut table = PendingRequests::new();
        let (request, rx) = pending();
        table.insert("main-1".into(), request);
        assert_eq!(table.len(), 1);

        let request = table.take("main-1").expect("entry present");
        assert!(table.take("main-1").is_none());
        assert!(table.is_empty());

        request.resolve(ReplyPayload::Result(json!("pong")));
        assert_eq!(rx.await.unwrap(), Ok(ReplyPayload::Result(json!("pong"))));
    }

    #[tokio::test]
    async fn test_drain_fails_everything() {
        let mut table = PendingRequests::new();
        let (a, rx_a) = pending();
        let (b, rx_b) = pending();
        table.insert("main-1".into(), a);
        table.insert("main-2".into(), b);

        for request in table.drain() {
            request.fail(BridgeError::Disconnected);
        }
        assert!(table.is_empty());
        assert_eq!(rx_a.await.unwrap(), Err(BridgeError::Disconnected));
        assert_eq!(rx_b.await.unwrap(), Err(BridgeError::Disconnected));
    }

    #[tokio::test]
    async fn test_resolve_after_caller_gone_is_harmless() {
        let (request, rx) = pending();
        drop(rx);
        request.fail(BridgeError::Timeout);
    }
}
