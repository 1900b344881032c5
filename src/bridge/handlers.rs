//! Action handler registry and dispatch.
//!
//! Handlers are registered per action name; the wildcard action `*`
//! receives every inbound action as well. The action's own handlers come
//! first, then wildcard handlers, each list in registration order.
//!
//! A [`Dispatcher`] starts the handlers of each inbound action in that
//! order, and starts actions in the order they arrive. Starting a handler
//! polls it once, so a handler that never awaits has fully run before the
//! next one starts. Handlers that do await keep running concurrently.
//!
//! A handler failure (an `Err` or a panic) is captured as that handler's
//! outcome and never stops the others. A request gets exactly one reply:
//! the first success to settle, or, once every handler has failed, the
//! failure of the earliest handler in dispatch order.
//!
//! # Usage
//!
//! ```ignore
//! let id = bridge.on("echo", handler_fn(|msg| async move { Ok(msg.payload) }));
//! bridge.on("*", handler_fn(|msg| async move {
//!     log::info!("saw {}", msg.action);
//!     Ok(Value::Null)
//! }));
//! bridge.off("echo", Some(id));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use serde_json::Value;

use crate::constants::WILDCARD_ACTION;
use crate::envelope::ReplyPayload;

/// An inbound action as seen by a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionMessage {
    /// Client id of the sender.
    pub source: String,
    /// Action name.
    pub action: String,
    /// Application data.
    pub payload: Value,
    /// Correlation id when the sender expects a reply.
    pub id: Option<String>,
}

/// Failure reported by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError(pub String);

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HandlerError {}

impl From<String> for HandlerError {
    fn from(msg: String) -> Self {
        Self(msg)
    }
}

impl From<&str> for HandlerError {
    fn from(msg: &str) -> Self {
        Self(msg.to_string())
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self(err.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

/// Result type returned by handlers.
pub type HandlerResult = Result<Value, HandlerError>;

/// Something that reacts to an inbound action.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle one message. The returned value becomes the reply `result`
    /// when the message is a request.
    async fn handle(&self, message: ActionMessage) -> HandlerResult;
}

/// Adapter turning an async closure into a [`Handler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(ActionMessage) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, message: ActionMessage) -> HandlerResult {
        (self.f)(message).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(ActionMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Identifier returned by [`HandlerRegistry::on`], used to remove a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Action name → ordered handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<(HandlerId, Arc<dyn Handler>)>>,
    next_id: u64,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("action_count", &self.handlers.len())
            .field("total_handlers", &self.handler_count())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the list for `action`.
    pub fn on(&mut self, action: &str, handler: Arc<dyn Handler>) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers
            .entry(action.to_string())
            .or_default()
            .push((id, handler));
        log::debug!("[Bridge] Registered handler {:?} for '{}'", id, action);
        id
    }

    /// Remove one handler (`Some(id)`) or every handler (`None`) for `action`.
    ///
    /// Returns how many were removed.
    pub fn off(&mut self, action: &str, handler: Option<HandlerId>) -> usize {
        let Some(list) = self.handlers.get_mut(action) else {
            return 0;
        };
        let before = list.len();
        match handler {
            Some(id) => list.retain(|(existing, _)| *existing != id),
            None => list.clear(),
        }
        let removed = before - list.len();
        if list.is_empty() {
            self.handlers.remove(action);
        }
        removed
    }

    /// Handlers that should see `action`: its own first, then wildcard.
    pub fn handlers_for(&self, action: &str) -> Vec<Arc<dyn Handler>> {
        let specific = self.handlers.get(action).into_iter().flatten();
        let wildcard = if action == WILDCARD_ACTION {
            None
        } else {
            self.handlers.get(WILDCARD_ACTION)
        };
        specific
            .chain(wildcard.into_iter().flatten())
            .map(|(_, h)| Arc::clone(h))
            .collect()
    }

    /// Total handlers across all actions.
    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }
}

/// A reply decided by the [`Dispatcher`]: correlation id and payload.
pub type Reply = (String, ReplyPayload);

/// Outcome of one handler run.
struct Settled {
    job: u64,
    index: usize,
    outcome: Result<Value, String>,
}

/// Bookkeeping for one inbound action whose handlers are still running.
#[derive(Debug)]
struct Job {
    action: String,
    /// Correlation id while the reply is still undecided.
    reply_to: Option<String>,
    first_error: Option<(usize, String)>,
    running: usize,
}

/// Runs handlers for inbound actions in arrival order.
///
/// Owned by a single task: [`start`](Self::start) is called for each
/// action as it arrives and [`next_reply`](Self::next_reply) drives the
/// handlers that are still running.
#[derive(Default)]
pub struct Dispatcher {
    jobs: HashMap<u64, Job>,
    running: FuturesUnordered<BoxFuture<'static, Settled>>,
    next_job: u64,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("jobs", &self.jobs.len())
            .field("running", &self.running.len())
            .finish()
    }
}

impl Dispatcher {
    /// Create an idle dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `handlers` for `message`, in order.
    ///
    /// Returns the reply if one is already decided, which is the case when
    /// some handler succeeded without awaiting or every handler failed.
    pub fn start(&mut self, handlers: Vec<Arc<dyn Handler>>, message: ActionMessage) -> Option<Reply> {
        let job_id = self.next_job;
        self.next_job += 1;
        let mut job = Job {
            action: message.action.clone(),
            reply_to: message.id.clone(),
            first_error: None,
            running: 0,
        };

        let mut reply = None;
        for (index, handler) in handlers.into_iter().enumerate() {
            let message = message.clone();
            let mut run = AssertUnwindSafe(async move { handler.handle(message).await })
                .catch_unwind()
                .map(move |outcome| Settled {
                    job: job_id,
                    index,
                    outcome: match outcome {
                        Ok(result) => result.map_err(|e| e.0),
                        Err(panic) => Err(panic_message(panic.as_ref())),
                    },
                })
                .boxed();

            match (&mut run).now_or_never() {
                Some(settled) => {
                    if let Some(decided) = job.settle(settled.index, settled.outcome) {
                        reply = Some(decided);
                    }
                }
                None => {
                    job.running += 1;
                    self.running.push(run);
                }
            }
        }

        if reply.is_none() {
            reply = job.finish_if_idle();
        }
        if job.running > 0 {
            self.jobs.insert(job_id, job);
        }
        reply
    }

    /// Wait for the next running handler to settle.
    ///
    /// Returns `Some` when that settles a reply. Resolves to `None`
    /// immediately when nothing is running.
    pub async fn next_reply(&mut self) -> Option<Reply> {
        let settled = self.running.next().await?;
        let job = self.jobs.get_mut(&settled.job)?;
        job.running -= 1;

        let reply = job
            .settle(settled.index, settled.outcome)
            .or_else(|| job.finish_if_idle());
        if job.running == 0 {
            self.jobs.remove(&settled.job);
        }
        reply
    }

    /// Returns `true` when no handler is running.
    pub fn is_idle(&self) -> bool {
        self.running.is_empty()
    }

    /// Actions that still have a running handler.
    pub fn jobs_in_flight(&self) -> usize {
        self.jobs.len()
    }
}

impl Job {
    /// Record one handler outcome. The first success decides the reply.
    fn settle(&mut self, index: usize, outcome: Result<Value, String>) -> Option<Reply> {
        match outcome {
            Ok(value) => {
                let id = self.reply_to.take()?;
                Some((id, ReplyPayload::Result(value)))
            }
            Err(e) => {
                log::warn!("[Bridge] Handler for '{}' failed: {}", self.action, e);
                if self.first_error.as_ref().map_or(true, |(first, _)| index < *first) {
                    self.first_error = Some((index, e));
                }
                None
            }
        }
    }

    /// Reply with the earliest failure once nothing is left running.
    fn finish_if_idle(&mut self) -> Option<Reply> {
        if self.running > 0 {
            return None;
        }
        let id = self.reply_to.take()?;
        let (_, error) = self.first_error.take()?;
        Some((id, ReplyPayload::Error(error)))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}
