//! Errors surfaced by the bridge.

/// Errors that can occur during bridge operations.
///
/// `NoHandler` and `HandlerFailure` never reach the caller that sent a
/// request as `Err`; they travel inside the reply payload as `{"error": ..}`
/// using their `Display` text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Send attempted while disconnected.
    NotConnected,
    /// No reply arrived within the request window.
    Timeout,
    /// The pending request was invalidated by a disconnect.
    Disconnected,
    /// The request's action has no registered handler.
    NoHandler,
    /// A registered handler returned an error or panicked.
    HandlerFailure(String),
    /// The relay connection could not be opened or written to.
    Transport(String),
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "Bridge not connected"),
            Self::Timeout => write!(f, "Request timed out"),
            Self::Disconnected => write!(f, "Bridge disconnected"),
            // Wire value: peers match on this exact string.
            Self::NoHandler => write!(f, "no-handler"),
            Self::HandlerFailure(msg) => write!(f, "{msg}"),
            Self::Transport(msg) => write!(f, "Transport error: {msg}"),
        }
    }
}

impl std::error::Error for BridgeError {}
