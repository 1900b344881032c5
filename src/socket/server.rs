//! Unix socket listener. Each accepted connection becomes a Hub endpoint
//! with id `socket:<..>`, served by [`endpoint_conn`](super::endpoint_conn).

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::UnixListener;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::endpoint_conn;
use crate::hub::{generate_endpoint_id, HubEvent};

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// `sun_path` holds 104 bytes on macOS and 108 on Linux.
const MAX_SOCKET_PATH: usize = 104;

/// Accepts Unix socket endpoints for the Hub.
#[derive(Debug)]
pub struct SocketServer {
    socket_path: PathBuf,
    accept_handle: JoinHandle<()>,
}

impl SocketServer {
    /// Bind `socket_path` (replacing a stale file) and start accepting.
    ///
    /// The socket file is created with mode 0600.
    ///
    /// # Errors
    ///
    /// Fails if the path is too long or the socket cannot be bound.
    pub fn start(socket_path: PathBuf, hub_event_tx: UnboundedSender<HubEvent>) -> Result<Self> {
        let listener = bind_listener(&socket_path)?;
        log::info!("[Socket] Listening on {}", socket_path.display());

        let accept_handle = tokio::spawn(accept_loop(listener, hub_event_tx, socket_path.clone()));
        Ok(Self {
            socket_path,
            accept_handle,
        })
    }

    /// Stop accepting connections. Already-attached endpoints keep relaying.
    pub fn shutdown(self) {
        self.accept_handle.abort();
    }

    /// Path to the socket file.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

fn bind_listener(path: &Path) -> Result<UnixListener> {
    let len = path.as_os_str().len();
    if len >= MAX_SOCKET_PATH {
        bail!(
            "Socket path too long ({len} bytes, max {}): {}",
            MAX_SOCKET_PATH - 1,
            path.display()
        );
    }

    match fs::remove_file(path) {
        Ok(()) => log::debug!("[Socket] Removed stale socket {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to remove stale socket: {}", path.display()))
        }
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let listener = std::os::unix::net::UnixListener::bind(path)
        .with_context(|| format!("Failed to bind socket: {}", path.display()))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    listener.set_nonblocking(true)?;
    Ok(UnixListener::from_std(listener)?)
}

async fn accept_loop(
    listener: UnixListener,
    hub_event_tx: UnboundedSender<HubEvent>,
    socket_path: PathBuf,
) {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _addr)) => stream,
            Err(e) if !socket_path.exists() => {
                log::info!("[Socket] Socket file removed, stopping accept loop ({e})");
                return;
            }
            Err(e) => {
                log::error!("[Socket] Accept error: {e}");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };

        let endpoint_id = generate_endpoint_id("socket");
        log::info!("[Socket] Endpoint accepted: {}", endpoint_id);
        if !endpoint_conn::attach(endpoint_id, stream, &hub_event_tx) {
            log::warn!("[Socket] Hub event channel closed, stopping accept loop");
            return;
        }
    }
}
