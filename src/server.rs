//! Listener and lifecycle: one endpoint, one session at a time.

use std::os::unix::fs::FileTypeExt;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::audio::{AudioBackend, AudioSystem, CaptureSource, PlaybackSink};
use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::session::Session;

/// Back-off after a failed `accept`, so a persistent error does not spin.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Listening,
    Serving,
}

/// Unix socket endpoint that removes its socket file when dropped.
struct Endpoint {
    listener: UnixListener,
    path: String,
}

impl Endpoint {
    fn bind(path: &str) -> Result<Self> {
        let bind_err = |source: std::io::Error| BridgeError::Bind {
            path: path.to_string(),
            source,
        };

        // Remove a stale socket left by an earlier run, but nothing else.
        match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_socket() => {
                std::fs::remove_file(path).map_err(bind_err)?;
            }
            Ok(_) => {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "path exists and is not a socket",
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(bind_err(e)),
        }

        let listener = UnixListener::bind(path).map_err(bind_err)?;
        Ok(Self {
            listener,
            path: path.to_string(),
        })
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove socket {}: {}", self.path, e);
            }
        }
    }
}

/// The audio socket server.
///
/// Devices are opened by [`start`](Self::start) and released by
/// [`stop`](Self::stop). Between the two, peers are served one at a time.
pub struct BridgeServer {
    path: String,
    shutdown_timeout: Duration,
    shutdown_tx: watch::Sender<bool>,
    state: Arc<watch::Sender<ServerState>>,
    task: Option<JoinHandle<()>>,
    audio: Option<AudioSystem>,
}

impl BridgeServer {
    /// Bind the endpoint, open playback then capture, and start accepting.
    ///
    /// Any failure here is fatal: nothing is left running and the socket file
    /// is removed.
    pub async fn start(config: &Config, backend: &dyn AudioBackend) -> Result<Self> {
        let endpoint = Endpoint::bind(&config.socket_path)?;
        log::info!("Server started at {}", config.socket_path);

        let audio = AudioSystem::open(backend, &config.audio())?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, _) = watch::channel(ServerState::Listening);
        let state = Arc::new(state_tx);

        let task = tokio::spawn(accept_loop(
            endpoint,
            audio.sink(),
            audio.source(),
            config.buffer_size,
            shutdown_rx,
            state.clone(),
        ));

        Ok(Self {
            path: config.socket_path.clone(),
            shutdown_timeout: config.shutdown_timeout(),
            shutdown_tx,
            state,
            task: Some(task),
            audio: Some(audio),
        })
    }

    pub fn local_path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Stop accepting, end the active session, and release both devices.
    ///
    /// Waits up to the configured shutdown timeout for the session to wind
    /// down, then cancels it forcibly. Device release is bounded by the same
    /// timeout. Errors are logged. Calling `stop` on a stopped server does
    /// nothing.
    pub async fn stop(&mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };
        log::info!("Stopping server at {}", self.path);

        // The accept loop may already be gone, in which case nobody listens.
        let _ = self.shutdown_tx.send(true);

        match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Accept loop failed: {}", e),
            Err(_) => {
                log::warn!(
                    "Session did not stop within {:?}, forcing cancellation",
                    self.shutdown_timeout
                );
                task.abort();
                let _ = task.await;
            }
        }

        if let Some(audio) = self.audio.take() {
            // Closing may wait for a device call in flight to return. Past the
            // timeout the release finishes in the background.
            let release = tokio::task::spawn_blocking(move || audio.stop());
            match tokio::time::timeout(self.shutdown_timeout, release).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("Failed to release audio devices: {}", e),
                Err(_) => log::warn!(
                    "Audio devices not released within {:?}, leaving release in background",
                    self.shutdown_timeout
                ),
            }
        }

        self.state.send_replace(ServerState::Stopped);
        log::info!("Server stopped");
    }
}

impl Drop for BridgeServer {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.shutdown_tx.send(true);
        }
    }
}

async fn accept_loop(
    endpoint: Endpoint,
    sink: Arc<dyn PlaybackSink>,
    source: Arc<dyn CaptureSource>,
    buffer_size: usize,
    mut shutdown: watch::Receiver<bool>,
    state: Arc<watch::Sender<ServerState>>,
) {
    let mut next_id = 1u64;

    loop {
        let accepted = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = endpoint.listener.accept() => accepted,
        };

        let stream = match accepted.and_then(|(stream, _)| {
            let stream = stream.into_std()?;
            stream.set_nonblocking(false)?;
            Ok(stream)
        }) {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("Failed to accept client: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };

        let id = next_id;
        next_id += 1;

        let session = match Session::spawn(id, stream, sink.clone(), source.clone(), buffer_size) {
            Ok(session) => session,
            Err(e) => {
                log::error!("Failed to start session {}: {}", id, e);
                continue;
            }
        };
        log::info!("Accepted client (session {})", id);
        state.send_replace(ServerState::Serving);

        let cancel = session.cancel_handle();
        let mut join = tokio::task::spawn_blocking(move || session.join());
        let finished = tokio::select! {
            joined = &mut join => Some(joined),
            _ = shutdown.changed() => None,
        };
        let (joined, stopping) = match finished {
            Some(joined) => (joined, false),
            None => {
                cancel.cancel();
                (join.await, true)
            }
        };

        match joined {
            Ok(stats) => log::info!("Session {} ended: {:?}", id, stats),
            Err(e) => log::error!("Session {} failed to join: {}", id, e),
        }

        if stopping {
            break;
        }
        state.send_replace(ServerState::Listening);
    }

    log::info!("No longer accepting connections on {}", endpoint.path);
}

