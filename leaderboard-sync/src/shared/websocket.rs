/// WebSocket connection manager for the leaderboard push channel
///
/// Owns the duplex connection lifecycle: connects, parses inbound frames into
/// snapshots, and reconnects after a fixed delay for as long as it is running.
use crate::shared::{
    error::SyncError,
    types::{FrameEnvelope, FrameKind, LeaderboardEntry, RevisionClock, Snapshot, SourceKind},
};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::{fmt, sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Callback receiving every snapshot a producer decodes
pub type SnapshotHandler = Arc<dyn Fn(Snapshot) + Send + Sync>;

/// WebSocket client configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// WebSocket server URL
    pub url: String,
    /// Ping interval to keep connection alive
    pub ping_interval: Duration,
    /// Reconnection delay after disconnect
    pub reconnect_delay: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3000/api/ws".to_string(),
            ping_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl WebSocketConfig {
    /// Create a new configuration with custom URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set ping interval
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Push channel connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Connected => "Live",
            ConnectionState::Disconnected => "Disconnected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Manages the `/api/ws` connection.
///
/// The state machine is `Connecting -> Connected -> Disconnected -> Connecting ...`
/// and is only ever written by the connection task. Readers use [`Self::state`] or
/// [`Self::watch_state`].
pub struct ConnectionManager {
    config: WebSocketConfig,
    clock: RevisionClock,
    handler: Arc<RwLock<Option<SnapshotHandler>>>,
    state_tx: watch::Sender<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new(config: WebSocketConfig, clock: RevisionClock) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            clock,
            handler: Arc::new(RwLock::new(None)),
            state_tx,
            task: None,
        }
    }

    /// Register the callback invoked with each successfully parsed snapshot.
    /// Replaces any previously registered handler.
    pub fn on_snapshot<F>(&mut self, handler: F)
    where
        F: Fn(Snapshot) + Send + Sync + 'static,
    {
        *self.handler.write() = Some(Arc::new(handler));
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Begin connecting. Calling `start` on a running manager is a no-op, so at
    /// most one connection loop (and thus one reconnect attempt) exists.
    pub fn start(&mut self) {
        if self.is_running() {
            debug!("ConnectionManager already running");
            return;
        }

        self.state_tx.send_replace(ConnectionState::Connecting);
        self.task = Some(tokio::spawn(run_connection_loop(
            self.config.clone(),
            self.clock.clone(),
            Arc::clone(&self.handler),
            self.state_tx.clone(),
        )));
    }

    /// Close the connection and cancel any pending reconnect. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!(url = %self.config.url, "leaderboard websocket stopped");
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Decode one text frame.
///
/// Returns `Ok(None)` for frames of unrecognised type, which are ignored.
pub fn decode_frame(text: &str, clock: &RevisionClock) -> Result<Option<Snapshot>, SyncError> {
    let envelope: FrameEnvelope = serde_json::from_str(text)?;

    match envelope.kind {
        FrameKind::Initial | FrameKind::LeaderboardUpdated | FrameKind::PeriodicUpdate => {
            let entries: Vec<LeaderboardEntry> = if envelope.data.is_null() {
                Vec::new()
            } else {
                serde_json::from_value(envelope.data)?
            };
            let revision = match envelope.revision {
                Some(revision) => {
                    clock.observe(revision);
                    revision
                }
                None => clock.next(),
            };
            Ok(Some(Snapshot::new(entries, revision, SourceKind::Push)))
        }
        FrameKind::Unknown => Ok(None),
    }
}

/// Main WebSocket connection loop with auto-reconnect
async fn run_connection_loop(
    config: WebSocketConfig,
    clock: RevisionClock,
    handler: Arc<RwLock<Option<SnapshotHandler>>>,
    state_tx: watch::Sender<ConnectionState>,
) {
    info!(url = %config.url, "starting leaderboard websocket");

    loop {
        state_tx.send_replace(ConnectionState::Connecting);

        match connect_async(config.url.as_str()).await {
            Ok((ws_stream, _)) => {
                info!(url = %config.url, "connected to leaderboard websocket");
                state_tx.send_replace(ConnectionState::Connected);

                let (mut write, mut read) = ws_stream.split();
                let mut ping = tokio::time::interval(config.ping_interval);
                ping.tick().await;

                loop {
                    tokio::select! {
                        _ = ping.tick() => {
                            if write.send(Message::Ping(Vec::<u8>::new().into())).await.is_err() {
                                debug!("Failed to send ping, connection likely dead");
                                break;
                            }
                        }
                        message = read.next() => match message {
                            Some(Ok(Message::Text(text))) => {
                                match decode_frame(text.as_str(), &clock) {
                                    Ok(Some(snapshot)) => {
                                        debug!(
                                            revision = snapshot.revision,
                                            entries = snapshot.entries.len(),
                                            "received leaderboard push"
                                        );
                                        let current = handler.read().clone();
                                        match current {
                                            Some(handler) => handler(snapshot),
                                            None => debug!("no snapshot handler registered, dropping push"),
                                        }
                                    }
                                    Ok(None) => debug!("ignoring frame of unrecognised type"),
                                    Err(error) => {
                                        warn!(%error, "dropping malformed leaderboard frame");
                                        debug!("Raw message: {}", text.as_str().chars().take(200).collect::<String>());
                                    }
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                info!(?frame, "server closed leaderboard websocket");
                                break;
                            }
                            Some(Ok(_)) => {
                                // Ping/Pong/Binary: heartbeats are answered by tungstenite
                            }
                            Some(Err(error)) => {
                                warn!(error = %SyncError::from(error), "leaderboard websocket error");
                                break;
                            }
                            None => {
                                warn!("leaderboard websocket stream ended");
                                break;
                            }
                        }
                    }
                }

                state_tx.send_replace(ConnectionState::Disconnected);
            }
            Err(error) => {
                warn!(url = %config.url, error = %SyncError::from(error), "failed to connect to leaderboard websocket");
                state_tx.send_replace(ConnectionState::Disconnected);
            }
        }

        debug!(
            "Waiting {:?} before reconnecting...",
            config.reconnect_delay
        );
        tokio::time::sleep(config.reconnect_delay).await;
    }
}
