//! Unix domain socket server for IPC
//!
//! Answers status requests and, once a client subscribes, pushes every
//! engine event to it until it disconnects.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use crate::backends::StatusBoard;
use crate::events::EngineEvent;
use crate::state::ModeReader;

use super::protocol::{DaemonStatus, Notification, Request, Response};

/// Largest accepted request body
const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

/// What client handlers read from
struct Shared {
    mode: ModeReader,
    board: Arc<StatusBoard>,
    events: broadcast::Sender<EngineEvent>,
    start_time: Instant,
}

impl Server {
    /// Bind the socket. Must be called from within a tokio runtime.
    pub fn new(
        socket_path: &Path,
        mode: ModeReader,
        board: Arc<StatusBoard>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            shared: Arc::new(Shared {
                mode,
                board,
                events,
                start_time: Instant::now(),
            }),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let shared = Arc::clone(&self.shared);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, shared) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, shared: Arc<Shared>) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_LEN {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            let mut msg_buf = vec![0u8; len];
            reader.read_exact(&mut msg_buf).await?;

            let request: Request = match serde_json::from_slice(&msg_buf) {
                Ok(request) => request,
                Err(e) => {
                    debug!(?e, "malformed request");
                    let response = Response::Error {
                        code: "bad_request".to_string(),
                        message: e.to_string(),
                    };
                    Self::send_message(&mut writer, &response).await?;
                    continue;
                }
            };

            debug!(?request, "received request");

            if let Request::Subscribe = request {
                // Subscribe before confirming so no event is missed
                let events = shared.events.subscribe();
                Self::send_message(&mut writer, &Response::Subscribed).await?;
                debug!("client subscribed to notifications");
                return Self::push_events(reader, writer, events).await;
            }

            let response = Self::process_request(request, &shared);
            Self::send_message(&mut writer, &response).await?;
        }
    }

    /// Forward events until the client goes away. Anything the client
    /// sends on a subscribed connection is ignored.
    async fn push_events<R, W>(
        mut reader: R,
        mut writer: W,
        mut events: broadcast::Receiver<EngineEvent>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut discard = [0u8; 256];

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        Self::send_message(&mut writer, &Notification::Event(event)).await?;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber lagged, events dropped");
                    }
                    Err(RecvError::Closed) => return Ok(()),
                },
                read = reader.read(&mut discard) => {
                    if read? == 0 {
                        debug!("subscriber disconnected");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        T: serde::Serialize,
    {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    fn process_request(request: Request, shared: &Shared) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => Response::Status(DaemonStatus {
                mode: shared.mode.kind(),
                channels: shared.board.snapshot(),
                uptime_secs: shared.start_time.elapsed().as_secs(),
                ..DaemonStatus::default()
            }),

            // Handled by the connection loop
            Request::Subscribe => Response::Subscribed,
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}
