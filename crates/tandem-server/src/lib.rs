//! Tandem relay server.
//!
//! Production runtime around [`tandem_core`]: a TCP transport speaking
//! newline-delimited JSON, a [`Hub`] that serializes pairing operations
//! behind one lock, and a [`ChannelRelay`] that carries the resulting notices
//! and messages to each connection's writer.
//!
//! # Architecture
//!
//! [`tandem_core::PairingService`] is pure logic: it takes an event and
//! returns actions. This crate does the I/O. Each connection task reads client
//! lines, turns them into [`tandem_core::PairingEvent`]s and hands them to the
//! hub. The hub runs the operation under its lock, releases the lock, then
//! passes every action to the relay, which pushes into the recipient's bounded
//! outbound queue.
//!
//! # Components
//!
//! - [`Server`]: accept loop and per-connection tasks
//! - [`Hub`]: shared pairing service plus action execution
//! - [`Relay`] / [`ChannelRelay`]: delivery seam and its channel-backed impl
//! - [`ConnectionRegistry`]: session ↔ user mapping, one session per user
//! - [`TcpTransport`]: listening socket and line framing

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod hub;
pub mod protocol;
mod registry;
mod relay;
mod transport;

use std::{sync::Arc, time::Duration};

pub use error::ServerError;
pub use hub::Hub;
use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use registry::{ConnectionRegistry, SessionInfo};
pub use relay::{ChannelRelay, Relay, RelayError};
use tandem_core::UserId;
use tokio::sync::mpsc;
pub use transport::{LineReader, LineWriter, TcpConnection, TcpTransport};

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:7878")
    pub bind_address: String,
    /// Maximum concurrent connections, identified or not
    pub max_connections: usize,
    /// How long a new connection may take to say hello
    pub hello_timeout: Duration,
    /// Per-connection outbound queue length
    pub outbound_capacity: usize,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7878".to_string(),
            max_connections: 10_000,
            hello_timeout: Duration::from_secs(10),
            outbound_capacity: 64,
        }
    }
}

impl ServerRuntimeConfig {
    /// Reject settings the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.max_connections == 0 {
            return Err(ServerError::Config("max_connections must be at least 1".to_string()));
        }
        if self.outbound_capacity == 0 {
            return Err(ServerError::Config("outbound_capacity must be at least 1".to_string()));
        }
        if self.hello_timeout.is_zero() {
            return Err(ServerError::Config("hello_timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Production Tandem server.
pub struct Server {
    hub: Hub<ChannelRelay>,
    transport: TcpTransport,
    config: Arc<ServerRuntimeConfig>,
}

impl Server {
    /// Validate `config` and bind the listening socket.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let transport = TcpTransport::bind(&config.bind_address).await?;
        let hub = Hub::new(Arc::new(ChannelRelay::new()));

        Ok(Self { hub, transport, config: Arc::new(config) })
    }

    /// Handle to the shared pairing state.
    pub fn hub(&self) -> &Hub<ChannelRelay> {
        &self.hub
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Run the server, accepting connections until the task is dropped.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let hub = self.hub.clone();
                    let config = Arc::clone(&self.config);

                    tokio::spawn(async move {
                        let peer = conn.remote_addr();
                        if let Err(e) = handle_connection(conn, hub, config).await {
                            tracing::debug!(%peer, "Connection error: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }
}

/// Random session ID from the OS RNG.
fn new_session_id() -> Result<u64, ServerError> {
    let mut buf = [0u8; 8];
    getrandom::fill(&mut buf)
        .map_err(|e| ServerError::Internal(format!("OS RNG unavailable: {e}")))?;
    Ok(u64::from_le_bytes(buf))
}

/// Handle a single client connection from accept to close.
async fn handle_connection(
    conn: TcpConnection,
    hub: Hub<ChannelRelay>,
    config: Arc<ServerRuntimeConfig>,
) -> Result<(), ServerError> {
    let session_id = new_session_id()?;
    let peer = conn.remote_addr();
    let (mut reader, mut writer) = conn.into_split();
    let (tx, rx) = mpsc::channel(config.outbound_capacity);

    if !hub.relay().attach(session_id, Some(peer), tx, config.max_connections).await {
        tracing::warn!(%peer, "Connection limit reached, refusing");
        let full = ServerMessage::Error { message: "server full".to_string() };
        writer.send(&full).await?;
        return Ok(());
    }

    tracing::debug!(%peer, session_id, "New connection");

    let result = serve(session_id, &mut reader, &mut writer, rx, &hub, &config).await;

    match hub.close_session(session_id).await {
        Some(SessionInfo { user: Some(user), peer }) => {
            tracing::info!(%user, ?peer, "User disconnected");
        },
        Some(SessionInfo { user: None, peer }) => {
            tracing::debug!(?peer, session_id, "Anonymous connection closed");
        },
        None => {},
    }
    if let Err(e) = writer.shutdown().await {
        tracing::debug!(%peer, "Shutdown failed: {}", e);
    }

    result
}

/// Hello handshake followed by the forwarding loop.
async fn serve(
    session_id: u64,
    reader: &mut LineReader,
    writer: &mut LineWriter,
    mut outbound: mpsc::Receiver<ServerMessage>,
    hub: &Hub<ChannelRelay>,
    config: &ServerRuntimeConfig,
) -> Result<(), ServerError> {
    let user = match read_hello(reader, config.hello_timeout).await {
        Ok(Some(user)) => user,
        Ok(None) => return Ok(()),
        Err(e) => {
            if let Err(send_err) = writer.send(&error_message(&e)).await {
                tracing::debug!(session_id, "Could not report handshake error: {}", send_err);
            }
            return Err(e);
        },
    };

    if let Err(e) = hub.relay().identify(session_id, user).await {
        writer.send(&error_message(&e)).await?;
        return Err(e);
    }

    writer.send(&ServerMessage::Welcome { user_id: user.0 }).await?;
    tracing::info!(%user, session_id, "User connected");

    loop {
        tokio::select! {
            line = reader.next_line() => {
                match line {
                    Ok(Some(line)) => process_line(&line, user, hub, writer).await?,
                    Ok(None) => break,
                    Err(e @ ServerError::Protocol(_)) => {
                        if let Err(send_err) = writer.send(&error_message(&e)).await {
                            tracing::debug!(%user, "Could not report protocol error: {}", send_err);
                        }
                        return Err(e);
                    },
                    Err(e) => return Err(e),
                }
            }

            message = outbound.recv() => {
                match message {
                    Some(message) => writer.send(&message).await?,
                    None => break,
                }
            }
        }
    }

    Ok(())
}

/// Wait for the client's hello. `Ok(None)` if it hung up first.
async fn read_hello(
    reader: &mut LineReader,
    timeout: Duration,
) -> Result<Option<UserId>, ServerError> {
    let line = match tokio::time::timeout(timeout, reader.next_line()).await {
        Ok(line) => line?,
        Err(_) => {
            let millis = timeout.as_millis() as u64;
            return Err(ProtocolError::HelloTimeout { millis }.into());
        },
    };

    let Some(line) = line else {
        return Ok(None);
    };

    match ClientMessage::decode(&line)? {
        ClientMessage::Hello { user_id } => Ok(Some(UserId(user_id))),
        _ => Err(ProtocolError::ExpectedHello.into()),
    }
}

/// Decode one client line and run it through the hub.
///
/// Bad lines and refused operations are answered with an error line; the
/// connection stays open.
async fn process_line(
    line: &str,
    user: UserId,
    hub: &Hub<ChannelRelay>,
    writer: &mut LineWriter,
) -> Result<(), ServerError> {
    let event = match ClientMessage::decode(line).and_then(|message| message.into_event(user)) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(%user, "Rejected client line: {}", e);
            return writer.send(&ServerMessage::Error { message: e.to_string() }).await;
        },
    };

    if hub.handle(event).await.is_err() {
        let message = "request could not be processed".to_string();
        writer.send(&ServerMessage::Error { message }).await?;
    }

    Ok(())
}

/// Client-facing error line. Internal details stay in the logs.
fn error_message(err: &ServerError) -> ServerMessage {
    let message = match err {
        ServerError::Protocol(e) => e.to_string(),
        ServerError::UserAlreadyConnected(_) => "user already connected".to_string(),
        _ => "internal error".to_string(),
    };
    ServerMessage::Error { message }
}
