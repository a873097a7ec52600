//! Delivery of pairing actions to connected users.
//!
//! [`Relay`] is the seam between the pairing core and whatever transport
//! carries messages. The core emits [`PairingAction`]s; the hub hands each one
//! to a relay after releasing the service lock.
//!
//! [`ChannelRelay`] is the production relay: every connection owns a bounded
//! outbound queue drained by its writer task, and the relay pushes into that
//! queue without waiting. A slow reader loses messages instead of stalling
//! everyone else.
//!
//! [`PairingAction`]: tandem_core::PairingAction

use std::{collections::HashMap, future::Future, net::SocketAddr};

use tandem_core::{Notice, Payload, UserId};
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};

use crate::{
    error::ServerError,
    protocol::ServerMessage,
    registry::{ConnectionRegistry, SessionInfo},
};

/// Errors delivering to a single user.
///
/// Delivery failures never undo pairing state. They are logged and dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// No live connection for this user
    #[error("user {0} is not connected")]
    UserNotConnected(UserId),

    /// The user's outbound queue is full
    #[error("outbound queue full for user {0}")]
    QueueFull(UserId),

    /// The user's connection is shutting down
    #[error("connection closed for user {0}")]
    Closed(UserId),
}

/// Carries notices and payloads to users.
pub trait Relay: Send + Sync + 'static {
    /// Send a notice to `user`.
    fn notify(
        &self,
        user: UserId,
        notice: Notice,
    ) -> impl Future<Output = Result<(), RelayError>> + Send;

    /// Forward a partner's payload to `recipient`.
    fn deliver(
        &self,
        recipient: UserId,
        payload: Payload,
    ) -> impl Future<Output = Result<(), RelayError>> + Send;
}

/// Connection table behind the relay lock.
#[derive(Debug, Default)]
struct Connections {
    registry: ConnectionRegistry,
    outbound: HashMap<u64, mpsc::Sender<ServerMessage>>,
}

/// Relay backed by per-connection bounded channels.
#[derive(Debug, Default)]
pub struct ChannelRelay {
    connections: RwLock<Connections>,
}

impl ChannelRelay {
    /// Create an empty relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted connection and its outbound queue.
    ///
    /// Returns `false` without registering if `max_sessions` connections are
    /// already attached or the session ID is taken.
    pub async fn attach(
        &self,
        session_id: u64,
        peer: Option<SocketAddr>,
        outbound: mpsc::Sender<ServerMessage>,
        max_sessions: usize,
    ) -> bool {
        let mut conns = self.connections.write().await;
        if conns.registry.session_count() >= max_sessions {
            return false;
        }
        if !conns.registry.register_session(session_id, peer) {
            return false;
        }
        conns.outbound.insert(session_id, outbound);
        true
    }

    /// Bind an attached connection to `user` after hello.
    pub async fn identify(&self, session_id: u64, user: UserId) -> Result<(), ServerError> {
        let mut conns = self.connections.write().await;
        if !conns.registry.has_session(session_id) {
            return Err(ServerError::Internal(format!("session {session_id} not attached")));
        }
        if conns.registry.identify(session_id, user) {
            Ok(())
        } else {
            Err(ServerError::UserAlreadyConnected(user))
        }
    }

    /// User bound to an attached connection, if it has said hello.
    pub async fn user_for_session(&self, session_id: u64) -> Option<UserId> {
        self.connections.read().await.registry.session(session_id).and_then(|info| info.user)
    }

    /// Remove a connection and return what was registered for it.
    pub async fn detach(&self, session_id: u64) -> Option<SessionInfo> {
        let mut conns = self.connections.write().await;
        conns.outbound.remove(&session_id);
        conns.registry.unregister_session(session_id)
    }

    /// Number of attached connections.
    pub async fn session_count(&self) -> usize {
        self.connections.read().await.registry.session_count()
    }

    async fn push(&self, user: UserId, message: ServerMessage) -> Result<(), RelayError> {
        let conns = self.connections.read().await;
        let sender = conns
            .registry
            .session_id_for_user(user)
            .and_then(|session_id| conns.outbound.get(&session_id))
            .ok_or(RelayError::UserNotConnected(user))?;

        sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RelayError::QueueFull(user),
            mpsc::error::TrySendError::Closed(_) => RelayError::Closed(user),
        })
    }
}

impl Relay for ChannelRelay {
    async fn notify(&self, user: UserId, notice: Notice) -> Result<(), RelayError> {
        self.push(user, ServerMessage::from(&notice)).await
    }

    async fn deliver(&self, recipient: UserId, payload: Payload) -> Result<(), RelayError> {
        self.push(recipient, ServerMessage::delivery(&payload)).await
    }
}
