//! Server error types.

use std::fmt;

use tandem_core::{PairingError, UserId};

use crate::protocol::ProtocolError;

/// Errors that can occur in the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, zero capacity, etc.).
    ///
    /// Fatal at startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error (bind failure, I/O error on a socket).
    ///
    /// Fatal for the affected connection; the server keeps serving others.
    Transport(String),

    /// Client sent something the wire protocol does not allow.
    ///
    /// Fatal for that connection.
    Protocol(ProtocolError),

    /// A second connection tried to claim a user that is already connected.
    ///
    /// One connection per user keeps notice routing unambiguous. The new
    /// connection is rejected; the existing one is unaffected.
    UserAlreadyConnected(UserId),

    /// Internal server error (lock poisoning, task failure).
    ///
    /// Indicates a bug. Logged and the connection is closed.
    Internal(String),

    /// Pairing core reported a bug (invalid transition, double pairing).
    ///
    /// The core guarantees nothing was mutated. Logged for operators, never
    /// shown to users.
    Pairing(PairingError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(err) => write!(f, "protocol error: {err}"),
            Self::UserAlreadyConnected(user) => write!(f, "user {user} is already connected"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Pairing(err) => write!(f, "pairing error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protocol(err) => Some(err),
            Self::Pairing(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PairingError> for ServerError {
    fn from(err: PairingError) -> Self {
        Self::Pairing(err)
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use tandem_core::UserState;

    use super::*;

    #[test]
    fn server_error_display() {
        let err = ServerError::Config("bad address".to_string());
        assert_eq!(err.to_string(), "configuration error: bad address");

        let err = ServerError::UserAlreadyConnected(UserId(9));
        assert_eq!(err.to_string(), "user 9 is already connected");

        let err = ServerError::Pairing(PairingError::InvalidTransition {
            user: UserId(1),
            state: UserState::Chatting,
            operation: "enqueue",
        });
        assert_eq!(
            err.to_string(),
            "pairing error: invalid transition: cannot enqueue user 1 in state Chatting"
        );
    }

    #[test]
    fn io_errors_are_transport_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(ServerError::from(io), ServerError::Transport(_)));
    }
}
