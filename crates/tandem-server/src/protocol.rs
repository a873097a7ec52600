//! Wire protocol: newline-delimited JSON.
//!
//! Every line is one JSON object tagged by `type`. The first client line must
//! be `hello`; after that the client issues commands and messages, and the
//! server pushes notices and relayed messages.
//!
//! ```text
//! → {"type":"hello","user_id":42}
//! ← {"type":"welcome","user_id":42}
//! → {"type":"search","gender":"female"}
//! ← {"type":"queued"}
//! ← {"type":"connected"}
//! → {"type":"send","kind":"text","body":"hi"}
//! ```
//!
//! Partner IDs never go on the wire; chats stay anonymous.

use serde::{Deserialize, Serialize};
use tandem_core::{
    Command, DisconnectReason, Gender, Hints, Notice, PairingEvent, Payload, PayloadKind, UserId,
};
use thiserror::Error;

/// Maximum accepted line length in bytes.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Errors decoding client lines.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Line was not a valid client message
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// First message was not `hello`
    #[error("expected hello as first message")]
    ExpectedHello,

    /// `hello` sent again after the handshake
    #[error("unexpected hello after handshake")]
    UnexpectedHello,

    /// Line was not UTF-8
    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    /// Line exceeded [`MAX_LINE_LEN`]
    #[error("line too long: {len} bytes (limit: {MAX_LINE_LEN})")]
    LineTooLong {
        /// Length of the offending line
        len: usize,
    },

    /// Client did not say hello in time
    #[error("hello timeout after {millis}ms")]
    HelloTimeout {
        /// Configured timeout in milliseconds
        millis: u64,
    },
}

/// Messages a client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identify the connection with a platform user ID
    Hello {
        /// Platform-assigned user ID
        user_id: u64,
    },
    /// Look for a partner
    Search {
        /// Gender filter, absent for "any"
        #[serde(default)]
        gender: Option<Gender>,
        /// Free-form interests
        #[serde(default)]
        interests: Option<String>,
    },
    /// Stop chatting or cancel a search
    Stop,
    /// Move on to a new partner
    Next,
    /// Ask for pool statistics
    Stats,
    /// Relay a message to the partner
    Send {
        /// Transport classification of the message
        kind: PayloadKind,
        /// Text, or a platform file reference for media
        #[serde(default)]
        body: String,
        /// Optional media caption
        #[serde(default)]
        caption: Option<String>,
    },
}

impl ClientMessage {
    /// Parse one line.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        if line.len() > MAX_LINE_LEN {
            return Err(ProtocolError::LineTooLong { len: line.len() });
        }
        Ok(serde_json::from_str(line)?)
    }

    /// Turn a post-handshake message into a pairing event for `user`.
    pub fn into_event(self, user: UserId) -> Result<PairingEvent, ProtocolError> {
        let command = match self {
            Self::Hello { .. } => return Err(ProtocolError::UnexpectedHello),
            Self::Search { gender, interests } => Command::Search(Hints { gender, interests }),
            Self::Stop => Command::Stop,
            Self::Next => Command::Next,
            Self::Stats => Command::Stats,
            Self::Send { kind, body, caption } => {
                let payload = Payload { kind, body: body.into(), caption };
                return Ok(PairingEvent::Message { user, payload });
            },
        };
        Ok(PairingEvent::Command { user, command })
    }
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake accepted
    Welcome {
        /// Echo of the user ID
        user_id: u64,
    },
    /// Partner found, start talking
    Connected,
    /// Waiting for a partner
    Queued,
    /// Partner ended the chat
    Disconnected {
        /// Whether the partner stopped or skipped
        reason: DisconnectReason,
    },
    /// Your chat ended
    ChatEnded,
    /// Search cancelled
    SearchCancelled,
    /// Not chatting or searching
    NotActive,
    /// Finish the current chat first
    AlreadyChatting,
    /// No partner to send to
    NotChatting,
    /// Message kind not supported
    UnsupportedPayload,
    /// Your message could not be delivered to the partner
    DeliveryFailed,
    /// Pool statistics
    Stats {
        /// Users waiting
        searching: usize,
        /// Active chats
        active_pairs: usize,
    },
    /// Message relayed from the partner
    Message {
        /// Kind of the partner's message
        kind: PayloadKind,
        /// Body, empty for documents
        body: String,
        /// Caption, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    /// Request could not be processed
    Error {
        /// Human-readable reason
        message: String,
    },
}

impl ServerMessage {
    /// Encode as one line, without the trailing newline.
    pub fn encode(&self) -> String {
        // Serializing these plain enums cannot fail
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"encode failed: {e}"}}"#)
        })
    }

    /// Render a relayed payload for the recipient.
    ///
    /// Documents are announced rather than forwarded, so the body is dropped.
    pub fn delivery(payload: &Payload) -> Self {
        let body = match payload.kind {
            PayloadKind::Document => String::new(),
            _ => String::from_utf8_lossy(&payload.body).into_owned(),
        };
        Self::Message { kind: payload.kind, body, caption: payload.caption.clone() }
    }
}

impl From<&Notice> for ServerMessage {
    fn from(notice: &Notice) -> Self {
        match notice {
            Notice::Connected { .. } => Self::Connected,
            Notice::Queued => Self::Queued,
            Notice::Disconnected { reason, .. } => Self::Disconnected { reason: *reason },
            Notice::ChatEnded { .. } => Self::ChatEnded,
            Notice::SearchCancelled => Self::SearchCancelled,
            Notice::NotActive => Self::NotActive,
            Notice::AlreadyChatting => Self::AlreadyChatting,
            Notice::NotChatting => Self::NotChatting,
            Notice::UnsupportedPayload => Self::UnsupportedPayload,
            Notice::DeliveryFailed => Self::DeliveryFailed,
            Notice::Stats(stats) => {
                Self::Stats { searching: stats.searching, active_pairs: stats.active_pairs }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use tandem_core::PoolStats;

    use super::*;

    #[test]
    fn decode_hello() {
        let msg = ClientMessage::decode(r#"{"type":"hello","user_id":42}"#).unwrap();
        assert_eq!(msg, ClientMessage::Hello { user_id: 42 });
    }

    #[test]
    fn decode_search_with_optional_hints() {
        let msg = ClientMessage::decode(r#"{"type":"search"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Search { gender: None, interests: None });

        let msg = ClientMessage::decode(r#"{"type":"search","gender":"female"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Search { gender: Some(Gender::Female), interests: None });
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(ClientMessage::decode("not json"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(
            ClientMessage::decode(r#"{"type":"teleport"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn decode_rejects_oversized_lines() {
        let line = "x".repeat(MAX_LINE_LEN + 1);
        assert!(matches!(ClientMessage::decode(&line), Err(ProtocolError::LineTooLong { .. })));
    }

    #[test]
    fn send_becomes_message_event() {
        let line = r#"{"type":"send","kind":"photo","body":"f1","caption":"c"}"#;
        let msg = ClientMessage::decode(line).unwrap();
        let event = msg.into_event(UserId(7)).unwrap();

        let PairingEvent::Message { user, payload } = event else {
            panic!("expected message event");
        };
        assert_eq!(user, UserId(7));
        assert_eq!(payload.kind, PayloadKind::Photo);
        assert_eq!(&payload.body[..], b"f1");
        assert_eq!(payload.caption.as_deref(), Some("c"));
    }

    #[test]
    fn hello_after_handshake_is_rejected() {
        let result = ClientMessage::Hello { user_id: 1 }.into_event(UserId(1));
        assert!(matches!(result, Err(ProtocolError::UnexpectedHello)));
    }

    #[test]
    fn notices_hide_partner_ids() {
        let msg = ServerMessage::from(&Notice::Connected { partner: UserId(99) });
        assert_eq!(msg.encode(), r#"{"type":"connected"}"#);

        let msg = ServerMessage::from(&Notice::Disconnected {
            ex_partner: UserId(99),
            reason: DisconnectReason::Skipped,
        });
        assert_eq!(msg.encode(), r#"{"type":"disconnected","reason":"skipped"}"#);
    }

    #[test]
    fn stats_notice_encodes_counts() {
        let msg = ServerMessage::from(&Notice::Stats(PoolStats { searching: 3, active_pairs: 2 }));
        assert_eq!(msg.encode(), r#"{"type":"stats","searching":3,"active_pairs":2}"#);
    }

    #[test]
    fn delivery_failure_has_its_own_line() {
        let msg = ServerMessage::from(&Notice::DeliveryFailed);
        assert_eq!(msg.encode(), r#"{"type":"delivery_failed"}"#);
    }

    #[test]
    fn documents_are_announced_not_forwarded() {
        let payload = Payload::new(PayloadKind::Document, "secret-file-id");
        let msg = ServerMessage::delivery(&payload);
        assert_eq!(msg, ServerMessage::Message {
            kind: PayloadKind::Document,
            body: String::new(),
            caption: None
        });
    }
}
