//! Relayed payloads.
//!
//! The core routes a payload as one opaque unit. It never looks at the body;
//! the only thing it asks is whether the kind is supported at all. Per-kind
//! rendering (captions, stickers, file notices) belongs to the relay.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Kind of a relayed message, as classified by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// Plain text
    Text,
    /// Image, body is a platform file reference
    Photo,
    /// Sticker, body is a platform file reference
    Sticker,
    /// Voice note, body is a platform file reference
    Voice,
    /// Arbitrary file. Partner is told a file was sent, not given the file.
    Document,
    /// Anything else the transport could not classify
    Unsupported,
}

impl PayloadKind {
    /// Whether the relay can forward this kind.
    pub fn is_supported(self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// One message to relay from a user to their partner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Transport-assigned kind
    pub kind: PayloadKind,
    /// Opaque body (text bytes or file reference)
    pub body: Bytes,
    /// Optional caption attached to media
    pub caption: Option<String>,
}

impl Payload {
    /// A text payload.
    pub fn text(body: impl Into<String>) -> Self {
        Self { kind: PayloadKind::Text, body: Bytes::from(body.into()), caption: None }
    }

    /// A payload of any kind with no caption.
    pub fn new(kind: PayloadKind, body: impl Into<Bytes>) -> Self {
        Self { kind, body: body.into(), caption: None }
    }

    /// Whether the relay can forward this payload.
    pub fn is_supported(&self) -> bool {
        self.kind.is_supported()
    }
}
