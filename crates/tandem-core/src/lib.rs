//! Tandem core: pairing and session state machine.
//!
//! Tracks every user's state (idle, searching, chatting), the waiting pool,
//! and the symmetric partner relation. All logic is pure - no I/O, no clocks,
//! no locks. Operations return [`PairingAction`]s describing what the runtime
//! should tell whom; the runtime owns transport and concurrency.
//!
//! # Architecture
//!
//! ```text
//! transport ──► PairingService ──► Vec<PairingAction> ──► Relay
//!                  │      │
//!                  │      └── Matcher (first eligible in queue)
//!                  └── SessionStore (states, pool, partner links)
//! ```
//!
//! # Components
//!
//! - [`SessionStore`]: authoritative state with invariant-preserving mutators
//! - [`matcher`]: partner selection policy over the pool snapshot
//! - [`PairingService`]: the externally callable operations
//! - [`Payload`]: opaque relayed message with a thin kind classification

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod matcher;
pub mod pairing;
pub mod payload;
pub mod store;
pub mod user;

pub use error::{InvariantViolation, PairingError};
pub use pairing::{
    Command, DisconnectReason, LeaveOutcome, MatchOutcome, NextOutcome, Notice, PairingAction,
    PairingEvent, PairingService, PoolStats, RelayOutcome, Reply,
};
pub use payload::{Payload, PayloadKind};
pub use store::SessionStore;
pub use user::{Gender, Hints, UserId, UserState, WaitingEntry};
