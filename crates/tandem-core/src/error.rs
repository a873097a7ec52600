//! Error types for the pairing core.
//!
//! Only programmer errors live here. Expected user-facing statuses (already
//! chatting, not chatting, nothing to leave) are ordinary outcomes returned by
//! [`crate::PairingService`], never errors.
//!
//! When an operation returns an error the store has not been mutated.

use thiserror::Error;

use crate::user::{UserId, UserState};

/// Errors from store mutators and pairing operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    /// Operation is incompatible with the user's current state.
    ///
    /// Correct transport wiring never triggers this. Log for operator
    /// attention; do not show it to the user.
    #[error("invalid transition: cannot {operation} user {user} in state {state:?}")]
    InvalidTransition {
        /// User the operation targeted
        user: UserId,
        /// State the user was in
        state: UserState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Attempted to pair a user that already has a partner.
    ///
    /// Indicates a concurrency bug in the caller: matching must run under the
    /// same critical section as pairing.
    #[error("user {user} is already paired with {partner}")]
    AlreadyPaired {
        /// User that was already paired
        user: UserId,
        /// Their existing partner
        partner: UserId,
    },
}

/// A broken store invariant, reported by
/// [`SessionStore::check_invariants`](crate::SessionStore::check_invariants).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{invariant}: {message}")]
pub struct InvariantViolation {
    /// Short name of the violated invariant
    pub invariant: &'static str,
    /// What went wrong
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_error_display() {
        let err = PairingError::InvalidTransition {
            user: UserId(7),
            state: UserState::Chatting,
            operation: "enqueue",
        };
        assert_eq!(err.to_string(), "invalid transition: cannot enqueue user 7 in state Chatting");

        let err = PairingError::AlreadyPaired { user: UserId(1), partner: UserId(2) };
        assert_eq!(err.to_string(), "user 1 is already paired with 2");
    }

    #[test]
    fn violation_display() {
        let v = InvariantViolation { invariant: "pool_uniqueness", message: "user 3 twice".into() };
        assert_eq!(v.to_string(), "pool_uniqueness: user 3 twice");
    }
}
