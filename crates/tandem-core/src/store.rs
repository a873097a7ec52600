//! Session store: user states, the waiting pool, and partner links.
//!
//! The store is the single source of truth for who is searching and who is
//! talking to whom. It holds no I/O and no lock; the owner is responsible for
//! serializing access (the server keeps it behind one mutex).
//!
//! # Invariants
//!
//! After every public operation that returns `Ok`:
//!
//! - `Chatting` ⇔ has a partner ⇔ the partner's partner is this user
//! - `Searching` ⇔ appears in the pool exactly once
//! - `Idle` ⇒ not in the pool and no partner
//!
//! The one exception is [`SessionStore::dequeue`], which leaves the state
//! untouched; the caller picks the resulting state.
//! [`SessionStore::check_invariants`] verifies all of the above.

use std::collections::{HashMap, HashSet};

use crate::{
    error::{InvariantViolation, PairingError},
    user::{Hints, UserId, UserState, WaitingEntry},
};

/// Per-user record. Users are created on first touch and never removed.
#[derive(Debug, Clone, Default)]
struct UserRecord {
    state: UserState,
    partner: Option<UserId>,
    /// Hints from the most recent search, reused by "next partner"
    hints: Hints,
}

/// Authoritative pairing state.
#[derive(Debug, Default)]
pub struct SessionStore {
    /// User ID → record
    users: HashMap<UserId, UserRecord>,
    /// Searching users in insertion order
    pool: Vec<WaitingEntry>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a user in the waiting pool and mark them `Searching`.
    ///
    /// Returns `Ok(false)` without touching anything if the user is already
    /// in the pool. Fails with [`PairingError::InvalidTransition`] if the
    /// user is chatting.
    pub fn enqueue(&mut self, user: UserId, hints: Hints) -> Result<bool, PairingError> {
        let state = self.state_of(user);
        if state == UserState::Chatting {
            return Err(PairingError::InvalidTransition { user, state, operation: "enqueue" });
        }

        if self.in_pool(user) {
            return Ok(false);
        }

        let record = self.users.entry(user).or_default();
        record.state = UserState::Searching;
        record.hints = hints.clone();
        self.pool.push(WaitingEntry { user, hints });
        Ok(true)
    }

    /// Replace the hints of a user waiting in the pool, keeping their place.
    ///
    /// Returns `false` if the user is not in the pool.
    pub fn set_hints(&mut self, user: UserId, hints: Hints) -> bool {
        let Some(entry) = self.pool.iter_mut().find(|entry| entry.user == user) else {
            return false;
        };
        entry.hints = hints.clone();
        if let Some(record) = self.users.get_mut(&user) {
            record.hints = hints;
        }
        true
    }

    /// Remove a user from the pool if present.
    ///
    /// Does not change the user's state. Returns `true` if an entry was
    /// removed.
    pub fn dequeue(&mut self, user: UserId) -> bool {
        match self.pool.iter().position(|entry| entry.user == user) {
            Some(index) => {
                self.pool.remove(index);
                true
            },
            None => false,
        }
    }

    /// Mark a non-chatting user `Idle`, removing any pool entry.
    ///
    /// Chatting users must leave through [`SessionStore::unpair`].
    pub fn set_idle(&mut self, user: UserId) -> Result<(), PairingError> {
        let state = self.state_of(user);
        if state == UserState::Chatting {
            return Err(PairingError::InvalidTransition { user, state, operation: "set idle" });
        }

        self.dequeue(user);
        if let Some(record) = self.users.get_mut(&user) {
            record.state = UserState::Idle;
        }
        Ok(())
    }

    /// Link two users as partners.
    ///
    /// Both become `Chatting` and leave the pool. Fails without mutation if
    /// either already has a partner or if `a == b`.
    pub fn pair(&mut self, a: UserId, b: UserId) -> Result<(), PairingError> {
        if a == b {
            return Err(PairingError::InvalidTransition {
                user: a,
                state: self.state_of(a),
                operation: "pair with self",
            });
        }

        for user in [a, b] {
            if let Some(partner) = self.partner_of(user) {
                return Err(PairingError::AlreadyPaired { user, partner });
            }
        }

        self.dequeue(a);
        self.dequeue(b);

        for (user, partner) in [(a, b), (b, a)] {
            let record = self.users.entry(user).or_default();
            record.state = UserState::Chatting;
            record.partner = Some(partner);
        }

        Ok(())
    }

    /// Break the user's partner link, if any.
    ///
    /// Both sides become `Idle`. Returns the former partner, or `None` if the
    /// user had no partner (not an error).
    pub fn unpair(&mut self, user: UserId) -> Option<UserId> {
        let partner = self.users.get_mut(&user)?.partner.take()?;

        if let Some(record) = self.users.get_mut(&user) {
            record.state = UserState::Idle;
        }
        if let Some(record) = self.users.get_mut(&partner) {
            record.partner = None;
            record.state = UserState::Idle;
        }

        Some(partner)
    }

    /// Current state of a user. Unknown users are `Idle`.
    pub fn state_of(&self, user: UserId) -> UserState {
        self.users.get(&user).map_or(UserState::Idle, |r| r.state)
    }

    /// Current partner of a user, if chatting.
    pub fn partner_of(&self, user: UserId) -> Option<UserId> {
        self.users.get(&user).and_then(|r| r.partner)
    }

    /// Hints from the user's most recent search.
    pub fn hints_of(&self, user: UserId) -> Hints {
        self.users.get(&user).map(|r| r.hints.clone()).unwrap_or_default()
    }

    /// The waiting pool in insertion order.
    pub fn pool_snapshot(&self) -> &[WaitingEntry] {
        &self.pool
    }

    /// Check if a user has an entry in the pool.
    pub fn in_pool(&self, user: UserId) -> bool {
        self.pool.iter().any(|entry| entry.user == user)
    }

    /// Number of users waiting in the pool.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// Number of active partner links.
    pub fn pair_count(&self) -> usize {
        self.users.values().filter(|r| r.partner.is_some()).count() / 2
    }

    /// Verify every store invariant.
    ///
    /// Returns the first violation found. O(users + pool).
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut seen = HashSet::with_capacity(self.pool.len());
        for entry in &self.pool {
            if !seen.insert(entry.user) {
                return Err(violation(
                    "pool_uniqueness",
                    format!("user {} appears more than once in the pool", entry.user),
                ));
            }
            if self.state_of(entry.user) != UserState::Searching {
                return Err(violation(
                    "pool_membership",
                    format!(
                        "user {} is in the pool while {:?}",
                        entry.user,
                        self.state_of(entry.user)
                    ),
                ));
            }
        }

        for (&user, record) in &self.users {
            match (record.state, record.partner) {
                (UserState::Chatting, Some(partner)) => {
                    if partner == user {
                        return Err(violation(
                            "no_self_pairing",
                            format!("user {user} is paired with itself"),
                        ));
                    }
                    if self.partner_of(partner) != Some(user) {
                        return Err(violation(
                            "pairing_symmetry",
                            format!(
                                "user {user} → {partner}, but {partner} → {:?}",
                                self.partner_of(partner)
                            ),
                        ));
                    }
                    if seen.contains(&user) {
                        return Err(violation(
                            "pool_membership",
                            format!("chatting user {user} is in the pool"),
                        ));
                    }
                },
                (UserState::Chatting, None) => {
                    return Err(violation(
                        "chatting_has_partner",
                        format!("user {user} is chatting without a partner"),
                    ));
                },
                (state, Some(partner)) => {
                    return Err(violation(
                        "partner_implies_chatting",
                        format!("user {user} has partner {partner} while {state:?}"),
                    ));
                },
                (UserState::Searching, None) => {
                    if !seen.contains(&user) {
                        return Err(violation(
                            "searching_in_pool",
                            format!("searching user {user} is not in the pool"),
                        ));
                    }
                },
                (UserState::Idle, None) => {},
            }
        }

        Ok(())
    }
}

fn violation(invariant: &'static str, message: String) -> InvariantViolation {
    InvariantViolation { invariant, message }
}
