//! User identity, per-user state, and matching hints.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Platform-assigned user identifier.
///
/// Opaque to the core. Globally unique and never reused while the process
/// runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Where a user is in the pairing lifecycle.
///
/// A user the store has never seen is `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    /// Not searching and not in a chat
    #[default]
    Idle,
    /// Waiting in the pool for a partner
    Searching,
    /// Paired with exactly one partner
    Chatting,
}

/// Gender hint. "Any" is expressed as the absence of a hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    /// Male
    Male,
    /// Female
    Female,
}

/// Optional, non-binding attributes used to narrow candidate selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hints {
    /// Gender filter of the requester, recorded gender of a waiting entry
    #[serde(default)]
    pub gender: Option<Gender>,
    /// Free-form interests. Recorded but never used as a constraint.
    #[serde(default)]
    pub interests: Option<String>,
}

impl Hints {
    /// No hints at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Hints carrying only a gender.
    pub fn with_gender(gender: Gender) -> Self {
        Self { gender: Some(gender), interests: None }
    }
}

/// A user waiting in the pool, with the hints they searched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingEntry {
    /// The searching user
    pub user: UserId,
    /// Hints supplied when the user entered the pool
    pub hints: Hints,
}
