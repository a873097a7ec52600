//! Pairing service.
//!
//! Orchestrates [`SessionStore`] and the [`matcher`] behind the operations the
//! transport calls: search, leave, next partner, and relay a message. Each
//! operation is a single synchronous transition over `&mut self`; the caller
//! holds one lock for the whole call, so "enqueue, match, pair" can never
//! interleave with another user's search.
//!
//! Operations never perform I/O. They return a [`Reply`] holding the outcome
//! for the caller plus the [`PairingAction`]s the relay should carry out.
//! Delivery is the relay's problem: a failed notification never rolls back a
//! committed transition.

use serde::{Deserialize, Serialize};

use crate::{
    error::PairingError,
    matcher,
    payload::Payload,
    store::SessionStore,
    user::{Hints, UserId, UserState},
};

/// User-facing event the relay should render for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A partner was found. Sent to both sides of a new pair.
    Connected {
        /// The new partner
        partner: UserId,
    },
    /// No partner available yet, the user is waiting in the pool
    Queued,
    /// The user's partner ended the chat
    Disconnected {
        /// The partner who left
        ex_partner: UserId,
        /// Whether the partner stopped or moved on to someone else
        reason: DisconnectReason,
    },
    /// Confirmation to a user who ended their own chat
    ChatEnded {
        /// The partner who was left
        ex_partner: UserId,
    },
    /// A search was cancelled
    SearchCancelled,
    /// Nothing to stop: not chatting and not searching
    NotActive,
    /// Cannot search while in a chat, finish it first
    AlreadyChatting,
    /// Cannot send a message without a partner
    NotChatting,
    /// The relay cannot forward this kind of message
    UnsupportedPayload,
    /// The partner could not be reached, the message was not delivered
    DeliveryFailed,
    /// Pool statistics on request
    Stats(PoolStats),
}

/// Why a chat ended, from the abandoned partner's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Partner stopped chatting
    Left,
    /// Partner asked for a new partner
    Skipped,
}

/// Work the relay should carry out after an operation commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingAction {
    /// Tell a user about an event
    Notify {
        /// Recipient of the notice
        user: UserId,
        /// What happened
        notice: Notice,
    },
    /// Forward a relayed message, unchanged
    Deliver {
        /// User who sent the message
        sender: UserId,
        /// Partner receiving the message
        recipient: UserId,
        /// The message
        payload: Payload,
    },
}

/// Outcome of an operation plus the actions it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<O> {
    /// What happened, from the caller's point of view
    pub outcome: O,
    /// Notifications and deliveries for the relay
    pub actions: Vec<PairingAction>,
}

impl<O> Reply<O> {
    fn new(outcome: O, actions: Vec<PairingAction>) -> Self {
        Self { outcome, actions }
    }
}

/// Result of [`PairingService::request_match`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Paired immediately
    Connected {
        /// The new partner
        partner: UserId,
    },
    /// Waiting in the pool
    Queued,
    /// Caller is already chatting, nothing changed
    AlreadyChatting,
}

/// Result of [`PairingService::leave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Chat ended, the former partner was notified
    Disconnected {
        /// The former partner
        ex_partner: UserId,
    },
    /// Search cancelled
    SearchCancelled,
    /// Caller was idle, nothing changed
    NotActive,
}

/// Result of [`PairingService::next_partner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextOutcome {
    /// Paired with someone new immediately
    Connected {
        /// The new partner
        partner: UserId,
    },
    /// Waiting in the pool
    Queued,
    /// Caller was idle, nothing changed
    NotActive,
}

/// Result of [`PairingService::relay_payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Payload handed to the relay for the partner
    Delivered {
        /// The partner receiving it
        recipient: UserId,
    },
    /// Sender has no partner
    NotChatting,
    /// Payload kind cannot be forwarded
    UnsupportedPayload,
}

/// Snapshot of pool activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Users waiting for a partner
    pub searching: usize,
    /// Active chats (pairs, not users)
    pub active_pairs: usize,
}

/// Commands a user can issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Look for a partner
    Search(Hints),
    /// Stop chatting or cancel a search
    Stop,
    /// Drop the current partner and look for another
    Next,
    /// Ask for pool statistics
    Stats,
}

/// Inbound events from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// A user issued a command
    Command {
        /// Issuing user
        user: UserId,
        /// The command
        command: Command,
    },
    /// A user sent a message to relay
    Message {
        /// Sender
        user: UserId,
        /// The message
        payload: Payload,
    },
}

/// The pairing state machine.
///
/// Owns its [`SessionStore`]. Created once at service start and lives for
/// the process.
#[derive(Debug, Default)]
pub struct PairingService {
    store: SessionStore,
}

impl PairingService {
    /// Create a service with an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of the store.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Process one transport event and return the actions to execute.
    ///
    /// This is the entry point for transports that only care about
    /// side effects. Use the individual operations to also get the outcome.
    pub fn handle(&mut self, event: PairingEvent) -> Result<Vec<PairingAction>, PairingError> {
        let actions = match event {
            PairingEvent::Command { user, command: Command::Search(hints) } => {
                self.request_match(user, hints)?.actions
            },
            PairingEvent::Command { user, command: Command::Stop } => self.leave(user)?.actions,
            PairingEvent::Command { user, command: Command::Next } => {
                self.next_partner(user)?.actions
            },
            PairingEvent::Command { user, command: Command::Stats } => {
                vec![notify(user, Notice::Stats(self.stats()))]
            },
            PairingEvent::Message { user, payload } => self.relay_payload(user, payload).actions,
        };
        Ok(actions)
    }

    /// Enter the pool and try to pair immediately.
    ///
    /// A chatting caller gets `AlreadyChatting` and nothing changes. A caller
    /// already in the pool keeps their place; the new hints replace the old
    /// ones and the match is retried.
    pub fn request_match(
        &mut self,
        user: UserId,
        hints: Hints,
    ) -> Result<Reply<MatchOutcome>, PairingError> {
        if self.store.state_of(user) == UserState::Chatting {
            return Ok(Reply::new(
                MatchOutcome::AlreadyChatting,
                vec![notify(user, Notice::AlreadyChatting)],
            ));
        }

        if !self.store.enqueue(user, hints.clone())? {
            self.store.set_hints(user, hints);
        }

        let mut actions = Vec::new();
        let outcome = match self.try_match(user, &mut actions)? {
            Some(partner) => MatchOutcome::Connected { partner },
            None => MatchOutcome::Queued,
        };
        Ok(Reply::new(outcome, actions))
    }

    /// Stop chatting or cancel a search.
    ///
    /// Idle callers get `NotActive`; calling this repeatedly is harmless.
    pub fn leave(&mut self, user: UserId) -> Result<Reply<LeaveOutcome>, PairingError> {
        match self.store.state_of(user) {
            UserState::Chatting => {
                let ex_partner = self.unpair_chatting(user, "leave")?;
                Ok(Reply::new(
                    LeaveOutcome::Disconnected { ex_partner },
                    vec![
                        notify(ex_partner, Notice::Disconnected {
                            ex_partner: user,
                            reason: DisconnectReason::Left,
                        }),
                        notify(user, Notice::ChatEnded { ex_partner }),
                    ],
                ))
            },
            UserState::Searching => {
                self.store.set_idle(user)?;
                Ok(Reply::new(
                    LeaveOutcome::SearchCancelled,
                    vec![notify(user, Notice::SearchCancelled)],
                ))
            },
            UserState::Idle => {
                Ok(Reply::new(LeaveOutcome::NotActive, vec![notify(user, Notice::NotActive)]))
            },
        }
    }

    /// Drop the current partner (if any) and look for a new one.
    ///
    /// Equivalent to `leave` then `request_match` under one critical section,
    /// reusing the caller's last hints. The former partner is idle afterwards
    /// and so cannot be picked again by this call. Idle callers get
    /// `NotActive` and no match is attempted.
    pub fn next_partner(&mut self, user: UserId) -> Result<Reply<NextOutcome>, PairingError> {
        let mut actions = Vec::new();

        match self.store.state_of(user) {
            UserState::Idle => {
                return Ok(Reply::new(
                    NextOutcome::NotActive,
                    vec![notify(user, Notice::NotActive)],
                ));
            },
            UserState::Chatting => {
                let ex_partner = self.unpair_chatting(user, "next partner")?;
                actions.push(notify(
                    ex_partner,
                    Notice::Disconnected { ex_partner: user, reason: DisconnectReason::Skipped },
                ));
                let hints = self.store.hints_of(user);
                self.store.enqueue(user, hints)?;
            },
            UserState::Searching => {},
        }

        let outcome = match self.try_match(user, &mut actions)? {
            Some(partner) => NextOutcome::Connected { partner },
            None => NextOutcome::Queued,
        };
        Ok(Reply::new(outcome, actions))
    }

    /// Route a message to the sender's partner.
    ///
    /// The payload is passed through untouched. Only its supported/unsupported
    /// classification is consulted.
    pub fn relay_payload(&self, sender: UserId, payload: Payload) -> Reply<RelayOutcome> {
        let Some(recipient) = self.store.partner_of(sender) else {
            return Reply::new(
                RelayOutcome::NotChatting,
                vec![notify(sender, Notice::NotChatting)],
            );
        };

        if !payload.is_supported() {
            return Reply::new(
                RelayOutcome::UnsupportedPayload,
                vec![notify(sender, Notice::UnsupportedPayload)],
            );
        }

        Reply::new(
            RelayOutcome::Delivered { recipient },
            vec![PairingAction::Deliver { sender, recipient, payload }],
        )
    }

    /// Current pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats { searching: self.store.pool_len(), active_pairs: self.store.pair_count() }
    }

    /// Match a searching user against the pool and pair on success.
    ///
    /// On success both sides get `Connected`; otherwise the user gets
    /// `Queued`.
    fn try_match(
        &mut self,
        user: UserId,
        actions: &mut Vec<PairingAction>,
    ) -> Result<Option<UserId>, PairingError> {
        let hints = self.store.hints_of(user);
        let Some(partner) = matcher::find_partner(self.store.pool_snapshot(), user, &hints) else {
            actions.push(notify(user, Notice::Queued));
            return Ok(None);
        };

        self.store.pair(user, partner)?;
        actions.push(notify(user, Notice::Connected { partner }));
        actions.push(notify(partner, Notice::Connected { partner: user }));
        Ok(Some(partner))
    }

    /// Unpair a user the store reports as chatting.
    fn unpair_chatting(
        &mut self,
        user: UserId,
        operation: &'static str,
    ) -> Result<UserId, PairingError> {
        self.store.unpair(user).ok_or(PairingError::InvalidTransition {
            user,
            state: UserState::Chatting,
            operation,
        })
    }
}

fn notify(user: UserId, notice: Notice) -> PairingAction {
    PairingAction::Notify { user, notice }
}
