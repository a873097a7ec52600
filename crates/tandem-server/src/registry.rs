//! Connection registry for session and user tracking.
//!
//! The registry maps transport sessions to platform users in both directions:
//! session → user (for cleanup on disconnect) and user → session (for routing
//! notices). A session starts anonymous and is bound to a user once the client
//! says hello.
//!
//! One session per user: a second connection claiming an already-connected
//! user is refused, so every notice has exactly one destination.

use std::{collections::HashMap, net::SocketAddr};

use tandem_core::UserId;

/// Information about a registered session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// User bound to this session, `None` until hello
    pub user: Option<UserId>,
    /// Remote address, if known
    pub peer: Option<SocketAddr>,
}

/// Registry for tracking sessions and the users behind them.
///
/// - Session → info, for cleanup when a connection drops
/// - User → session, for routing notices in O(1)
/// - At most one session per user
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Session ID → session info
    sessions: HashMap<u64, SessionInfo>,
    /// User ID → session ID (reverse index)
    user_sessions: HashMap<UserId, u64>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted, still anonymous session.
    ///
    /// Returns `false` if the session ID is taken.
    pub fn register_session(&mut self, session_id: u64, peer: Option<SocketAddr>) -> bool {
        if self.sessions.contains_key(&session_id) {
            return false;
        }

        self.sessions.insert(session_id, SessionInfo { user: None, peer });
        true
    }

    /// Bind an existing session to `user`.
    ///
    /// Returns `false` if the session does not exist, is already bound to a
    /// different user, or `user` is connected elsewhere. Binding a session to
    /// the user it already has is a no-op that succeeds.
    pub fn identify(&mut self, session_id: u64, user: UserId) -> bool {
        let Some(info) = self.sessions.get(&session_id) else {
            return false;
        };

        match info.user {
            Some(existing) => return existing == user,
            None if self.user_sessions.contains_key(&user) => return false,
            None => {},
        }

        self.user_sessions.insert(user, session_id);
        if let Some(info) = self.sessions.get_mut(&session_id) {
            info.user = Some(user);
        }
        true
    }

    /// Unregister a session and drop its user binding.
    ///
    /// Returns the session info if it existed.
    pub fn unregister_session(&mut self, session_id: u64) -> Option<SessionInfo> {
        let info = self.sessions.remove(&session_id)?;

        if let Some(user) = info.user {
            // Only clear the reverse index if it still points here
            if self.user_sessions.get(&user) == Some(&session_id) {
                self.user_sessions.remove(&user);
            }
        }

        Some(info)
    }

    /// Session metadata. `None` if session doesn't exist.
    pub fn session(&self, session_id: u64) -> Option<&SessionInfo> {
        self.sessions.get(&session_id)
    }

    /// Check if a session is registered.
    pub fn has_session(&self, session_id: u64) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Session currently bound to `user`.
    pub fn session_id_for_user(&self, user: UserId) -> Option<u64> {
        self.user_sessions.get(&user).copied()
    }

    /// Total number of registered sessions, identified or not.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> Option<SocketAddr> {
        Some(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    #[test]
    fn registered_session_starts_anonymous() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.register_session(1, peer(9000)));
        assert!(registry.has_session(1));
        assert!(!registry.has_session(2));

        let info = registry.session(1).unwrap();
        assert_eq!(info, &SessionInfo { user: None, peer: peer(9000) });
    }

    #[test]
    fn register_duplicate_session_fails() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.register_session(1, None));
        assert!(!registry.register_session(1, peer(9001)));
        assert_eq!(registry.session(1).unwrap().peer, None);
    }

    #[test]
    fn identify_binds_user_and_keeps_peer() {
        let mut registry = ConnectionRegistry::new();
        registry.register_session(1, peer(9000));

        assert!(registry.identify(1, UserId(42)));

        let info = registry.session(1).unwrap();
        assert_eq!(info.user, Some(UserId(42)));
        assert_eq!(info.peer, peer(9000));
        assert_eq!(registry.session_id_for_user(UserId(42)), Some(1));
    }

    #[test]
    fn identify_unknown_session_fails() {
        let mut registry = ConnectionRegistry::new();

        assert!(!registry.identify(999, UserId(1)));
        assert_eq!(registry.session_id_for_user(UserId(1)), None);
    }

    #[test]
    fn identify_is_idempotent_for_same_user() {
        let mut registry = ConnectionRegistry::new();
        registry.register_session(1, None);

        assert!(registry.identify(1, UserId(42)));
        assert!(registry.identify(1, UserId(42)));
        assert!(!registry.identify(1, UserId(43)));
        assert_eq!(registry.session_id_for_user(UserId(43)), None);
    }

    #[test]
    fn one_session_per_user_enforcement() {
        let mut registry = ConnectionRegistry::new();
        registry.register_session(1, None);
        registry.register_session(2, None);

        assert!(registry.identify(1, UserId(42)));
        assert!(!registry.identify(2, UserId(42)));
        assert_eq!(registry.session_id_for_user(UserId(42)), Some(1));
        assert_eq!(registry.session(2).unwrap().user, None);

        assert!(registry.identify(2, UserId(99)));
        assert_eq!(registry.session_id_for_user(UserId(99)), Some(2));
    }

    #[test]
    fn unregister_session_cleans_up_reverse_index() {
        let mut registry = ConnectionRegistry::new();
        registry.register_session(1, peer(9000));
        registry.identify(1, UserId(42));

        let info = registry.unregister_session(1).unwrap();

        assert_eq!(info, SessionInfo { user: Some(UserId(42)), peer: peer(9000) });
        assert_eq!(registry.session_id_for_user(UserId(42)), None);
        assert!(registry.unregister_session(1).is_none());
    }

    #[test]
    fn user_can_reconnect_after_unregister() {
        let mut registry = ConnectionRegistry::new();
        registry.register_session(1, None);
        registry.identify(1, UserId(42));
        registry.unregister_session(1);

        registry.register_session(2, None);
        assert!(registry.identify(2, UserId(42)));
        assert_eq!(registry.session_id_for_user(UserId(42)), Some(2));
    }

    #[test]
    fn session_count_includes_anonymous_sessions() {
        let mut registry = ConnectionRegistry::new();
        assert_eq!(registry.session_count(), 0);

        registry.register_session(1, None);
        registry.register_session(2, None);
        registry.identify(2, UserId(7));
        assert_eq!(registry.session_count(), 2);

        registry.unregister_session(1);
        assert_eq!(registry.session_count(), 1);
    }
}
