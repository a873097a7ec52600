//! Shared pairing state and action execution.
//!
//! The [`Hub`] owns the only [`PairingService`] in the process behind one
//! async mutex. Every operation runs to completion under that lock, so two
//! concurrent searches can never pick the same waiting user. The lock is
//! released before any action reaches the [`Relay`]; transport latency never
//! extends the critical section.

use std::sync::Arc;

use tandem_core::{
    InvariantViolation, Notice, PairingAction, PairingError, PairingEvent, PairingService,
    PoolStats, UserId,
};
use tokio::sync::Mutex;

use crate::{
    error::ServerError,
    registry::SessionInfo,
    relay::{ChannelRelay, Relay},
};

/// Cloneable handle to the shared pairing service and its relay.
pub struct Hub<R> {
    service: Arc<Mutex<PairingService>>,
    relay: Arc<R>,
}

impl<R> Clone for Hub<R> {
    fn clone(&self) -> Self {
        Self { service: Arc::clone(&self.service), relay: Arc::clone(&self.relay) }
    }
}

impl<R: Relay> Hub<R> {
    /// Create a hub with an empty pairing service.
    pub fn new(relay: Arc<R>) -> Self {
        Self { service: Arc::new(Mutex::new(PairingService::new())), relay }
    }

    /// The relay actions are dispatched to.
    pub fn relay(&self) -> &Arc<R> {
        &self.relay
    }

    /// Process one inbound event and dispatch the resulting actions.
    ///
    /// A pairing error means the core refused an impossible transition. The
    /// store is untouched, nothing is dispatched, and the error is returned
    /// so the transport can answer the client.
    pub async fn handle(&self, event: PairingEvent) -> Result<(), ServerError> {
        let result = {
            let mut service = self.service.lock().await;
            service.handle(event)
        };

        match result {
            Ok(actions) => {
                self.execute(actions, None).await;
                Ok(())
            },
            Err(e) => {
                tracing::error!("Pairing operation failed: {}", e);
                Err(e.into())
            },
        }
    }

    /// Release everything `user` holds after their connection closed.
    ///
    /// Runs `leave` so a chatting partner is told and nobody stays paired with
    /// a ghost. Notices addressed to `user` are dropped since there is nobody
    /// left to read them.
    pub async fn disconnect(&self, user: UserId) -> Result<(), ServerError> {
        let result = {
            let mut service = self.service.lock().await;
            service.leave(user)
        };

        match result {
            Ok(reply) => {
                tracing::debug!(%user, outcome = ?reply.outcome, "Released departed user");
                self.execute(reply.actions, Some(user)).await;
                Ok(())
            },
            Err(e) => {
                tracing::error!("Releasing user {} failed: {}", user, e);
                Err(e.into())
            },
        }
    }

    /// Current pool counts.
    pub async fn stats(&self) -> PoolStats {
        self.service.lock().await.stats()
    }

    /// Verify store invariants under the lock.
    pub async fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.service.lock().await.store().check_invariants()
    }

    /// Run `f` against the service under the lock, then dispatch what it
    /// returns.
    ///
    /// For callers that want an operation's outcome as well as its side
    /// effects.
    pub async fn transact<O, F>(&self, f: F) -> Result<O, ServerError>
    where
        F: FnOnce(&mut PairingService) -> Result<(O, Vec<PairingAction>), PairingError>,
    {
        let result = {
            let mut service = self.service.lock().await;
            f(&mut service)
        };

        match result {
            Ok((outcome, actions)) => {
                self.execute(actions, None).await;
                Ok(outcome)
            },
            Err(e) => {
                tracing::error!("Pairing operation failed: {}", e);
                Err(e.into())
            },
        }
    }

    /// Hand actions to the relay in order. Failures are logged, never undone.
    ///
    /// A message that cannot reach its recipient is answered with
    /// [`Notice::DeliveryFailed`] to the sender.
    async fn execute(&self, actions: Vec<PairingAction>, skip: Option<UserId>) {
        for action in actions {
            match action {
                PairingAction::Notify { user, .. } if Some(user) == skip => {},
                PairingAction::Notify { user, notice } => {
                    if let Err(e) = self.relay.notify(user, notice).await {
                        tracing::warn!("Notify failed: {}", e);
                    }
                },
                PairingAction::Deliver { sender, recipient, payload } => {
                    if let Err(e) = self.relay.deliver(recipient, payload).await {
                        tracing::warn!(%sender, "Deliver failed: {}", e);
                        if let Err(e) = self.relay.notify(sender, Notice::DeliveryFailed).await {
                            tracing::warn!("Notify failed: {}", e);
                        }
                    }
                },
            }
        }
    }
}

impl Hub<ChannelRelay> {
    /// Tear down a closed connection.
    ///
    /// The user is released while the session is still attached, so the user
    /// cannot reconnect on a new session before the old one's `leave` has
    /// run. Detaching afterwards frees the user for the next hello.
    pub async fn close_session(&self, session_id: u64) -> Option<SessionInfo> {
        if let Some(user) = self.relay.user_for_session(session_id).await
            && let Err(e) = self.disconnect(user).await
        {
            tracing::error!(%user, "Cleanup after disconnect failed: {}", e);
        }
        self.relay.detach(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use tandem_core::{Command, Hints, MatchOutcome, Payload, UserState};

    use super::*;
    use crate::relay::RelayError;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Sent {
        Notice(UserId, Notice),
        Message(UserId, Payload),
    }

    #[derive(Default)]
    struct RecordingRelay {
        sent: StdMutex<Vec<Sent>>,
    }

    impl RecordingRelay {
        fn take(&self) -> Vec<Sent> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    impl Relay for RecordingRelay {
        async fn notify(&self, user: UserId, notice: Notice) -> Result<(), RelayError> {
            self.sent.lock().unwrap().push(Sent::Notice(user, notice));
            Ok(())
        }

        async fn deliver(&self, recipient: UserId, payload: Payload) -> Result<(), RelayError> {
            self.sent.lock().unwrap().push(Sent::Message(recipient, payload));
            Ok(())
        }
    }

    fn search(user: u64) -> PairingEvent {
        PairingEvent::Command { user: UserId(user), command: Command::Search(Hints::none()) }
    }

    #[tokio::test]
    async fn handle_dispatches_actions_in_order() {
        let relay = Arc::new(RecordingRelay::default());
        let hub = Hub::new(Arc::clone(&relay));

        hub.handle(search(1)).await.unwrap();
        assert_eq!(relay.take(), vec![Sent::Notice(UserId(1), Notice::Queued)]);

        hub.handle(search(2)).await.unwrap();
        let connected = |user, partner| {
            Sent::Notice(UserId(user), Notice::Connected { partner: UserId(partner) })
        };
        assert_eq!(relay.take(), vec![connected(2, 1), connected(1, 2)]);
    }

    #[tokio::test]
    async fn message_goes_to_partner_only() {
        let relay = Arc::new(RecordingRelay::default());
        let hub = Hub::new(Arc::clone(&relay));
        hub.handle(search(1)).await.unwrap();
        hub.handle(search(2)).await.unwrap();
        relay.take();

        let payload = Payload::text("hi");
        hub.handle(PairingEvent::Message { user: UserId(1), payload: payload.clone() })
            .await
            .unwrap();

        assert_eq!(relay.take(), vec![Sent::Message(UserId(2), payload)]);
    }

    #[tokio::test]
    async fn disconnect_notifies_partner_only() {
        let relay = Arc::new(RecordingRelay::default());
        let hub = Hub::new(Arc::clone(&relay));
        hub.handle(search(1)).await.unwrap();
        hub.handle(search(2)).await.unwrap();
        relay.take();

        hub.disconnect(UserId(1)).await.unwrap();

        let sent = relay.take();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Sent::Notice(UserId(2), Notice::Disconnected { .. })));
        assert_eq!(hub.stats().await, PoolStats::default());
    }

    #[tokio::test]
    async fn disconnect_of_unknown_user_is_silent() {
        let relay = Arc::new(RecordingRelay::default());
        let hub = Hub::new(Arc::clone(&relay));

        hub.disconnect(UserId(9)).await.unwrap();

        assert!(relay.take().is_empty());
    }

    #[tokio::test]
    async fn close_session_releases_user_then_detaches() {
        let relay = Arc::new(ChannelRelay::new());
        let hub = Hub::new(Arc::clone(&relay));
        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        relay.attach(1, None, tx, usize::MAX).await;
        relay.identify(1, UserId(1)).await.unwrap();
        hub.handle(search(1)).await.unwrap();

        let info = hub.close_session(1).await.unwrap();

        assert_eq!(info.user, Some(UserId(1)));
        assert_eq!(hub.stats().await, PoolStats::default());
        assert_eq!(relay.session_count().await, 0);
        assert!(hub.close_session(1).await.is_none());
    }

    #[tokio::test]
    async fn transact_returns_outcome_and_dispatches() {
        let relay = Arc::new(RecordingRelay::default());
        let hub = Hub::new(Arc::clone(&relay));
        hub.handle(search(1)).await.unwrap();
        relay.take();

        let outcome = hub
            .transact(|service| {
                let reply = service.request_match(UserId(2), Hints::none())?;
                Ok((reply.outcome, reply.actions))
            })
            .await
            .unwrap();

        assert_eq!(outcome, MatchOutcome::Connected { partner: UserId(1) });
        assert_eq!(relay.take().len(), 2);
        let state = hub.transact(|s| Ok((s.store().state_of(UserId(1)), Vec::new()))).await;
        assert_eq!(state.unwrap(), UserState::Chatting);
    }
}
