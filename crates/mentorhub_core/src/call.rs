//! crates/mentorhub_core/src/call.rs
//!
//! Call Signaling Coordinator for 1:1 WebRTC calls. Mediates
//! offer/answer/ICE exchange, tracks call lifecycle per conversation, and
//! enforces at-most-one-active-call per route.
//!
//! State machine per route: Idle -> Pending on offer (route reserved, the
//! incoming-call record not yet durable), Pending -> Ringing once the record
//! persists, Ringing -> Active on answer, any -> ended on hang-up,
//! disconnect, or ring timeout. The check-and-insert on offer happens under
//! a single lock acquisition with no await in between, so concurrent offers
//! for one route can never both succeed, and answer is only accepted once
//! the offer has actually been signaled.
//!
//! Answer and hang-up are scoped to the call's parties; requests from
//! anyone else are rejected without touching the session.
//!
//! Call capacity is per route, not per user: a caller ringing one
//! conversation may simultaneously ring another.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{CallEndReason, CallKind, ChatRoute, NotificationKind, NotificationRef};
use crate::error::{RealtimeError, RealtimeResult};
use crate::events::ServerEvent;
use crate::notify::NotificationDispatcher;
use crate::registry::{ConnectionRegistry, RoomId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    /// Route reserved; the incoming-call record is not durable yet, so the
    /// call cannot be answered.
    Pending,
    Ringing,
    Active,
}

/// Ephemeral, authoritative record of one in-progress call.
struct CallSession {
    call_id: Uuid,
    caller_id: Uuid,
    recipient_id: Uuid,
    state: CallState,
    /// Cancelled on every transition out of Ringing so the timeout task
    /// can never fire a stale missed-call side effect.
    ring_cancel: CancellationToken,
}

impl CallSession {
    fn is_party(&self, user_id: Uuid) -> bool {
        self.caller_id == user_id || self.recipient_id == user_id
    }
}

pub struct CallCoordinator {
    registry: Arc<ConnectionRegistry>,
    notifier: Arc<NotificationDispatcher>,
    ring_timeout: Duration,
    calls: Arc<Mutex<HashMap<ChatRoute, CallSession>>>,
}

impl CallCoordinator {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        notifier: Arc<NotificationDispatcher>,
        ring_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            notifier,
            ring_timeout,
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Starts ringing a conversation. Rejects when a call session already
    /// exists for the route. Returns the new call id.
    pub async fn offer(
        &self,
        caller_id: Uuid,
        recipient_id: Uuid,
        route: ChatRoute,
        call_type: CallKind,
        sdp: String,
    ) -> RealtimeResult<Uuid> {
        let call_id = Uuid::new_v4();
        let ring_cancel = CancellationToken::new();

        {
            // Check and insert atomically; no await between them.
            let mut calls = self.calls.lock().await;
            if calls.contains_key(&route) {
                return Err(RealtimeError::CallInProgress);
            }
            calls.insert(
                route.clone(),
                CallSession {
                    call_id,
                    caller_id,
                    recipient_id,
                    state: CallState::Pending,
                    ring_cancel: ring_cancel.clone(),
                },
            );
        }

        // Durable incoming-call record before anything is signaled; if it
        // cannot be written the ring is rolled back.
        let content = match call_type {
            CallKind::Audio => "Incoming audio call",
            CallKind::Video => "Incoming video call",
        };
        if let Err(error) = self
            .notifier
            .dispatch(
                recipient_id,
                NotificationKind::IncomingCall,
                caller_id,
                NotificationRef::Chat(route.clone()),
                content.to_string(),
                Some(call_id),
            )
            .await
        {
            let mut calls = self.calls.lock().await;
            if calls.get(&route).is_some_and(|s| s.call_id == call_id) {
                calls.remove(&route);
            }
            return Err(error);
        }

        // Record durable: start ringing, unless the caller already hung up
        // while the write was in flight.
        {
            let mut calls = self.calls.lock().await;
            match calls.get_mut(&route) {
                Some(session) if session.call_id == call_id => {
                    session.state = CallState::Ringing;
                }
                _ => return Err(RealtimeError::NoActiveCall),
            }
        }

        self.registry
            .send_to_user(
                recipient_id,
                &ServerEvent::CallOffer {
                    call_id,
                    caller_id,
                    chat_route: route.clone(),
                    call_type,
                    sdp,
                },
            )
            .await;

        self.spawn_ring_timer(route.clone(), call_id, ring_cancel);
        info!(%route, %call_id, "call ringing");
        Ok(call_id)
    }

    /// Accepts a ringing call. Only the called party may answer. Cancels the
    /// ring timer and delivers the answer to the caller's user room only.
    pub async fn answer(&self, route: &ChatRoute, user_id: Uuid, sdp: String) -> RealtimeResult<()> {
        let (caller_id, call_id) = {
            let mut calls = self.calls.lock().await;
            let session = calls.get_mut(route).ok_or(RealtimeError::NoActiveCall)?;
            if session.state != CallState::Ringing {
                return Err(RealtimeError::NoActiveCall);
            }
            if user_id != session.recipient_id {
                return Err(RealtimeError::NotCallParty);
            }
            session.ring_cancel.cancel();
            session.state = CallState::Active;
            (session.caller_id, session.call_id)
        };

        self.registry
            .send_to_user(
                caller_id,
                &ServerEvent::CallAnswer {
                    call_id,
                    chat_route: route.clone(),
                    sdp,
                },
            )
            .await;
        info!(%route, %call_id, "call answered");
        Ok(())
    }

    /// Relays an ICE candidate verbatim to the named counterpart. No
    /// inspection, no persistence, no ordering guarantee beyond arrival
    /// order on the recipient's channel.
    pub async fn ice_candidate(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        route: &ChatRoute,
        candidate: String,
    ) {
        self.registry
            .send_to_user(
                recipient_id,
                &ServerEvent::IceCandidate {
                    sender_id,
                    chat_route: route.clone(),
                    candidate,
                },
            )
            .await;
    }

    /// Tears down the call for a route, from either party or from a
    /// disconnect. Requests from a non-party are rejected with the session
    /// untouched. Idempotent: ending a route with no session is a no-op.
    pub async fn end_call(&self, route: &ChatRoute, user_id: Uuid) -> RealtimeResult<()> {
        let session = {
            let mut calls = self.calls.lock().await;
            match calls.get(route) {
                None => return Ok(()),
                Some(session) if !session.is_party(user_id) => {
                    return Err(RealtimeError::NotCallParty);
                }
                Some(_) => calls.remove(route),
            }
        };
        let Some(session) = session else {
            return Ok(());
        };
        session.ring_cancel.cancel();

        let reason = match session.state {
            // Hung up before an answer: the recipient missed it.
            CallState::Pending | CallState::Ringing => CallEndReason::Missed,
            CallState::Active => CallEndReason::Ended,
        };
        if reason == CallEndReason::Missed {
            if let Err(error) = self
                .notifier
                .update_to_missed(session.recipient_id, session.call_id, "Missed call")
                .await
            {
                warn!(%route, %error, "failed to record missed call");
            }
        }

        self.registry
            .send_to_room(
                &RoomId::Chat(route.clone()),
                &ServerEvent::CallEnded {
                    call_id: session.call_id,
                    chat_route: route.clone(),
                    reason,
                },
            )
            .await;
        info!(%route, call_id = %session.call_id, ?reason, "call ended");
        Ok(())
    }

    /// Disconnect hook: ends every call the user is a party to. Idempotent
    /// and best-effort; never blocks the other party's cleanup.
    pub async fn on_user_offline(&self, user_id: Uuid) {
        let routes: Vec<ChatRoute> = {
            let calls = self.calls.lock().await;
            calls
                .iter()
                .filter(|(_, s)| s.is_party(user_id))
                .map(|(route, _)| route.clone())
                .collect()
        };
        for route in routes {
            if let Err(error) = self.end_call(&route, user_id).await {
                warn!(%route, %error, "cleanup after disconnect failed");
            }
        }
    }

    fn spawn_ring_timer(&self, route: ChatRoute, call_id: Uuid, cancel: CancellationToken) {
        let calls = Arc::clone(&self.calls);
        let registry = Arc::clone(&self.registry);
        let notifier = Arc::clone(&self.notifier);
        let timeout = self.ring_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    // Only tear down if this exact ring is still pending.
                    let session = {
                        let mut calls = calls.lock().await;
                        match calls.get(&route) {
                            Some(s) if s.call_id == call_id && s.state == CallState::Ringing => {
                                calls.remove(&route)
                            }
                            _ => None,
                        }
                    };
                    let Some(session) = session else { return };

                    // Best-effort persistence of the missed-call record.
                    if let Err(error) = notifier
                        .update_to_missed(session.recipient_id, call_id, "Missed call")
                        .await
                    {
                        warn!(%route, %error, "failed to record missed call on timeout");
                    }
                    let ended = ServerEvent::CallEnded {
                        call_id,
                        chat_route: route.clone(),
                        reason: CallEndReason::Missed,
                    };
                    registry.send_to_user(session.caller_id, &ended).await;
                    registry.send_to_user(session.recipient_id, &ended).await;
                    info!(%route, %call_id, "ring timed out");
                }
            }
        });
    }

    #[cfg(test)]
    async fn ring_token(&self, route: &ChatRoute) -> Option<CancellationToken> {
        self.calls
            .lock()
            .await
            .get(route)
            .map(|s| s.ring_cancel.clone())
    }

    #[cfg(test)]
    async fn is_active(&self, route: &ChatRoute) -> bool {
        self.calls.lock().await.contains_key(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Notification, NotificationStatus};
    use crate::registry::ConnectionId;
    use crate::testing::MockNotifications;
    use tokio::sync::mpsc;

    const RING: Duration = Duration::from_secs(45);

    struct Fixture {
        registry: Arc<ConnectionRegistry>,
        notifications: Arc<MockNotifications>,
        calls: Arc<CallCoordinator>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(ConnectionRegistry::new());
        let notifications = Arc::new(MockNotifications::new());
        let notifier = Arc::new(NotificationDispatcher::new(
            registry.clone(),
            notifications.clone(),
        ));
        let calls = Arc::new(CallCoordinator::new(registry.clone(), notifier, RING));
        Fixture {
            registry,
            notifications,
            calls,
        }
    }

    async fn connect_user(
        f: &Fixture,
        user: Uuid,
        route: &ChatRoute,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = f.registry.connect(tx).await;
        f.registry.join_user_room(conn, user).await;
        f.registry.join_chat_rooms(conn, &[route.clone()]).await;
        (conn, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn second_offer_on_same_route_is_rejected() {
        let f = fixture();
        let route = ChatRoute::Collaboration(Uuid::new_v4());
        let caller = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let (_c, _rx) = connect_user(&f, recipient, &route).await;

        f.calls
            .offer(caller, recipient, route.clone(), CallKind::Audio, "v=0".into())
            .await
            .unwrap();
        let second = f
            .calls
            .offer(recipient, caller, route.clone(), CallKind::Audio, "v=0".into())
            .await;
        assert!(matches!(second, Err(RealtimeError::CallInProgress)));
    }

    #[tokio::test]
    async fn per_route_capacity_allows_one_caller_on_two_routes() {
        let f = fixture();
        let caller = Uuid::new_v4();
        let route_a = ChatRoute::Collaboration(Uuid::new_v4());
        let route_b = ChatRoute::Connection(Uuid::new_v4());

        f.calls
            .offer(caller, Uuid::new_v4(), route_a, CallKind::Audio, "a".into())
            .await
            .unwrap();
        f.calls
            .offer(caller, Uuid::new_v4(), route_b, CallKind::Video, "b".into())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn answer_cancels_ring_timer_and_end_frees_route() {
        let f = fixture();
        let route = ChatRoute::Collaboration(Uuid::new_v4());
        let caller = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let (_cc, mut caller_rx) = connect_user(&f, caller, &route).await;
        let (_rc, mut recipient_rx) = connect_user(&f, recipient, &route).await;

        f.calls
            .offer(caller, recipient, route.clone(), CallKind::Video, "offer".into())
            .await
            .unwrap();
        assert!(drain(&mut recipient_rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::CallOffer { .. })));

        // Recipient answers within 2s of ringing.
        tokio::time::sleep(Duration::from_secs(2)).await;
        let token = f.calls.ring_token(&route).await.unwrap();
        f.calls
            .answer(&route, recipient, "answer".into())
            .await
            .unwrap();

        // The timer token itself is cancelled, not merely unexpired.
        assert!(token.is_cancelled());
        let caller_events = drain(&mut caller_rx);
        assert!(caller_events
            .iter()
            .any(|e| matches!(e, ServerEvent::CallAnswer { .. })));
        // Targeted delivery: the answer goes to the caller only.
        assert!(drain(&mut recipient_rx)
            .iter()
            .all(|e| !matches!(e, ServerEvent::CallAnswer { .. })));

        // Long past the ring window nothing fires.
        tokio::time::sleep(RING * 2).await;
        settle().await;
        assert!(drain(&mut caller_rx).is_empty());
        assert!(f.calls.is_active(&route).await);

        // Either side hangs up; both receive the end and cleanup is
        // synchronous, so an immediate re-offer succeeds.
        f.calls.end_call(&route, caller).await.unwrap();
        assert!(drain(&mut caller_rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::CallEnded { reason: CallEndReason::Ended, .. })));
        assert!(drain(&mut recipient_rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::CallEnded { .. })));
        f.calls
            .offer(caller, recipient, route.clone(), CallKind::Audio, "again".into())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_offer_times_out_to_missed_call() {
        let f = fixture();
        let route = ChatRoute::Connection(Uuid::new_v4());
        let caller = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let (_cc, mut caller_rx) = connect_user(&f, caller, &route).await;
        let (_rc, mut recipient_rx) = connect_user(&f, recipient, &route).await;

        let call_id = f
            .calls
            .offer(caller, recipient, route.clone(), CallKind::Audio, "offer".into())
            .await
            .unwrap();
        drain(&mut caller_rx);
        drain(&mut recipient_rx);

        tokio::time::sleep(RING + Duration::from_secs(1)).await;
        settle().await;

        for rx in [&mut caller_rx, &mut recipient_rx] {
            assert!(drain(rx).iter().any(|e| matches!(
                e,
                ServerEvent::CallEnded { reason: CallEndReason::Missed, .. }
            )));
        }

        // One notification row, rewritten in place to missed.
        let stored: Vec<Notification> = f.notifications.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind, NotificationKind::MissedCall);
        assert_eq!(stored[0].call_id, Some(call_id));
        assert_eq!(stored[0].status, NotificationStatus::Unread);

        // The route is free again.
        assert!(!f.calls.is_active(&route).await);
        f.calls
            .offer(caller, recipient, route, CallKind::Audio, "retry".into())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn hangup_while_ringing_records_missed_call() {
        let f = fixture();
        let route = ChatRoute::Collaboration(Uuid::new_v4());
        let caller = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let (_rc, mut recipient_rx) = connect_user(&f, recipient, &route).await;

        f.calls
            .offer(caller, recipient, route.clone(), CallKind::Audio, "offer".into())
            .await
            .unwrap();
        drain(&mut recipient_rx);

        f.calls.end_call(&route, caller).await.unwrap();
        assert!(drain(&mut recipient_rx).iter().any(|e| matches!(
            e,
            ServerEvent::CallEnded { reason: CallEndReason::Missed, .. }
        )));
        assert_eq!(f.notifications.stored()[0].kind, NotificationKind::MissedCall);

        // Stale timer never fires a second teardown.
        tokio::time::sleep(RING * 2).await;
        settle().await;
        assert!(drain(&mut recipient_rx).is_empty());
    }

    #[tokio::test]
    async fn disconnect_of_a_party_ends_the_call() {
        let f = fixture();
        let route = ChatRoute::Connection(Uuid::new_v4());
        let caller = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let (_rc, mut recipient_rx) = connect_user(&f, recipient, &route).await;

        f.calls
            .offer(caller, recipient, route.clone(), CallKind::Video, "offer".into())
            .await
            .unwrap();
        f.calls
            .answer(&route, recipient, "answer".into())
            .await
            .unwrap();
        drain(&mut recipient_rx);

        f.calls.on_user_offline(caller).await;
        assert!(!f.calls.is_active(&route).await);
        assert!(drain(&mut recipient_rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::CallEnded { .. })));
    }

    #[tokio::test]
    async fn answer_without_offer_is_rejected() {
        let f = fixture();
        let route = ChatRoute::Group(Uuid::new_v4());
        let result = f.calls.answer(&route, Uuid::new_v4(), "sdp".into()).await;
        assert!(matches!(result, Err(RealtimeError::NoActiveCall)));
    }

    #[tokio::test]
    async fn non_party_cannot_answer_or_end_a_call() {
        let f = fixture();
        let route = ChatRoute::Connection(Uuid::new_v4());
        let caller = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let (_rc, mut recipient_rx) = connect_user(&f, recipient, &route).await;

        f.calls
            .offer(caller, recipient, route.clone(), CallKind::Audio, "offer".into())
            .await
            .unwrap();
        drain(&mut recipient_rx);

        // A user outside the call cannot accept it, and the caller cannot
        // answer on the recipient's behalf.
        let result = f.calls.answer(&route, stranger, "sdp".into()).await;
        assert!(matches!(result, Err(RealtimeError::NotCallParty)));
        let result = f.calls.answer(&route, caller, "sdp".into()).await;
        assert!(matches!(result, Err(RealtimeError::NotCallParty)));

        // A user outside the call cannot hang it up either; the session is
        // left untouched.
        let result = f.calls.end_call(&route, stranger).await;
        assert!(matches!(result, Err(RealtimeError::NotCallParty)));
        assert!(f.calls.is_active(&route).await);
        assert!(drain(&mut recipient_rx).is_empty());

        // The real recipient can still pick up.
        f.calls
            .answer(&route, recipient, "sdp".into())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn answer_is_rejected_until_the_offer_record_commits() {
        let f = fixture();
        let route = ChatRoute::Connection(Uuid::new_v4());
        let caller = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let (_rc, mut recipient_rx) = connect_user(&f, recipient, &route).await;

        // Stall the notification write so the call sits in its setup window.
        f.notifications.hold_creates();
        let offer = tokio::spawn({
            let calls = f.calls.clone();
            let route = route.clone();
            async move {
                calls
                    .offer(caller, recipient, route, CallKind::Audio, "offer".into())
                    .await
            }
        });
        settle().await;

        // The route is reserved but not answerable yet, and nothing has
        // been signaled.
        let result = f.calls.answer(&route, recipient, "sdp".into()).await;
        assert!(matches!(result, Err(RealtimeError::NoActiveCall)));
        assert!(drain(&mut recipient_rx).is_empty());

        f.notifications.release_creates();
        offer.await.unwrap().unwrap();
        assert!(drain(&mut recipient_rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::CallOffer { .. })));
        f.calls
            .answer(&route, recipient, "sdp".into())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ice_candidates_relay_to_the_counterpart_only() {
        let f = fixture();
        let route = ChatRoute::Connection(Uuid::new_v4());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (_ca, mut rx_a) = connect_user(&f, a, &route).await;
        let (_cb, mut rx_b) = connect_user(&f, b, &route).await;

        f.calls
            .ice_candidate(a, b, &route, "candidate:1".into())
            .await;

        match drain(&mut rx_b).as_slice() {
            [ServerEvent::IceCandidate {
                sender_id,
                candidate,
                ..
            }] => {
                assert_eq!(*sender_id, a);
                assert_eq!(candidate, "candidate:1");
            }
            other => panic!("unexpected events {other:?}"),
        }
        assert!(drain(&mut rx_a).is_empty());
    }
}
