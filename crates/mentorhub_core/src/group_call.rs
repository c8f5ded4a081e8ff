//! crates/mentorhub_core/src/group_call.rs
//!
//! Group Call Coordinator: multi-party call state keyed by group id. The
//! coordinator is signaling-only; participants negotiate pairwise WebRTC
//! connections (mesh topology) and media never touches the server.
//!
//! At most one call session exists per group. The first joiner defines the
//! call id and kind; later joiners must name the same call id. The session
//! is destroyed exactly when the participant set empties.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{CallKind, ChatRoute};
use crate::error::{RealtimeError, RealtimeResult};
use crate::events::ServerEvent;
use crate::registry::{ConnectionRegistry, RoomId};

struct GroupCallSession {
    call_id: Uuid,
    call_type: CallKind,
    participants: HashSet<Uuid>,
}

pub struct GroupCallCoordinator {
    registry: Arc<ConnectionRegistry>,
    calls: Mutex<HashMap<Uuid, GroupCallSession>>,
}

impl GroupCallCoordinator {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Joins (or starts) the group's call. The first joiner creates the
    /// session with the supplied call id and kind; everyone after that must
    /// match the existing call id.
    pub async fn join(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        call_type: CallKind,
        call_id: Uuid,
    ) -> RealtimeResult<()> {
        let effective_type = {
            let mut calls = self.calls.lock().await;
            match calls.get_mut(&group_id) {
                Some(session) => {
                    if session.call_id != call_id {
                        return Err(RealtimeError::CallIdMismatch);
                    }
                    session.participants.insert(user_id);
                    session.call_type
                }
                None => {
                    let mut participants = HashSet::new();
                    participants.insert(user_id);
                    calls.insert(
                        group_id,
                        GroupCallSession {
                            call_id,
                            call_type,
                            participants,
                        },
                    );
                    call_type
                }
            }
        };

        self.registry
            .send_to_room(
                &RoomId::Chat(ChatRoute::Group(group_id)),
                &ServerEvent::GroupCallJoined {
                    group_id,
                    call_id,
                    user_id,
                    call_type: effective_type,
                },
            )
            .await;
        info!(%group_id, %call_id, %user_id, "joined group call");
        Ok(())
    }

    /// Removes a participant; destroys the session and announces the end of
    /// the call when the last one leaves. Idempotent.
    pub async fn leave(&self, user_id: Uuid, group_id: Uuid) {
        let (removed, ended, call_id) = {
            let mut calls = self.calls.lock().await;
            let Some(session) = calls.get_mut(&group_id) else {
                return;
            };
            let removed = session.participants.remove(&user_id);
            let call_id = session.call_id;
            let ended = removed && session.participants.is_empty();
            if ended {
                calls.remove(&group_id);
            }
            (removed, ended, call_id)
        };
        if !removed {
            return;
        }

        let room = RoomId::Chat(ChatRoute::Group(group_id));
        self.registry
            .send_to_room(
                &room,
                &ServerEvent::GroupCallLeft {
                    group_id,
                    call_id,
                    user_id,
                },
            )
            .await;
        if ended {
            self.registry
                .send_to_room(&room, &ServerEvent::GroupCallEnded { group_id, call_id })
                .await;
            info!(%group_id, %call_id, "group call ended");
        }
    }

    /// Explicit end request from a participant; same path as leaving.
    pub async fn end_for(&self, user_id: Uuid, group_id: Uuid) {
        self.leave(user_id, group_id).await;
    }

    /// Pure lookup for late joiners discovering an in-progress call.
    pub async fn call_info(&self, group_id: Uuid) -> (Option<Uuid>, Option<CallKind>) {
        let calls = self.calls.lock().await;
        match calls.get(&group_id) {
            Some(session) => (Some(session.call_id), Some(session.call_type)),
            None => (None, None),
        }
    }

    /// Relays a pairwise offer to the named recipient.
    pub async fn offer(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        group_id: Uuid,
        call_type: CallKind,
        sdp: String,
    ) {
        self.registry
            .send_to_user(
                recipient_id,
                &ServerEvent::GroupOffer {
                    sender_id,
                    group_id,
                    call_type,
                    sdp,
                },
            )
            .await;
    }

    pub async fn answer(&self, sender_id: Uuid, recipient_id: Uuid, group_id: Uuid, sdp: String) {
        self.registry
            .send_to_user(
                recipient_id,
                &ServerEvent::GroupAnswer {
                    sender_id,
                    group_id,
                    sdp,
                },
            )
            .await;
    }

    pub async fn ice_candidate(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        group_id: Uuid,
        candidate: String,
    ) {
        self.registry
            .send_to_user(
                recipient_id,
                &ServerEvent::GroupIceCandidate {
                    sender_id,
                    group_id,
                    candidate,
                },
            )
            .await;
    }

    /// Disconnect hook: drops the user from every group call they joined.
    pub async fn on_user_offline(&self, user_id: Uuid) {
        let groups: Vec<Uuid> = {
            let calls = self.calls.lock().await;
            calls
                .iter()
                .filter(|(_, s)| s.participants.contains(&user_id))
                .map(|(group_id, _)| *group_id)
                .collect()
        };
        if !groups.is_empty() {
            warn!(%user_id, count = groups.len(), "removing disconnected user from group calls");
        }
        for group_id in groups {
            self.leave(user_id, group_id).await;
        }
    }

    #[cfg(test)]
    async fn participant_count(&self, group_id: Uuid) -> Option<usize> {
        self.calls
            .lock()
            .await
            .get(&group_id)
            .map(|s| s.participants.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionId;
    use tokio::sync::mpsc;

    struct Fixture {
        registry: Arc<ConnectionRegistry>,
        calls: GroupCallCoordinator,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(ConnectionRegistry::new());
        let calls = GroupCallCoordinator::new(registry.clone());
        Fixture { registry, calls }
    }

    async fn member(
        f: &Fixture,
        user: Uuid,
        group: Uuid,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = f.registry.connect(tx).await;
        f.registry.join_user_room(conn, user).await;
        f.registry
            .join_chat_rooms(conn, &[ChatRoute::Group(group)])
            .await;
        (conn, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn first_joiner_defines_the_call_and_late_joiners_discover_it() {
        let f = fixture();
        let group = Uuid::new_v4();
        let starter = Uuid::new_v4();
        let call_id = Uuid::new_v4();

        assert_eq!(f.calls.call_info(group).await, (None, None));
        f.calls
            .join(starter, group, CallKind::Video, call_id)
            .await
            .unwrap();
        assert_eq!(
            f.calls.call_info(group).await,
            (Some(call_id), Some(CallKind::Video))
        );

        let late = Uuid::new_v4();
        f.calls
            .join(late, group, CallKind::Video, call_id)
            .await
            .unwrap();
        assert_eq!(f.calls.participant_count(group).await, Some(2));
    }

    #[tokio::test]
    async fn mismatched_call_id_is_rejected_and_state_untouched() {
        let f = fixture();
        let group = Uuid::new_v4();
        let call_id = Uuid::new_v4();
        f.calls
            .join(Uuid::new_v4(), group, CallKind::Audio, call_id)
            .await
            .unwrap();

        let result = f
            .calls
            .join(Uuid::new_v4(), group, CallKind::Audio, Uuid::new_v4())
            .await;
        assert!(matches!(result, Err(RealtimeError::CallIdMismatch)));
        assert_eq!(f.calls.participant_count(group).await, Some(1));
        assert_eq!(f.calls.call_info(group).await.0, Some(call_id));
    }

    #[tokio::test]
    async fn rejoining_does_not_duplicate_participants() {
        let f = fixture();
        let group = Uuid::new_v4();
        let user = Uuid::new_v4();
        let call_id = Uuid::new_v4();

        f.calls
            .join(user, group, CallKind::Audio, call_id)
            .await
            .unwrap();
        f.calls
            .join(user, group, CallKind::Audio, call_id)
            .await
            .unwrap();
        assert_eq!(f.calls.participant_count(group).await, Some(1));

        // A single leave after the double join empties the call.
        f.calls.leave(user, group).await;
        assert_eq!(f.calls.participant_count(group).await, None);
    }

    #[tokio::test]
    async fn session_is_destroyed_exactly_when_participants_empty() {
        let f = fixture();
        let group = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let call_id = Uuid::new_v4();
        let (_ca, mut rx_a) = member(&f, a, group).await;

        f.calls.join(a, group, CallKind::Video, call_id).await.unwrap();
        f.calls.join(b, group, CallKind::Video, call_id).await.unwrap();
        drain(&mut rx_a);

        f.calls.leave(b, group).await;
        let events = drain(&mut rx_a);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::GroupCallLeft { user_id, .. } if *user_id == b)));
        assert!(!events
            .iter()
            .any(|e| matches!(e, ServerEvent::GroupCallEnded { .. })));

        f.calls.leave(a, group).await;
        assert!(drain(&mut rx_a)
            .iter()
            .any(|e| matches!(e, ServerEvent::GroupCallEnded { .. })));
        assert_eq!(f.calls.call_info(group).await, (None, None));

        // Leaving again is a silent no-op.
        f.calls.leave(a, group).await;
        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn pairwise_signaling_reaches_only_the_named_recipient() {
        let f = fixture();
        let group = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let (_ca, mut rx_a) = member(&f, a, group).await;
        let (_cb, mut rx_b) = member(&f, b, group).await;
        let (_cc, mut rx_c) = member(&f, c, group).await;

        f.calls
            .offer(a, b, group, CallKind::Video, "offer-ab".into())
            .await;
        f.calls.answer(b, a, group, "answer-ba".into()).await;
        f.calls.ice_candidate(a, b, group, "cand".into()).await;

        let b_events = drain(&mut rx_b);
        assert!(b_events
            .iter()
            .any(|e| matches!(e, ServerEvent::GroupOffer { sender_id, .. } if *sender_id == a)));
        assert!(b_events
            .iter()
            .any(|e| matches!(e, ServerEvent::GroupIceCandidate { .. })));
        assert!(drain(&mut rx_a)
            .iter()
            .any(|e| matches!(e, ServerEvent::GroupAnswer { sender_id, .. } if *sender_id == b)));
        assert!(drain(&mut rx_c).is_empty());
    }

    #[tokio::test]
    async fn disconnect_removes_user_from_every_group_call() {
        let f = fixture();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let group_a = Uuid::new_v4();
        let group_b = Uuid::new_v4();

        f.calls
            .join(user, group_a, CallKind::Audio, Uuid::new_v4())
            .await
            .unwrap();
        let shared_call = Uuid::new_v4();
        f.calls
            .join(user, group_b, CallKind::Audio, shared_call)
            .await
            .unwrap();
        f.calls
            .join(other, group_b, CallKind::Audio, shared_call)
            .await
            .unwrap();

        f.calls.on_user_offline(user).await;

        // Sole-participant call destroyed, shared call keeps running.
        assert_eq!(f.calls.call_info(group_a).await, (None, None));
        assert_eq!(f.calls.participant_count(group_b).await, Some(1));
    }
}
