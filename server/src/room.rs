//! Room Registry: rooms, participants, roles, the co-host queue, and
//! per-room game state. Implemented as one coarse `Mutex` over the room map
//! plus one `Mutex` over the global `userId -> streamId` index — a direct
//! generalization of the teacher's own `Mutex<HashMap<String, Room>>` in
//! `lobby::AppState`, just with richer per-room contents than a broadcast
//! channel pair.
//!
//! Every mutating method here is synchronous and returns the list of
//! outbound deliveries it produced rather than sending them itself — the
//! lock is held only for the state mutation, and the caller (a handler, via
//! `relay`) performs the actual I/O after the lock is dropped. This gives
//! the ordering guarantee that notifications are emitted only after the
//! underlying Room mutation is committed: the Vec can't exist until the
//! mutation that built it already happened.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use protocol::{
    CohostAcceptedPayload, CohostDeclinedPayload, CohostEndedPayload, CohostQueueEntryWire,
    CohostQueueUpdatedPayload, CohostRequestNotifyPayload, GameEventForwardPayload,
    GameInitBroadcastPayload, GameStateSnapshotPayload, JoinConfirmedPayload, JoinedStreamPayload,
    ParticipantCountUpdatePayload, Role, RoomClosedPayload, SessionToken, StreamId, UserId,
    wire_message,
};
use serde_json::Value;

use crate::connection::ConnectionHandle;
use crate::errors::RouterError;

pub const MAX_PARTICIPANTS: usize = 100;
/// A room with no host present longer than this is reaped as idle.
pub const HOST_ABSENT_TIMEOUT_SECS: u64 = 120;

/// Wall-clock milliseconds since the Unix epoch, used for co-host queue
/// entry timestamps and the default game seed.
fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Clone)]
pub struct Participant {
    pub handle: ConnectionHandle,
    pub user_id: UserId,
    pub role: Role,
}

#[derive(Default, Clone)]
pub struct GameState {
    pub version: u64,
    pub data: Option<Value>,
    pub game_id: Option<String>,
    pub seed: Option<u64>,
}

pub struct Room {
    pub stream_id: StreamId,
    pub participants: HashMap<UserId, Participant>,
    pub active_guest_id: Option<UserId>,
    pub cohost_queue: VecDeque<(UserId, i64)>,
    pub game_state: GameState,
    /// `None` while a host is present; set to the instant the host left
    /// otherwise, so the idle reaper can compare against now.
    pub host_absent_since: Option<Instant>,
}

impl Room {
    fn new(stream_id: StreamId) -> Self {
        Room {
            stream_id,
            participants: HashMap::new(),
            active_guest_id: None,
            cohost_queue: VecDeque::new(),
            game_state: GameState::default(),
            host_absent_since: None,
        }
    }

    pub fn host_user_id(&self) -> Option<UserId> {
        self.participants
            .values()
            .find(|p| p.role == Role::Host)
            .map(|p| p.user_id.clone())
    }

    fn queue_wire(&self) -> CohostQueueUpdatedPayload {
        CohostQueueUpdatedPayload {
            queue: self
                .cohost_queue
                .iter()
                .map(|(user_id, timestamp)| CohostQueueEntryWire {
                    user_id: user_id.clone(),
                    timestamp: *timestamp,
                })
                .collect(),
        }
    }
}

/// An outbound delivery produced by a Room Registry mutation, to be carried
/// out by `relay` once the registry lock is released.
#[derive(Clone)]
pub enum Outbound {
    ToUser {
        user_id: UserId,
        kind: &'static str,
        value: Value,
    },
    ToRoom {
        stream_id: StreamId,
        kind: &'static str,
        value: Value,
    },
    /// Routed through the Coalescer rather than sent immediately.
    Coalesced {
        stream_id: StreamId,
        kind: &'static str,
        value: Value,
    },
}

pub struct JoinOutcome {
    pub role: Role,
    pub outbound: Vec<Outbound>,
}

#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<StreamId, Room>>,
    user_index: Mutex<HashMap<UserId, StreamId>>,
}

impl RoomRegistry {
    pub fn room_count(&self) -> usize {
        self.rooms.lock().expect("rooms lock poisoned").len()
    }

    /// Joins or creates a room: first participant becomes host, everyone
    /// else a viewer.
    pub fn join_stream(
        &self,
        handle: ConnectionHandle,
        stream_id: StreamId,
        user_id: UserId,
        session_token: SessionToken,
    ) -> Result<JoinOutcome, RouterError> {
        let mut rooms = self.rooms.lock().expect("rooms lock poisoned");
        let room = rooms
            .entry(stream_id.clone())
            .or_insert_with(|| Room::new(stream_id.clone()));

        let already_present = room.participants.contains_key(&user_id);
        if room.participants.len() >= MAX_PARTICIPANTS && !already_present {
            return Err(RouterError::RoomFull);
        }

        let role = if already_present {
            room.participants[&user_id].role
        } else if room.participants.is_empty() {
            Role::Host
        } else {
            Role::Viewer
        };

        room.participants.insert(
            user_id.clone(),
            Participant {
                handle,
                user_id: user_id.clone(),
                role,
            },
        );
        if role == Role::Host {
            room.host_absent_since = None;
        }

        drop(rooms);
        self.user_index
            .lock()
            .expect("user index lock poisoned")
            .entry(user_id.clone())
            .or_insert_with(|| stream_id.clone());

        let rooms = self.rooms.lock().expect("rooms lock poisoned");
        let room = rooms.get(&stream_id).expect("room just inserted");

        let mut outbound = vec![Outbound::ToUser {
            user_id: user_id.clone(),
            kind: "join_confirmed",
            value: wire_message(
                "join_confirmed",
                &JoinConfirmedPayload {
                    role,
                    session_token,
                    stream_id: stream_id.clone(),
                    user_id: user_id.clone(),
                },
            ),
        }];

        if role != Role::Host {
            if let Some(host_id) = room.host_user_id() {
                outbound.push(Outbound::ToUser {
                    user_id: host_id,
                    kind: "joined_stream",
                    value: wire_message("joined_stream", &JoinedStreamPayload { user_id: user_id.clone() }),
                });
            }
        }

        outbound.push(Outbound::ToRoom {
            stream_id: stream_id.clone(),
            kind: "participant_count_update",
            value: wire_message(
                "participant_count_update",
                &ParticipantCountUpdatePayload {
                    count: room.participants.len() as u32,
                },
            ),
        });

        if room.game_state.game_id.is_some() {
            outbound.push(Outbound::ToUser {
                user_id,
                kind: "game_state",
                value: wire_message(
                    "game_state",
                    &GameStateSnapshotPayload {
                        version: room.game_state.version,
                        full: true,
                        data: room.game_state.data.clone(),
                        game_id: room.game_state.game_id.clone(),
                    },
                ),
            });
        }

        Ok(JoinOutcome { role, outbound })
    }

    /// Removes a participant from a room; also used on implicit close.
    pub fn leave_stream(&self, stream_id: &str, user_id: &str) -> Vec<Outbound> {
        let mut rooms = self.rooms.lock().expect("rooms lock poisoned");
        let Some(room) = rooms.get_mut(stream_id) else {
            return Vec::new();
        };
        let Some(departed) = room.participants.remove(user_id) else {
            return Vec::new();
        };
        room.cohost_queue.retain(|(uid, _)| uid != user_id);

        let mut outbound = Vec::new();

        if room.active_guest_id.as_deref() == Some(user_id) {
            room.active_guest_id = None;
            if let Some(host_id) = room.host_user_id() {
                outbound.push(Outbound::ToUser {
                    user_id: host_id,
                    kind: "cohost_ended",
                    value: wire_message(
                        "cohost_ended",
                        &CohostEndedPayload {
                            by: "guest".to_string(),
                            guest_user_id: Some(user_id.to_string()),
                        },
                    ),
                });
                outbound.push(Outbound::ToRoom {
                    stream_id: stream_id.to_string(),
                    kind: "cohost_queue_updated",
                    value: wire_message("cohost_queue_updated", &room.queue_wire()),
                });
            }
        } else if departed.role == Role::Host {
            if let Some(guest_id) = room.active_guest_id.clone() {
                outbound.push(Outbound::ToUser {
                    user_id: guest_id,
                    kind: "cohost_ended",
                    value: wire_message(
                        "cohost_ended",
                        &CohostEndedPayload {
                            by: "host".to_string(),
                            guest_user_id: None,
                        },
                    ),
                });
            }
            room.host_absent_since = Some(Instant::now());
        }

        let is_empty = room.participants.is_empty();
        if !is_empty {
            outbound.push(Outbound::ToRoom {
                stream_id: stream_id.to_string(),
                kind: "participant_count_update",
                value: wire_message(
                    "participant_count_update",
                    &ParticipantCountUpdatePayload {
                        count: room.participants.len() as u32,
                    },
                ),
            });
        }
        if is_empty {
            rooms.remove(stream_id);
        }
        drop(rooms);

        let mut user_index = self.user_index.lock().expect("user index lock poisoned");
        if user_index.get(user_id).map(String::as_str) == Some(stream_id) {
            user_index.remove(user_id);
        }

        outbound
    }

    pub fn cohost_request(&self, stream_id: &str, viewer_user_id: &str) -> Vec<Outbound> {
        let mut rooms = self.rooms.lock().expect("rooms lock poisoned");
        let Some(room) = rooms.get_mut(stream_id) else {
            return Vec::new();
        };

        if room.active_guest_id.is_some() {
            return vec![Outbound::ToUser {
                user_id: viewer_user_id.to_string(),
                kind: "cohost_declined",
                value: wire_message(
                    "cohost_declined",
                    &CohostDeclinedPayload {
                        reason: "guest_active".to_string(),
                    },
                ),
            }];
        }

        if !room.cohost_queue.iter().any(|(uid, _)| uid == viewer_user_id) {
            room.cohost_queue.push_back((viewer_user_id.to_string(), now_ms()));
        }

        let mut outbound = Vec::new();
        if let Some(host_id) = room.host_user_id() {
            outbound.push(Outbound::ToUser {
                user_id: host_id.clone(),
                kind: "cohost_request",
                value: wire_message(
                    "cohost_request",
                    &CohostRequestNotifyPayload {
                        from_user_id: viewer_user_id.to_string(),
                    },
                ),
            });
            outbound.push(Outbound::ToUser {
                user_id: host_id,
                kind: "cohost_queue_updated",
                value: wire_message("cohost_queue_updated", &room.queue_wire()),
            });
        }
        outbound
    }

    pub fn cohost_cancel(&self, stream_id: &str, viewer_user_id: &str) -> Vec<Outbound> {
        let mut rooms = self.rooms.lock().expect("rooms lock poisoned");
        let Some(room) = rooms.get_mut(stream_id) else {
            return Vec::new();
        };
        room.cohost_queue.retain(|(uid, _)| uid != viewer_user_id);
        let Some(host_id) = room.host_user_id() else {
            return Vec::new();
        };
        vec![Outbound::ToUser {
            user_id: host_id,
            kind: "cohost_queue_updated",
            value: wire_message("cohost_queue_updated", &room.queue_wire()),
        }]
    }

    pub fn cohost_accept(
        &self,
        stream_id: &str,
        requester_user_id: &str,
        guest_user_id: &str,
    ) -> Result<Vec<Outbound>, RouterError> {
        let mut rooms = self.rooms.lock().expect("rooms lock poisoned");
        let room = rooms.get_mut(stream_id).ok_or(RouterError::NotHost)?;
        if room.host_user_id().as_deref() != Some(requester_user_id) {
            return Err(RouterError::NotHost);
        }
        if room.active_guest_id.is_some() {
            return Err(RouterError::InvalidRequest("a guest is already active".to_string()));
        }
        room.cohost_queue.retain(|(uid, _)| uid != guest_user_id);
        room.active_guest_id = Some(guest_user_id.to_string());
        if let Some(participant) = room.participants.get_mut(guest_user_id) {
            participant.role = Role::Guest;
        }

        let mut outbound = vec![Outbound::ToUser {
            user_id: guest_user_id.to_string(),
            kind: "cohost_accepted",
            value: wire_message(
                "cohost_accepted",
                &CohostAcceptedPayload {
                    stream_id: stream_id.to_string(),
                },
            ),
        }];
        outbound.push(Outbound::ToUser {
            user_id: requester_user_id.to_string(),
            kind: "cohost_queue_updated",
            value: wire_message("cohost_queue_updated", &room.queue_wire()),
        });
        Ok(outbound)
    }

    pub fn cohost_decline(
        &self,
        stream_id: &str,
        requester_user_id: &str,
        viewer_user_id: &str,
        reason: Option<String>,
    ) -> Result<Vec<Outbound>, RouterError> {
        let mut rooms = self.rooms.lock().expect("rooms lock poisoned");
        let room = rooms.get_mut(stream_id).ok_or(RouterError::NotHost)?;
        if room.host_user_id().as_deref() != Some(requester_user_id) {
            return Err(RouterError::NotHost);
        }
        room.cohost_queue.retain(|(uid, _)| uid != viewer_user_id);
        let reason = reason.unwrap_or_else(|| "declined".to_string());
        Ok(vec![
            Outbound::ToUser {
                user_id: viewer_user_id.to_string(),
                kind: "cohost_declined",
                value: wire_message("cohost_declined", &CohostDeclinedPayload { reason }),
            },
            Outbound::ToUser {
                user_id: requester_user_id.to_string(),
                kind: "cohost_queue_updated",
                value: wire_message("cohost_queue_updated", &room.queue_wire()),
            },
        ])
    }

    pub fn cohost_end(&self, stream_id: &str, by: &str) -> Vec<Outbound> {
        let mut rooms = self.rooms.lock().expect("rooms lock poisoned");
        let Some(room) = rooms.get_mut(stream_id) else {
            return Vec::new();
        };
        let Some(guest_id) = room.active_guest_id.take() else {
            return Vec::new();
        };
        if let Some(participant) = room.participants.get_mut(&guest_id) {
            participant.role = Role::Viewer;
        }

        let mut outbound = Vec::new();
        if let Some(host_id) = room.host_user_id() {
            outbound.push(Outbound::ToUser {
                user_id: host_id,
                kind: "cohost_ended",
                value: wire_message(
                    "cohost_ended",
                    &CohostEndedPayload {
                        by: by.to_string(),
                        guest_user_id: Some(guest_id.clone()),
                    },
                ),
            });
        }
        outbound.push(Outbound::ToUser {
            user_id: guest_id,
            kind: "cohost_ended",
            value: wire_message(
                "cohost_ended",
                &CohostEndedPayload {
                    by: by.to_string(),
                    guest_user_id: None,
                },
            ),
        });
        if let Some(host_id) = room.host_user_id() {
            outbound.push(Outbound::ToUser {
                user_id: host_id,
                kind: "cohost_queue_updated",
                value: wire_message("cohost_queue_updated", &room.queue_wire()),
            });
        }
        outbound
    }

    /// `cohost_{mute,unmute,cam_off,cam_on}`: relay the same type to the
    /// active guest; no-op if none.
    pub fn cohost_target_relay(&self, stream_id: &str, kind: &'static str, value: Value) -> Vec<Outbound> {
        let rooms = self.rooms.lock().expect("rooms lock poisoned");
        let Some(room) = rooms.get(stream_id) else {
            return Vec::new();
        };
        match &room.active_guest_id {
            Some(guest_id) => vec![Outbound::ToUser {
                user_id: guest_id.clone(),
                kind,
                value,
            }],
            None => Vec::new(),
        }
    }

    pub fn game_init(
        &self,
        stream_id: &str,
        requester_user_id: &str,
        game_id: String,
        version: Option<u64>,
        seed: Option<u64>,
    ) -> Result<Vec<Outbound>, RouterError> {
        let mut rooms = self.rooms.lock().expect("rooms lock poisoned");
        let room = rooms.get_mut(stream_id).ok_or(RouterError::NotHost)?;
        if room.host_user_id().as_deref() != Some(requester_user_id) {
            return Err(RouterError::NotHost);
        }
        let version = version.unwrap_or(1).max(1);
        let seed = seed.unwrap_or_else(|| now_ms() as u64);
        room.game_state = GameState {
            version,
            data: None,
            game_id: Some(game_id.clone()),
            seed: Some(seed),
        };
        Ok(vec![Outbound::ToRoom {
            stream_id: stream_id.to_string(),
            kind: "game_init",
            value: wire_message("game_init", &GameInitBroadcastPayload { game_id, version, seed }),
        }])
    }

    /// `game_state`: mutates and returns a single `Outbound::Coalesced`
    /// directive; the caller routes it through the Coalescer rather than
    /// sending it immediately.
    pub fn game_state(
        &self,
        stream_id: &str,
        requester_user_id: &str,
        version: Option<u64>,
        full: Option<bool>,
        patch: Option<Value>,
    ) -> Result<Vec<Outbound>, RouterError> {
        let mut rooms = self.rooms.lock().expect("rooms lock poisoned");
        let room = rooms.get_mut(stream_id).ok_or(RouterError::NotHost)?;
        if room.host_user_id().as_deref() != Some(requester_user_id) {
            return Err(RouterError::NotHost);
        }
        let is_full = full.unwrap_or(false);
        if is_full {
            room.game_state.data = patch.clone();
        } else if let Some(patch) = patch.clone() {
            merge_patch(room.game_state.data.get_or_insert(Value::Object(Default::default())), &patch);
        }
        room.game_state.version = version.unwrap_or(room.game_state.version + 1);

        Ok(vec![Outbound::Coalesced {
            stream_id: stream_id.to_string(),
            kind: "game_state",
            value: wire_message(
                "game_state",
                &GameStateSnapshotPayload {
                    version: room.game_state.version,
                    full: is_full,
                    data: room.game_state.data.clone(),
                    game_id: room.game_state.game_id.clone(),
                },
            ),
        }])
    }

    /// `game_event`: forwarded to the host content-blind, dropped silently
    /// if absent. Any role may send one.
    pub fn game_event(
        &self,
        stream_id: &str,
        from_user_id: &str,
        event_type: String,
        payload: Option<Value>,
    ) -> Vec<Outbound> {
        let rooms = self.rooms.lock().expect("rooms lock poisoned");
        let Some(room) = rooms.get(stream_id) else {
            return Vec::new();
        };
        let Some(host_id) = room.host_user_id() else {
            return Vec::new();
        };
        vec![Outbound::ToUser {
            user_id: host_id,
            kind: "game_event",
            value: wire_message(
                "game_event",
                &GameEventForwardPayload {
                    from: from_user_id.to_string(),
                    event_type,
                    payload,
                },
            ),
        }]
    }

    /// Resolves the literal `toUserId = "host"` target used by
    /// `webrtc_offer`/`webrtc_answer`/`ice_candidate`/`request_keyframe`.
    pub fn resolve_host(&self, stream_id: &str) -> Option<UserId> {
        let rooms = self.rooms.lock().expect("rooms lock poisoned");
        rooms.get(stream_id).and_then(|room| room.host_user_id())
    }

    /// First-match-wins global lookup used by `relay::relay_to_user`.
    pub fn stream_of_user(&self, user_id: &str) -> Option<StreamId> {
        self.user_index
            .lock()
            .expect("user index lock poisoned")
            .get(user_id)
            .cloned()
    }

    pub fn participant_handle(&self, stream_id: &str, user_id: &str) -> Option<ConnectionHandle> {
        let rooms = self.rooms.lock().expect("rooms lock poisoned");
        rooms
            .get(stream_id)
            .and_then(|room| room.participants.get(user_id))
            .map(|p| p.handle.clone())
    }

    pub fn room_participant_handles(&self, stream_id: &str) -> Vec<ConnectionHandle> {
        let rooms = self.rooms.lock().expect("rooms lock poisoned");
        rooms
            .get(stream_id)
            .map(|room| room.participants.values().map(|p| p.handle.clone()).collect())
            .unwrap_or_default()
    }

    /// Restores a participant under its original `(streamId, userId)` on
    /// resume, overwriting any pre-existing entry for that pair.
    pub fn rejoin(&self, handle: ConnectionHandle, stream_id: &str, user_id: &str, role: Role) {
        let mut rooms = self.rooms.lock().expect("rooms lock poisoned");
        let room = rooms
            .entry(stream_id.to_string())
            .or_insert_with(|| Room::new(stream_id.to_string()));
        room.participants.insert(
            user_id.to_string(),
            Participant {
                handle,
                user_id: user_id.to_string(),
                role,
            },
        );
        if role == Role::Host {
            room.host_absent_since = None;
        }
        drop(rooms);
        self.user_index
            .lock()
            .expect("user index lock poisoned")
            .entry(user_id.to_string())
            .or_insert_with(|| stream_id.to_string());
    }

    /// `(version, data, gameId)` snapshot used by resume and join to send a
    /// full `game_state` catch-up.
    pub fn game_snapshot(&self, stream_id: &str) -> Option<(u64, Option<Value>, Option<String>)> {
        let rooms = self.rooms.lock().expect("rooms lock poisoned");
        rooms.get(stream_id).map(|room| {
            (
                room.game_state.version,
                room.game_state.data.clone(),
                room.game_state.game_id.clone(),
            )
        })
    }

    pub fn room_exists(&self, stream_id: &str) -> bool {
        self.rooms.lock().expect("rooms lock poisoned").contains_key(stream_id)
    }

    /// `/healthz` summary: one entry per room with its viewer count
    /// (participants with role Viewer; host and guest excluded, since the
    /// admin surface is reporting receive-only audience size).
    pub fn room_summaries(&self) -> Vec<(StreamId, usize)> {
        let rooms = self.rooms.lock().expect("rooms lock poisoned");
        rooms
            .values()
            .map(|room| {
                let viewers = room.participants.values().filter(|p| p.role == Role::Viewer).count();
                (room.stream_id.clone(), viewers)
            })
            .collect()
    }

    /// Idle-room reaper sweep: rooms with no host present for longer than
    /// `HOST_ABSENT_TIMEOUT_SECS` are closed and removed.
    pub fn reap_idle_rooms(&self) -> Vec<(StreamId, Vec<ConnectionHandle>)> {
        let mut rooms = self.rooms.lock().expect("rooms lock poisoned");
        let now = Instant::now();
        let mut reaped = Vec::new();
        rooms.retain(|stream_id, room| {
            let expired = room
                .host_absent_since
                .is_some_and(|since| now.duration_since(since).as_secs() > HOST_ABSENT_TIMEOUT_SECS);
            if expired {
                let handles = room.participants.values().map(|p| p.handle.clone()).collect();
                reaped.push((stream_id.clone(), handles));
            }
            !expired
        });
        drop(rooms);

        let mut user_index = self.user_index.lock().expect("user index lock poisoned");
        let reaped_streams: Vec<&str> = reaped.iter().map(|(s, _)| s.as_str()).collect();
        user_index.retain(|_, stream_id| !reaped_streams.contains(&stream_id.as_str()));
        reaped
    }

    pub fn room_closed_message(reason: &str) -> Value {
        wire_message("room_closed", &RoomClosedPayload { reason: reason.to_string() })
    }
}

/// Shallow merge of `patch` into `target`, used for non-full `game_state`
/// updates.
fn merge_patch(target: &mut Value, patch: &Value) {
    if let (Value::Object(target), Value::Object(patch)) = (target, patch) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionHandle;

    fn handle() -> ConnectionHandle {
        ConnectionHandle::new(crate::connection::next_socket_id()).0
    }

    #[test]
    fn first_joiner_becomes_host() {
        let registry = RoomRegistry::default();
        let outcome = registry
            .join_stream(handle(), "r1".into(), "u1".into(), "sess_1".into())
            .unwrap();
        assert_eq!(outcome.role, Role::Host);
    }

    #[test]
    fn second_joiner_becomes_viewer_and_host_is_notified() {
        let registry = RoomRegistry::default();
        registry.join_stream(handle(), "r1".into(), "u1".into(), "sess_1".into()).unwrap();
        let outcome = registry
            .join_stream(handle(), "r1".into(), "u2".into(), "sess_2".into())
            .unwrap();
        assert_eq!(outcome.role, Role::Viewer);
        assert!(outcome.outbound.iter().any(|o| matches!(o, Outbound::ToUser { kind, .. } if *kind == "join_confirmed")));
    }

    #[test]
    fn full_room_rejects_new_user() {
        let registry = RoomRegistry::default();
        for i in 0..MAX_PARTICIPANTS {
            registry
                .join_stream(handle(), "r1".into(), format!("u{i}"), format!("sess_{i}"))
                .unwrap();
        }
        let result = registry.join_stream(handle(), "r1".into(), "overflow".into(), "sess_x".into());
        assert!(matches!(result, Err(RouterError::RoomFull)));
    }

    #[test]
    fn full_room_still_allows_existing_member_rejoin() {
        let registry = RoomRegistry::default();
        for i in 0..MAX_PARTICIPANTS {
            registry
                .join_stream(handle(), "r1".into(), format!("u{i}"), format!("sess_{i}"))
                .unwrap();
        }
        let result = registry.join_stream(handle(), "r1".into(), "u0".into(), "sess_new".into());
        assert!(result.is_ok());
    }

    #[test]
    fn leaving_host_marks_host_absent() {
        let registry = RoomRegistry::default();
        registry.join_stream(handle(), "r1".into(), "u1".into(), "sess_1".into()).unwrap();
        registry.leave_stream("r1", "u1");
        assert!(registry.room_exists("r1"));
    }

    #[test]
    fn last_participant_leaving_destroys_room() {
        let registry = RoomRegistry::default();
        registry.join_stream(handle(), "r1".into(), "u1".into(), "sess_1".into()).unwrap();
        registry.leave_stream("r1", "u1");
        assert!(!registry.room_exists("r1"));
    }

    #[test]
    fn cohost_accept_promotes_viewer_and_rejects_second_guest() {
        let registry = RoomRegistry::default();
        registry.join_stream(handle(), "r1".into(), "host".into(), "s0".into()).unwrap();
        registry.join_stream(handle(), "r1".into(), "viewer1".into(), "s1".into()).unwrap();
        registry.join_stream(handle(), "r1".into(), "viewer2".into(), "s2".into()).unwrap();

        registry.cohost_request("r1", "viewer1");
        registry.cohost_accept("r1", "host", "viewer1").unwrap();

        let declined = registry.cohost_request("r1", "viewer2");
        assert!(declined.iter().any(|o| matches!(o, Outbound::ToUser { kind, .. } if *kind == "cohost_declined")));
    }

    #[test]
    fn game_state_requires_host() {
        let registry = RoomRegistry::default();
        registry.join_stream(handle(), "r1".into(), "host".into(), "s0".into()).unwrap();
        registry.join_stream(handle(), "r1".into(), "viewer".into(), "s1".into()).unwrap();
        let result = registry.game_state("r1", "viewer", Some(1), Some(true), None);
        assert!(matches!(result, Err(RouterError::NotHost)));
    }

    #[test]
    fn game_state_version_is_monotonic_via_explicit_values() {
        let registry = RoomRegistry::default();
        registry.join_stream(handle(), "r1".into(), "host".into(), "s0".into()).unwrap();
        registry
            .game_state("r1", "host", Some(5), Some(true), Some(Value::from(1)))
            .unwrap();
        registry
            .game_state("r1", "host", Some(9), Some(false), Some(Value::from(2)))
            .unwrap();
    }
}
