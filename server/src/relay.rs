//! Relay / Broadcast: turns the `Outbound` directives a Room Registry
//! mutation produced into actual deliveries, applying the Backpressure
//! Monitor and the Coalescer and updating the Metrics Tracker along the way.
//! This is the async boundary between "state mutation" (room.rs,
//! synchronous, lock-held) and "I/O" (here).

use protocol::StreamId;
use serde_json::Value;

use crate::backpressure;
use crate::coalescer::{Coalescer, FlushFn};
use crate::connection::ConnectionHandle;
use crate::metrics::Metrics;
use crate::room::{Outbound, RoomRegistry};

/// Global lookup by userId, "first match wins" across rooms per the Open
/// Question resolution in DESIGN.md.
pub fn relay_to_user(registry: &RoomRegistry, metrics: &Metrics, user_id: &str, kind: &str, value: &Value) -> bool {
    let Some(stream_id) = registry.stream_of_user(user_id) else {
        tracing::debug!(user_id, kind, "relay target not found");
        return false;
    };
    let Some(handle) = registry.participant_handle(&stream_id, user_id) else {
        return false;
    };
    deliver(metrics, &handle, kind, value)
}

/// Fan-out to every open connection in the room, honoring backpressure
/// identically per-recipient.
pub fn broadcast_to_room(registry: &RoomRegistry, metrics: &Metrics, stream_id: &str, kind: &str, value: &Value) {
    for handle in registry.room_participant_handles(stream_id) {
        deliver(metrics, &handle, kind, value);
    }
}

fn deliver(metrics: &Metrics, handle: &ConnectionHandle, kind: &str, value: &Value) -> bool {
    if !handle.is_open() {
        return false;
    }
    if backpressure::should_drop(handle.queue_bytes(), kind) {
        metrics.incr(&format!("msgs_dropped_{kind}"));
        return false;
    }
    let sent = handle.send_value(value);
    if !sent {
        metrics.incr(&format!("msgs_dropped_{kind}"));
    }
    sent
}

/// Dispatches a full batch of `Outbound` directives produced by one Room
/// Registry call, routing `Coalesced` entries through the Coalescer instead
/// of sending them immediately.
pub fn dispatch(
    registry: &RoomRegistry,
    metrics: &Metrics,
    coalescer: &Coalescer,
    flush: &FlushFn,
    outbound: Vec<Outbound>,
) {
    for directive in outbound {
        match directive {
            Outbound::ToUser { user_id, kind, value } => {
                relay_to_user(registry, metrics, &user_id, kind, &value);
            }
            Outbound::ToRoom { stream_id, kind, value } => {
                broadcast_to_room(registry, metrics, &stream_id, kind, &value);
            }
            Outbound::Coalesced { stream_id, kind, value } => {
                coalesce_one(coalescer, stream_id, kind, value, flush.clone());
            }
        }
    }
}

fn coalesce_one(coalescer: &Coalescer, stream_id: StreamId, kind: &'static str, value: Value, flush: FlushFn) {
    coalescer.coalesce(stream_id, kind.to_string(), value, flush);
}

/// Builds the flush callback the Coalescer invokes once a `(room, kind)`
/// window closes: keeps only the newest entry for kinds like `game_state`
/// and broadcasts it.
pub fn make_flush_fn(registry: std::sync::Arc<RoomRegistry>, metrics: std::sync::Arc<Metrics>) -> FlushFn {
    std::sync::Arc::new(move |stream_id: StreamId, kind: String, batch: Vec<Value>| {
        let registry = registry.clone();
        let metrics = metrics.clone();
        Box::pin(async move {
            let latest = crate::coalescer::keep_last(batch);
            for value in latest {
                broadcast_to_room(&registry, &metrics, &stream_id, &kind, &value);
            }
        })
    })
}
