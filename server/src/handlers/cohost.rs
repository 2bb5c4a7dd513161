//! Co-host queue handlers: `cohost_request`, `cohost_cancel`,
//! `cohost_accept`, `cohost_decline`, `cohost_end`, and the four
//! mute/cam relay-only kinds. The queue mutation itself lives in
//! `RoomRegistry`; these handlers only resolve the sender's identity from
//! `ConnectionContext` and enforce the host-only gate for the four target
//! kinds, which the registry has no way to check on its own.

use std::sync::Arc;

use protocol::{CohostAcceptPayload, CohostDeclinePayload, CohostEndPayload, CohostTargetPayload, wire_message};

use crate::errors::RouterError;
use crate::relay;
use crate::router::ConnectionContext;
use crate::state::AppState;

fn require_participant(ctx: &ConnectionContext) -> Result<(String, String), RouterError> {
    ctx.participant
        .as_ref()
        .map(|(stream_id, user_id, _)| (stream_id.clone(), user_id.clone()))
        .ok_or_else(|| RouterError::InvalidRequest("not joined to a room".to_string()))
}

pub fn handle_request(state: &Arc<AppState>, ctx: &mut ConnectionContext) -> Result<(), RouterError> {
    let (stream_id, user_id) = require_participant(ctx)?;
    let outbound = state.rooms.cohost_request(&stream_id, &user_id);
    relay::dispatch(&state.rooms, &state.metrics, &state.coalescer, &state.flush_fn, outbound);
    Ok(())
}

pub fn handle_cancel(state: &Arc<AppState>, ctx: &mut ConnectionContext) -> Result<(), RouterError> {
    let (stream_id, user_id) = require_participant(ctx)?;
    let outbound = state.rooms.cohost_cancel(&stream_id, &user_id);
    relay::dispatch(&state.rooms, &state.metrics, &state.coalescer, &state.flush_fn, outbound);
    Ok(())
}

pub fn handle_accept(state: &Arc<AppState>, ctx: &mut ConnectionContext, payload: CohostAcceptPayload) -> Result<(), RouterError> {
    let (_, user_id) = require_participant(ctx)?;
    let outbound = state.rooms.cohost_accept(&payload.stream_id, &user_id, &payload.guest_user_id)?;
    relay::dispatch(&state.rooms, &state.metrics, &state.coalescer, &state.flush_fn, outbound);
    Ok(())
}

pub fn handle_decline(state: &Arc<AppState>, ctx: &mut ConnectionContext, payload: CohostDeclinePayload) -> Result<(), RouterError> {
    let (_, user_id) = require_participant(ctx)?;
    let outbound = state
        .rooms
        .cohost_decline(&payload.stream_id, &user_id, &payload.viewer_user_id, payload.reason)?;
    relay::dispatch(&state.rooms, &state.metrics, &state.coalescer, &state.flush_fn, outbound);
    Ok(())
}

pub fn handle_end(state: &Arc<AppState>, ctx: &mut ConnectionContext, payload: CohostEndPayload) -> Result<(), RouterError> {
    require_participant(ctx)?;
    let outbound = state.rooms.cohost_end(&payload.stream_id, &payload.by);
    relay::dispatch(&state.rooms, &state.metrics, &state.coalescer, &state.flush_fn, outbound);
    Ok(())
}

/// `cohost_{mute,unmute,cam_off,cam_on}`: host-only, relayed verbatim to the
/// active guest (no-op if none).
pub fn handle_target(
    state: &Arc<AppState>,
    ctx: &mut ConnectionContext,
    kind: &'static str,
    payload: CohostTargetPayload,
) -> Result<(), RouterError> {
    let (_, user_id) = require_participant(ctx)?;
    if state.rooms.resolve_host(&payload.stream_id).as_deref() != Some(user_id.as_str()) {
        return Err(RouterError::NotHost);
    }
    let value = wire_message(
        kind,
        &CohostTargetPayload {
            stream_id: payload.stream_id.clone(),
            target: payload.target.clone(),
        },
    );
    let outbound = state.rooms.cohost_target_relay(&payload.stream_id, kind, value);
    relay::dispatch(&state.rooms, &state.metrics, &state.coalescer, &state.flush_fn, outbound);
    Ok(())
}
