//! Game-state handlers: `game_init`, `game_state`, `game_event`. Write
//! access (`game_init`/`game_state`) is host-only and
//! enforced inside `RoomRegistry`; `game_event` may come from any role and
//! is rate-limited per userId before being forwarded content-blind to the
//! host.

use std::sync::Arc;

use protocol::{GameEventPayload, GameInitPayload, GameStatePayload};

use crate::errors::RouterError;
use crate::rate_limit;
use crate::relay;
use crate::router::ConnectionContext;
use crate::state::AppState;

pub fn handle_init(state: &Arc<AppState>, ctx: &mut ConnectionContext, payload: GameInitPayload) -> Result<(), RouterError> {
    let Some((stream_id, user_id, _)) = ctx.participant.clone() else {
        return Err(RouterError::NotHost);
    };
    if stream_id != payload.stream_id {
        return Err(RouterError::InvalidInit("streamId does not match the joined room".to_string()));
    }
    let outbound = state
        .rooms
        .game_init(&stream_id, &user_id, payload.game_id, payload.version, payload.seed)?;
    relay::dispatch(&state.rooms, &state.metrics, &state.coalescer, &state.flush_fn, outbound);
    Ok(())
}

pub fn handle_state(state: &Arc<AppState>, ctx: &mut ConnectionContext, payload: GameStatePayload) -> Result<(), RouterError> {
    let Some((stream_id, user_id, _)) = ctx.participant.clone() else {
        return Err(RouterError::NotHost);
    };
    if stream_id != payload.stream_id {
        return Err(RouterError::InvalidState("streamId does not match the joined room".to_string()));
    }
    let outbound = state
        .rooms
        .game_state(&stream_id, &user_id, payload.version, payload.full, payload.patch)?;
    relay::dispatch(&state.rooms, &state.metrics, &state.coalescer, &state.flush_fn, outbound);
    Ok(())
}

pub fn handle_event(state: &Arc<AppState>, ctx: &mut ConnectionContext, payload: GameEventPayload) -> Result<(), RouterError> {
    let Some((stream_id, user_id, _)) = ctx.participant.clone() else {
        return Err(RouterError::InvalidEvent("must join a room before sending game events".to_string()));
    };
    if stream_id != payload.stream_id {
        return Err(RouterError::InvalidEvent("streamId does not match the joined room".to_string()));
    }
    let key = rate_limit::key("game_event", ctx.rate_limit_key_user());
    if !state.rate_limiter.try_consume(&key, rate_limit::GAME_EVENT, 1.0) {
        return Err(RouterError::RateLimited);
    }
    let outbound = state.rooms.game_event(&stream_id, &user_id, payload.event_type, payload.payload);
    relay::dispatch(&state.rooms, &state.metrics, &state.coalescer, &state.flush_fn, outbound);
    Ok(())
}
