//! Connection-facing handlers: heartbeat, echo, join, leave, resume. These
//! are the handlers that establish or tear down `ConnectionContext::participant`,
//! the per-socket state every other handler in this module tree depends on.

use std::sync::Arc;

use protocol::{
    ConnectionEchoTestPayload, EchoPayload, GameStateSnapshotPayload, JoinStreamPayload, PongPayload,
    ResumeMigratedPayload, ResumeOkPayload, ResumePayload, Role, wire_message,
};

use crate::errors::RouterError;
use crate::relay;
use crate::router::ConnectionContext;
use crate::state::AppState;

pub fn handle_ping(state: &Arc<AppState>, ctx: &mut ConnectionContext) -> Result<(), RouterError> {
    let value = wire_message("pong", &PongPayload { ts: now_ms() });
    ctx.handle.send_value(&value);
    let _ = state;
    Ok(())
}

pub fn handle_echo(state: &Arc<AppState>, ctx: &mut ConnectionContext, payload: EchoPayload) -> Result<(), RouterError> {
    let value = wire_message("connection_echo_test", &ConnectionEchoTestPayload { payload: payload.payload });
    ctx.handle.send_value(&value);
    let _ = state;
    Ok(())
}

pub fn handle_join_stream(
    state: &Arc<AppState>,
    ctx: &mut ConnectionContext,
    payload: JoinStreamPayload,
) -> Result<(), RouterError> {
    let JoinStreamPayload { stream_id, user_id } = payload;

    // A join_stream that arrives while already joined elsewhere first
    // leaves that room, matching the single-participant-entry invariant.
    if let Some((old_stream, old_user, _)) = ctx.participant.clone() {
        let outbound = state.rooms.leave_stream(&old_stream, &old_user);
        relay::dispatch(&state.rooms, &state.metrics, &state.coalescer, &state.flush_fn, outbound);
    }

    let role_guess = if state.rooms.room_exists(&stream_id) {
        Role::Viewer
    } else {
        Role::Host
    };
    let session_token = state.sessions.create_session(user_id.clone(), stream_id.clone(), role_guess);

    let outcome = state
        .rooms
        .join_stream(ctx.handle.clone(), stream_id.clone(), user_id.clone(), session_token)?;
    ctx.participant = Some((stream_id, user_id, outcome.role));

    relay::dispatch(&state.rooms, &state.metrics, &state.coalescer, &state.flush_fn, outcome.outbound);
    Ok(())
}

pub fn handle_leave_stream(state: &Arc<AppState>, ctx: &mut ConnectionContext) -> Result<(), RouterError> {
    let Some((stream_id, user_id, _)) = ctx.participant.take() else {
        return Ok(());
    };
    state.rate_limiter.release_user(&user_id);
    let outbound = state.rooms.leave_stream(&stream_id, &user_id);
    relay::dispatch(&state.rooms, &state.metrics, &state.coalescer, &state.flush_fn, outbound);
    Ok(())
}

pub fn handle_resume(state: &Arc<AppState>, ctx: &mut ConnectionContext, payload: ResumePayload) -> Result<(), RouterError> {
    let Some(session) = state.sessions.get_session(&payload.session_token) else {
        let value = wire_message(
            "error",
            &RouterError::SessionExpired.to_wire(None),
        );
        ctx.handle.send_value(&value);
        return Ok(());
    };

    if !state.rooms.room_exists(&session.stream_id) {
        let value = wire_message(
            "resume_migrated",
            &ResumeMigratedPayload {
                role: session.role,
                reason: "room_closed".to_string(),
            },
        );
        ctx.handle.send_value(&value);
        state.sessions.remove(&payload.session_token);
        return Ok(());
    }

    state.rooms.rejoin(ctx.handle.clone(), &session.stream_id, &session.user_id, session.role);
    ctx.participant = Some((session.stream_id.clone(), session.user_id.clone(), session.role));
    state
        .sessions
        .renew(&payload.session_token, session.role, session.queue_position);

    let snapshot = state.rooms.game_snapshot(&session.stream_id);
    let game_version = snapshot.as_ref().map(|(v, _, _)| *v).unwrap_or(0);

    let value = wire_message(
        "resume_ok",
        &ResumeOkPayload {
            role: session.role,
            position: session.queue_position,
            game_state_version: game_version,
        },
    );
    ctx.handle.send_value(&value);

    if let Some((version, data, game_id)) = snapshot {
        if game_id.is_some() {
            let snapshot_value = wire_message(
                "game_state",
                &GameStateSnapshotPayload { version, full: true, data, game_id },
            );
            ctx.handle.send_value(&snapshot_value);
        }
    }
    Ok(())
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
