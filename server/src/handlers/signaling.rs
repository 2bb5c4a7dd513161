//! Signaling relay handlers: `webrtc_offer`, `webrtc_answer`,
//! `ice_candidate`, `request_offer`, `request_keyframe`. All four apply the
//! `toUserId = "host"` resolution rule; the server never inspects
//! `sdp`/`candidate`, only relays it verbatim to the resolved target — a
//! content-blind router.

use std::sync::Arc;

use protocol::{AnswerPayload, IceCandidatePayload, OfferPayload, RequestKeyframePayload, RequestOfferPayload, wire_message};
use serde_json::Value;

use crate::errors::RouterError;
use crate::rate_limit;
use crate::relay;
use crate::router::ConnectionContext;
use crate::state::AppState;

/// Resolves the literal `"host"` target to the room's actual host userId,
/// using the sender's own room to look it up. Falls back to the literal
/// string when the sender has no room context — the relay will then simply
/// find no participant named "host" and drop silently: a relay target not
/// found is logged, not treated as an error.
fn resolve_target(state: &Arc<AppState>, ctx: &ConnectionContext, to_user_id: String) -> String {
    if to_user_id != "host" {
        return to_user_id;
    }
    let Some((stream_id, _, _)) = &ctx.participant else {
        return to_user_id;
    };
    state.rooms.resolve_host(stream_id).unwrap_or(to_user_id)
}

/// Logs a relayed offer/answer at debug level; the SDP body itself is only
/// included when `DEBUG_SDP=true`, otherwise just its length.
fn log_sdp_relay(state: &Arc<AppState>, kind: &str, from: &str, to: &str, sdp: &Value) {
    if state.config.debug_sdp {
        tracing::debug!(kind, from, to, %sdp, "relaying signaling payload");
    } else {
        tracing::debug!(kind, from, to, sdp_len = sdp.to_string().len(), "relaying signaling payload");
    }
}

pub fn handle_offer(state: &Arc<AppState>, ctx: &mut ConnectionContext, payload: OfferPayload) -> Result<(), RouterError> {
    let target = resolve_target(state, ctx, payload.to_user_id.clone());
    log_sdp_relay(state, "webrtc_offer", &payload.from_user_id, &target, &payload.sdp);
    let value = wire_message(
        "webrtc_offer",
        &OfferPayload {
            to_user_id: target.clone(),
            from_user_id: payload.from_user_id,
            sdp: payload.sdp,
        },
    );
    relay::relay_to_user(&state.rooms, &state.metrics, &target, "webrtc_offer", &value);
    Ok(())
}

pub fn handle_answer(state: &Arc<AppState>, ctx: &mut ConnectionContext, payload: AnswerPayload) -> Result<(), RouterError> {
    let target = resolve_target(state, ctx, payload.to_user_id.clone());
    log_sdp_relay(state, "webrtc_answer", &payload.from_user_id, &target, &payload.sdp);
    let value = wire_message(
        "webrtc_answer",
        &AnswerPayload {
            to_user_id: target.clone(),
            from_user_id: payload.from_user_id,
            sdp: payload.sdp,
        },
    );
    relay::relay_to_user(&state.rooms, &state.metrics, &target, "webrtc_answer", &value);
    Ok(())
}

pub fn handle_ice_candidate(
    state: &Arc<AppState>,
    ctx: &mut ConnectionContext,
    payload: IceCandidatePayload,
) -> Result<(), RouterError> {
    let key = rate_limit::key("ice_candidate", ctx.rate_limit_key_user());
    if !state.rate_limiter.try_consume(&key, rate_limit::ICE_CANDIDATE, 1.0) {
        state.metrics.incr("rate_limited_ice_candidate");
        return Err(RouterError::RateLimited);
    }
    let target = resolve_target(state, ctx, payload.to_user_id.clone());
    let value = wire_message(
        "ice_candidate",
        &IceCandidatePayload {
            to_user_id: target.clone(),
            from_user_id: payload.from_user_id,
            candidate: payload.candidate,
        },
    );
    relay::relay_to_user(&state.rooms, &state.metrics, &target, "ice_candidate", &value);
    Ok(())
}

pub fn handle_request_offer(
    state: &Arc<AppState>,
    ctx: &mut ConnectionContext,
    payload: RequestOfferPayload,
) -> Result<(), RouterError> {
    relay_request(state, ctx, "request_offer", payload.to_user_id, payload.from_user_id, |to, from| {
        wire_message(
            "request_offer",
            &RequestOfferPayload { to_user_id: Some(to), from_user_id: from },
        )
    });
    Ok(())
}

pub fn handle_request_keyframe(
    state: &Arc<AppState>,
    ctx: &mut ConnectionContext,
    payload: RequestKeyframePayload,
) -> Result<(), RouterError> {
    relay_request(state, ctx, "request_keyframe", payload.to_user_id, payload.from_user_id, |to, from| {
        wire_message(
            "request_keyframe",
            &RequestKeyframePayload { to_user_id: Some(to), from_user_id: from },
        )
    });
    Ok(())
}

/// Shared relay path for the two no-payload "ask for a fresh …" kinds: an
/// explicit `toUserId` resolves through the same `"host"` rule as the other
/// three kinds; omitted, it defaults outright to the sender's own room
/// host.
fn relay_request(
    state: &Arc<AppState>,
    ctx: &ConnectionContext,
    kind: &'static str,
    to_user_id: Option<String>,
    from_user_id: Option<String>,
    build: impl FnOnce(String, Option<String>) -> Value,
) {
    let target = match to_user_id {
        Some(to) => resolve_target(state, ctx, to),
        None => {
            let Some((stream_id, _, _)) = &ctx.participant else { return };
            let Some(host_id) = state.rooms.resolve_host(stream_id) else { return };
            host_id
        }
    };
    let value = build(target.clone(), from_user_id);
    relay::relay_to_user(&state.rooms, &state.metrics, &target, kind, &value);
}
