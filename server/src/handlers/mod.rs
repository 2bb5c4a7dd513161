//! Signaling Handlers: per-type logic invoked by the Router once a frame has
//! been validated, deduplicated, and sequence-checked. Split by concern —
//! connection/session handlers, signaling relay handlers, co-host handlers,
//! game-state handlers — rather than one large match arm file.

mod cohost;
mod game;
mod lifecycle;
mod signaling;

use std::sync::Arc;

use protocol::ClientPayload;

use crate::errors::RouterError;
use crate::router::ConnectionContext;
use crate::state::AppState;

pub async fn dispatch(state: &Arc<AppState>, ctx: &mut ConnectionContext, payload: ClientPayload) -> Result<(), RouterError> {
    match payload {
        ClientPayload::Ping(_) => lifecycle::handle_ping(state, ctx),
        ClientPayload::Echo(p) => lifecycle::handle_echo(state, ctx, p),
        ClientPayload::JoinStream(p) => lifecycle::handle_join_stream(state, ctx, p),
        ClientPayload::LeaveStream(_) => lifecycle::handle_leave_stream(state, ctx),
        ClientPayload::Resume(p) => lifecycle::handle_resume(state, ctx, p),

        ClientPayload::WebrtcOffer(p) => signaling::handle_offer(state, ctx, p),
        ClientPayload::WebrtcAnswer(p) => signaling::handle_answer(state, ctx, p),
        ClientPayload::IceCandidate(p) => signaling::handle_ice_candidate(state, ctx, p),
        ClientPayload::RequestOffer(p) => signaling::handle_request_offer(state, ctx, p),
        ClientPayload::RequestKeyframe(p) => signaling::handle_request_keyframe(state, ctx, p),

        ClientPayload::CohostRequest(_) => cohost::handle_request(state, ctx),
        ClientPayload::CohostCancel(_) => cohost::handle_cancel(state, ctx),
        ClientPayload::CohostAccept(p) => cohost::handle_accept(state, ctx, p),
        ClientPayload::CohostDecline(p) => cohost::handle_decline(state, ctx, p),
        ClientPayload::CohostEnd(p) => cohost::handle_end(state, ctx, p),
        ClientPayload::CohostMute(p) => cohost::handle_target(state, ctx, "cohost_mute", p),
        ClientPayload::CohostUnmute(p) => cohost::handle_target(state, ctx, "cohost_unmute", p),
        ClientPayload::CohostCamOff(p) => cohost::handle_target(state, ctx, "cohost_cam_off", p),
        ClientPayload::CohostCamOn(p) => cohost::handle_target(state, ctx, "cohost_cam_on", p),

        ClientPayload::GameInit(p) => game::handle_init(state, ctx, p),
        ClientPayload::GameState(p) => game::handle_state(state, ctx, p),
        ClientPayload::GameEvent(p) => game::handle_event(state, ctx, p),
    }
}
