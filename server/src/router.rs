//! Message Router: the per-frame pipeline — parse, envelope check, schema
//! validation, dedup, sequence tracking, dispatch, ack. The teacher has no
//! equivalent validating front door (`processing_module.rs` forwards raw
//! bytes straight through); `protocol::ClientPayload`'s tagged enum turns
//! "dispatch to the handler registered for `type`" into a `match` instead of
//! a runtime lookup table.

use std::sync::Arc;
use std::time::Instant;

use protocol::{AckPayload, ClientPayload, RawEnvelope, Role, StreamId, UserId, wire_message};

use crate::connection::ConnectionHandle;
use crate::dedup::Deduplicator;
use crate::errors::RouterError;
use crate::handlers;
use crate::state::AppState;
use crate::validator;

/// Per-connection state the router needs across frames: owned by the
/// connection's read loop, never shared, dropped on close — the dedup set
/// and the per-socket `lastSeq` both live and die with one connection.
pub struct ConnectionContext {
    pub handle: ConnectionHandle,
    pub dedup: Deduplicator,
    pub last_seq: Option<u32>,
    pub participant: Option<(StreamId, UserId, Role)>,
}

impl ConnectionContext {
    pub fn new(handle: ConnectionHandle) -> Self {
        ConnectionContext {
            handle,
            dedup: Deduplicator::default(),
            last_seq: None,
            participant: None,
        }
    }

    pub fn rate_limit_key_user(&self) -> &str {
        self.participant
            .as_ref()
            .map(|(_, user_id, _)| user_id.as_str())
            .unwrap_or("anonymous")
    }
}

fn send_ack(state: &Arc<AppState>, ctx: &ConnectionContext, msg_id: &str) {
    let value = wire_message(
        "ack",
        &AckPayload {
            for_msg: msg_id.to_string(),
            ts: now_ms(),
        },
    );
    ctx.handle.send_value(&value);
    state.metrics.incr("msgs_acked_total");
}

/// Sends the normalized error and bumps a per-code counter — `/readyz`'s
/// error-rate-ok check reads the `invalid_request` and `payload_too_large`
/// counters this increments.
fn send_error(state: &Arc<AppState>, ctx: &ConnectionContext, error: &RouterError, msg_ref: Option<String>) {
    state.metrics.incr(&format!("errors_{}_total", error.code().as_code()));
    let payload = error.to_wire(msg_ref);
    let value = wire_message("error", &payload);
    ctx.handle.send_value(&value);
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Runs the full per-frame pipeline: parse, envelope check, schema
/// validation, dedup, sequence tracking, dispatch, ack.
pub async fn handle_frame(state: &Arc<AppState>, ctx: &mut ConnectionContext, raw_text: &str) {
    let start = Instant::now();

    // 0. ROUTER_ENABLED=false takes the validating router out of service
    // entirely: every frame is rejected rather than parsed or dispatched.
    if !state.config.router_enabled {
        send_error(state, ctx, &RouterError::Internal("router disabled".to_string()), None);
        state.metrics.incr("msgs_rejected_total");
        return;
    }

    // 1. Parse JSON; failure => invalid_request, no ack possible (no msgId known yet).
    let raw: RawEnvelope = match serde_json::from_str(raw_text) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(error = %err, "failed to parse inbound frame as JSON");
            send_error(state, ctx, &RouterError::InvalidRequest("malformed JSON".to_string()), None);
            state.metrics.incr("msgs_rejected_total");
            return;
        }
    };

    // 2. Envelope + size check.
    if let Err(err) = validator::check_envelope(raw_text.as_bytes(), raw.kind_str()) {
        send_error(state, ctx, &err, raw.msg_id.clone());
        if raw.msg_id.is_some() {
            send_ack(state, ctx, raw.msg_id.as_deref().unwrap());
        }
        state.metrics.incr("msgs_rejected_total");
        return;
    }

    // 3. Per-type schema: parse into the closed ClientPayload catalog.
    let payload = match serde_json::from_value::<ClientPayload>(raw.to_payload_value()) {
        Ok(payload) => payload,
        Err(err) => {
            let router_err = if is_unknown_variant(&err) {
                RouterError::UnknownType(raw.kind_str().to_string())
            } else {
                RouterError::InvalidRequest(err.to_string())
            };
            send_error(state, ctx, &router_err, raw.msg_id.clone());
            if raw.msg_id.is_some() {
                send_ack(state, ctx, raw.msg_id.as_deref().unwrap());
            }
            state.metrics.incr("msgs_rejected_total");
            return;
        }
    };

    if let Err(err) = validator::check_field_lengths(&payload) {
        send_error(state, ctx, &err, raw.msg_id.clone());
        if raw.msg_id.is_some() {
            send_ack(state, ctx, raw.msg_id.as_deref().unwrap());
        }
        state.metrics.incr("msgs_rejected_total");
        return;
    }

    // 4. Dedup check.
    if let Some(msg_id) = &raw.msg_id {
        if ctx.dedup.is_duplicate(msg_id) {
            state.metrics.incr(&format!("msgs_duplicate_total_{}", raw.kind_str()));
            send_ack(state, ctx, msg_id);
            return;
        }
    }

    // 5. Sequence check: warn-only, never blocks dispatch.
    if let Some(seq) = raw.seq {
        if let Some(last_seq) = ctx.last_seq {
            if seq <= last_seq {
                state.metrics.incr("msgs_out_of_order_total");
            }
        }
        ctx.last_seq = Some(ctx.last_seq.map_or(seq, |last| last.max(seq)));
    }

    // 6. Dispatch.
    let is_ack_eligible = payload.is_ack_eligible() && raw.msg_id.is_some();
    match handlers::dispatch(state, ctx, payload).await {
        Ok(()) => {
            state.metrics.incr(&format!("msgs_handled_total_{}", raw.kind_str()));
            if is_ack_eligible {
                send_ack(state, ctx, raw.msg_id.as_deref().unwrap());
            }
        }
        Err(err) => {
            tracing::warn!(kind = %raw.kind_str(), error = %err, "handler rejected message");
            send_error(state, ctx, &err, raw.msg_id.clone());
            if raw.msg_id.is_some() {
                send_ack(state, ctx, raw.msg_id.as_deref().unwrap());
            }
        }
    }

    // 7. Processing duration.
    state
        .metrics
        .observe("handle_duration_ms", start.elapsed().as_secs_f64() * 1000.0);
}

fn is_unknown_variant(err: &serde_json::Error) -> bool {
    err.to_string().contains("unknown variant")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::connection::{ConnectionHandle, next_socket_id};
    use crate::identity::PermissiveIdentityProvider;

    fn test_state() -> Arc<AppState> {
        AppState::new(Config::from_env(), Box::new(PermissiveIdentityProvider))
    }

    #[tokio::test]
    async fn join_stream_acks_and_confirms() {
        let state = test_state();
        let (handle, mut rx) = ConnectionHandle::new(next_socket_id());
        let mut ctx = ConnectionContext::new(handle);

        handle_frame(
            &state,
            &mut ctx,
            r#"{"type":"join_stream","msgId":"m1","streamId":"r1","userId":"u1"}"#,
        )
        .await;

        let mut saw_confirmed = false;
        let mut saw_ack = false;
        while let Ok(msg) = rx.try_recv() {
            let text = msg.into_text().unwrap();
            if text.contains("join_confirmed") {
                saw_confirmed = true;
            }
            if text.contains("\"ack\"") {
                saw_ack = true;
            }
        }
        assert!(saw_confirmed);
        assert!(saw_ack);
    }

    #[tokio::test]
    async fn duplicate_message_id_is_always_acked_even_for_non_critical_types() {
        let state = test_state();
        let (handle, mut rx) = ConnectionHandle::new(next_socket_id());
        let mut ctx = ConnectionContext::new(handle);

        // echo is not in the ack-eligible set, so the first send produces no ack...
        let frame = r#"{"type":"echo","msgId":"m7","payload":"x"}"#;
        handle_frame(&state, &mut ctx, frame).await;
        let mut acks_after_first = 0;
        while let Ok(msg) = rx.try_recv() {
            if msg.into_text().unwrap().contains("\"ack\"") {
                acks_after_first += 1;
            }
        }
        assert_eq!(acks_after_first, 0);

        // ...but a duplicate of it is still acked.
        handle_frame(&state, &mut ctx, frame).await;
        assert_eq!(state.metrics.counter("msgs_duplicate_total_echo"), 1);
        let mut acks_after_dup = 0;
        while let Ok(msg) = rx.try_recv() {
            if msg.into_text().unwrap().contains("\"ack\"") {
                acks_after_dup += 1;
            }
        }
        assert_eq!(acks_after_dup, 1);
    }

    #[tokio::test]
    async fn unknown_type_reports_unknown_type_error() {
        let state = test_state();
        let (handle, mut rx) = ConnectionHandle::new(next_socket_id());
        let mut ctx = ConnectionContext::new(handle);

        handle_frame(&state, &mut ctx, r#"{"type":"not_a_real_type"}"#).await;

        let mut saw_unknown = false;
        while let Ok(msg) = rx.try_recv() {
            if msg.into_text().unwrap().contains("unknown_type") {
                saw_unknown = true;
            }
        }
        assert!(saw_unknown);
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let state = test_state();
        let (handle, mut rx) = ConnectionHandle::new(next_socket_id());
        let mut ctx = ConnectionContext::new(handle);

        let big_payload = "x".repeat(70 * 1024);
        let frame = format!(r#"{{"type":"echo","payload":"{big_payload}"}}"#);
        handle_frame(&state, &mut ctx, &frame).await;

        let mut saw_too_large = false;
        while let Ok(msg) = rx.try_recv() {
            if msg.into_text().unwrap().contains("payload_too_large") {
                saw_too_large = true;
            }
        }
        assert!(saw_too_large);
    }

    #[tokio::test]
    async fn frame_with_no_type_key_reports_missing_type() {
        let state = test_state();
        let (handle, mut rx) = ConnectionHandle::new(next_socket_id());
        let mut ctx = ConnectionContext::new(handle);

        handle_frame(&state, &mut ctx, r#"{"msgId":"x"}"#).await;

        let mut saw_missing_type = false;
        while let Ok(msg) = rx.try_recv() {
            if msg.into_text().unwrap().contains("missing_type") {
                saw_missing_type = true;
            }
        }
        assert!(saw_missing_type);
    }

    #[tokio::test]
    async fn router_disabled_rejects_every_frame() {
        let mut config = Config::from_env();
        config.router_enabled = false;
        let state = AppState::new(config, Box::new(PermissiveIdentityProvider));
        let (handle, mut rx) = ConnectionHandle::new(next_socket_id());
        let mut ctx = ConnectionContext::new(handle);

        handle_frame(&state, &mut ctx, r#"{"type":"join_stream","streamId":"r1","userId":"u1"}"#).await;

        assert!(!state.rooms.room_exists("r1"));
        let mut saw_error = false;
        while let Ok(msg) = rx.try_recv() {
            if msg.into_text().unwrap().contains("\"error\"") {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }
}
