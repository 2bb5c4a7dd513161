//! Black-box end-to-end scenarios, driving `AppState` and
//! `router::handle_frame` directly rather than a live socket — a connection
//! here is just a `ConnectionContext` wrapping a `ConnectionHandle` whose
//! receiver we drain and assert on, which is all a real WebSocket frame loop
//! (`main.rs::handle_socket`) adds on top.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use signal_server::config::Config;
use signal_server::connection::{ConnectionHandle, next_socket_id};
use signal_server::identity::PermissiveIdentityProvider;
use signal_server::router::{self, ConnectionContext};
use signal_server::state::AppState;

fn test_state() -> Arc<AppState> {
    AppState::new(Config::from_env(), Box::new(PermissiveIdentityProvider))
}

fn new_conn() -> (ConnectionContext, tokio::sync::mpsc::UnboundedReceiver<axum::extract::ws::Message>) {
    let (handle, rx) = ConnectionHandle::new(next_socket_id());
    (ConnectionContext::new(handle), rx)
}

/// Drains every currently-queued outbound message on a receiver as parsed JSON.
fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<axum::extract::ws::Message>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let Ok(text) = msg.into_text() {
            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                out.push(value);
            }
        }
    }
    out
}

fn has_type(messages: &[Value], kind: &str) -> bool {
    messages.iter().any(|m| m.get("type").and_then(Value::as_str) == Some(kind))
}

fn find_type<'a>(messages: &'a [Value], kind: &str) -> Option<&'a Value> {
    messages.iter().find(|m| m.get("type").and_then(Value::as_str) == Some(kind))
}

#[tokio::test]
async fn s1_basic_join_and_relay() {
    let state = test_state();
    let (mut a, mut rx_a) = new_conn();
    let (mut b, mut rx_b) = new_conn();

    router::handle_frame(&state, &mut a, r#"{"type":"join_stream","streamId":"r1","userId":"u1","msgId":"m1"}"#).await;
    let a_msgs = drain(&mut rx_a);
    let confirmed = find_type(&a_msgs, "join_confirmed").expect("A gets join_confirmed");
    assert_eq!(confirmed["role"], "host");
    let session_token = confirmed["sessionToken"].as_str().expect("sessionToken present").to_string();
    assert!(!session_token.is_empty());
    assert!(has_type(&a_msgs, "ack"));

    router::handle_frame(&state, &mut b, r#"{"type":"join_stream","streamId":"r1","userId":"u2","msgId":"m2"}"#).await;
    let b_msgs = drain(&mut rx_b);
    let b_confirmed = find_type(&b_msgs, "join_confirmed").expect("B gets join_confirmed");
    assert_eq!(b_confirmed["role"], "viewer");

    let a_msgs_after = drain(&mut rx_a);
    assert!(has_type(&a_msgs_after, "joined_stream"));
    assert!(has_type(&a_msgs_after, "participant_count_update"));
    assert!(has_type(&b_msgs, "participant_count_update"));

    router::handle_frame(
        &state,
        &mut a,
        r#"{"type":"webrtc_offer","toUserId":"u2","fromUserId":"u1","sdp":{"type":"offer","sdp":"v=0"}}"#,
    )
    .await;
    let b_msgs_after = drain(&mut rx_b);
    let offer = find_type(&b_msgs_after, "webrtc_offer").expect("B receives the relayed offer");
    assert_eq!(offer["fromUserId"], "u1");
}

#[tokio::test]
async fn s2_duplicate_suppression() {
    let state = test_state();
    let (mut ctx, mut rx) = new_conn();

    let frame = r#"{"type":"echo","msgId":"m7","payload":"x"}"#;
    for _ in 0..5 {
        router::handle_frame(&state, &mut ctx, frame).await;
    }

    let msgs = drain(&mut rx);
    let ack_count = msgs.iter().filter(|m| m.get("type").and_then(Value::as_str) == Some("ack")).count();
    assert_eq!(ack_count, 1);
    assert_eq!(state.metrics.counter("msgs_duplicate_total_echo"), 4);
}

#[tokio::test]
async fn s3_ice_flood_rate_limits() {
    let state = test_state();
    let (mut a, mut rx_a) = new_conn();
    let (mut b, _rx_b) = new_conn();
    router::handle_frame(&state, &mut a, r#"{"type":"join_stream","streamId":"r1","userId":"u1","msgId":"j1"}"#).await;
    router::handle_frame(&state, &mut b, r#"{"type":"join_stream","streamId":"r1","userId":"u2","msgId":"j2"}"#).await;
    drain(&mut rx_a);

    for i in 0..500 {
        let frame = format!(
            r#"{{"type":"ice_candidate","toUserId":"u2","fromUserId":"u1","candidate":{{"n":{i}}}}}"#
        );
        router::handle_frame(&state, &mut a, &frame).await;
    }

    let msgs = drain(&mut rx_a);
    let rate_limited = msgs
        .iter()
        .filter(|m| {
            m.get("type").and_then(Value::as_str) == Some("error")
                && m.get("code").and_then(Value::as_str) == Some("rate_limited")
        })
        .count();
    // Burst is 100, so at minimum the tail beyond the burst is rejected.
    assert!(rate_limited >= 350, "expected most of the flood to be rate limited, got {rate_limited}");
    assert!(state.metrics.counter("rate_limited_ice_candidate") >= 1);
}

#[tokio::test]
async fn s4_session_resume_within_ttl() {
    let state = test_state();
    let (mut a, mut rx_a) = new_conn();
    router::handle_frame(&state, &mut a, r#"{"type":"join_stream","streamId":"r1","userId":"u1","msgId":"m1"}"#).await;
    let confirmed = find_type(&drain(&mut rx_a), "join_confirmed").unwrap().clone();
    let token = confirmed["sessionToken"].as_str().unwrap().to_string();

    // Socket closes: a fresh connection resumes with the captured token.
    let (mut resumed, mut rx_resumed) = new_conn();
    let frame = format!(r#"{{"type":"resume","sessionToken":"{token}","roomId":"r1"}}"#);
    router::handle_frame(&state, &mut resumed, &frame).await;

    let msgs = drain(&mut rx_resumed);
    let ok = find_type(&msgs, "resume_ok").expect("resume succeeds within TTL");
    assert_eq!(ok["role"], "host");
    assert_eq!(ok["gameStateVersion"], 0);
}

#[tokio::test]
async fn s4_resume_after_room_reaped_returns_resume_migrated() {
    let state = test_state();
    let (mut a, mut rx_a) = new_conn();
    router::handle_frame(&state, &mut a, r#"{"type":"join_stream","streamId":"r1","userId":"u1","msgId":"m1"}"#).await;
    let confirmed = find_type(&drain(&mut rx_a), "join_confirmed").unwrap().clone();
    let token = confirmed["sessionToken"].as_str().unwrap().to_string();

    // Host leaves and nobody else is present: the room no longer exists.
    router::handle_frame(&state, &mut a, r#"{"type":"leave_stream"}"#).await;
    assert!(!state.rooms.room_exists("r1"));

    let (mut resumed, mut rx_resumed) = new_conn();
    let frame = format!(r#"{{"type":"resume","sessionToken":"{token}","roomId":"r1"}}"#);
    router::handle_frame(&state, &mut resumed, &frame).await;

    let msgs = drain(&mut rx_resumed);
    let migrated = find_type(&msgs, "resume_migrated").expect("resume reports the room is gone");
    assert_eq!(migrated["reason"], "room_closed");
}

#[tokio::test]
async fn s5_cohost_promotion() {
    let state = test_state();
    let (mut a, mut rx_a) = new_conn();
    let (mut b, mut rx_b) = new_conn();
    let (mut c, mut rx_c) = new_conn();
    router::handle_frame(&state, &mut a, r#"{"type":"join_stream","streamId":"r1","userId":"u1","msgId":"j1"}"#).await;
    router::handle_frame(&state, &mut b, r#"{"type":"join_stream","streamId":"r1","userId":"u2","msgId":"j2"}"#).await;
    router::handle_frame(&state, &mut c, r#"{"type":"join_stream","streamId":"r1","userId":"u3","msgId":"j3"}"#).await;
    drain(&mut rx_a);
    drain(&mut rx_b);
    drain(&mut rx_c);

    router::handle_frame(&state, &mut b, r#"{"type":"cohost_request"}"#).await;
    let a_msgs = drain(&mut rx_a);
    assert!(has_type(&a_msgs, "cohost_request"));
    let queue_update = find_type(&a_msgs, "cohost_queue_updated").expect("host sees the updated queue");
    assert_eq!(queue_update["queue"][0]["userId"], "u2");

    router::handle_frame(&state, &mut a, r#"{"type":"cohost_accept","streamId":"r1","guestUserId":"u2"}"#).await;
    let b_msgs = drain(&mut rx_b);
    assert!(has_type(&b_msgs, "cohost_accepted"));

    router::handle_frame(&state, &mut c, r#"{"type":"cohost_request"}"#).await;
    let c_msgs = drain(&mut rx_c);
    let declined = find_type(&c_msgs, "cohost_declined").expect("second requester is declined immediately");
    assert_eq!(declined["reason"], "guest_active");
}

#[tokio::test(start_paused = true)]
async fn s6_coalesced_game_state() {
    let state = test_state();
    let (mut host, mut rx_host) = new_conn();
    let (mut viewer, mut rx_viewer) = new_conn();
    router::handle_frame(&state, &mut host, r#"{"type":"join_stream","streamId":"r1","userId":"u1","msgId":"j1"}"#).await;
    router::handle_frame(&state, &mut viewer, r#"{"type":"join_stream","streamId":"r1","userId":"u2","msgId":"j2"}"#).await;
    drain(&mut rx_host);
    drain(&mut rx_viewer);

    router::handle_frame(
        &state,
        &mut host,
        r#"{"type":"game_init","streamId":"r1","gameId":"g1","version":0}"#,
    )
    .await;
    drain(&mut rx_host);
    drain(&mut rx_viewer);

    for version in 1..=100u64 {
        let frame = format!(
            r#"{{"type":"game_state","streamId":"r1","version":{version},"full":true,"patch":{{"v":{version}}}}}"#
        );
        router::handle_frame(&state, &mut host, &frame).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    tokio::time::sleep(Duration::from_millis(50)).await;

    let broadcasts: Vec<Value> = drain(&mut rx_viewer)
        .into_iter()
        .filter(|m| m.get("type").and_then(Value::as_str) == Some("game_state"))
        .collect();

    assert!(!broadcasts.is_empty());
    assert!(broadcasts.len() <= 50, "expected coalescing to cut down the broadcast count, got {}", broadcasts.len());
    let versions: Vec<u64> = broadcasts.iter().map(|m| m["version"].as_u64().unwrap()).collect();
    assert!(versions.windows(2).all(|w| w[0] < w[1]), "versions must be strictly increasing: {versions:?}");
    assert_eq!(*versions.last().unwrap(), 100);
}
