//! Entry point: tracing setup, `AppState` construction, the lifecycle
//! tasks, and the axum router assembling `/ws` alongside the admin surface.
//! Generalizes the teacher's `main.rs` shape (`tracing_subscriber::registry()`
//! init, a `tokio::spawn` watchdog, `Router::new().route(...).with_state(...)`,
//! `ws.on_upgrade(...)`) to the full transport + admin surface this server
//! needs, with graceful shutdown wired onto `axum::serve`.

use std::sync::Arc;

use axum::Router;
use axum::extract::ws::WebSocket;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::stream::StreamExt;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use signal_server::config::Config;
use signal_server::connection::{ConnectionHandle, next_socket_id};
use signal_server::identity::PermissiveIdentityProvider;
use signal_server::router::ConnectionContext;
use signal_server::state::AppState;
use signal_server::{admin, errors, lifecycle, relay, router};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let config = Config::from_env();
    config.log_startup();
    let port = config.port;

    let state = AppState::new(config, Box::new(PermissiveIdentityProvider));

    lifecycle::spawn_idle_reaper(state.clone());
    lifecycle::spawn_session_sweeper(state.clone());

    let admin_routes = admin::routes()
        .layer(state.config.cors_layer())
        .layer(middleware::from_fn(admin::security_headers));

    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind port {port}: {err}"));
    tracing::info!(port, "listening");

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_state))
        .await
        .unwrap_or_else(|err| tracing::error!(error = %err, "server exited with error"));
}

/// Resolves on SIGINT (Ctrl+C) or, on unix, SIGTERM — whichever fires first —
/// then runs the shutdown drain before returning, which is what actually
/// stops `axum::serve` from accepting further connections.
async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    lifecycle::graceful_shutdown(state).await;
}

/// Checks the `Origin` header before upgrading; rejects with 403 rather than
/// accepting and closing immediately after, since the handshake itself is
/// cheaper to refuse than to tear down.
async fn websocket_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let origin = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    if !state.config.origin_allowed(origin) {
        tracing::warn!(?origin, "rejected websocket upgrade: origin not allowed");
        state.metrics.incr("ws_rejected_origin");
        return (axum::http::StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    let pre_authenticated = state.identity.authenticate(&headers);
    ws.on_upgrade(move |socket| handle_socket(socket, state, pre_authenticated))
        .into_response()
}

/// Per-connection loop: a writer task draining `ConnectionHandle`'s channel
/// onto the socket, and a reader loop feeding every text frame through the
/// Message Router — the same split-sender/split-receiver shape as the
/// teacher's `websocket()` in `main.rs`, generalized to route frames through
/// `router::handle_frame` instead of the teacher's two fixed client/server
/// roles.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, _pre_authenticated: Option<String>) {
    let socket_id = next_socket_id();
    let (mut sender, mut receiver) = socket.split();
    let (handle, mut outbox) = ConnectionHandle::new(socket_id);
    state.connections.register(socket_id, handle.clone());
    state.metrics.incr("ws_connections_total");

    let mut ctx = ConnectionContext::new(handle.clone());

    let writer = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            let len = match &message {
                axum::extract::ws::Message::Text(text) => text.len(),
                _ => 0,
            };
            let is_close = matches!(message, axum::extract::ws::Message::Close(_));
            if sender.send(message).await.is_err() {
                break;
            }
            if len > 0 {
                handle.release_bytes(len);
            }
            if is_close {
                break;
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            axum::extract::ws::Message::Text(text) => {
                router::handle_frame(&state, &mut ctx, &text).await;
            }
            axum::extract::ws::Message::Close(_) => break,
            axum::extract::ws::Message::Binary(_) => {
                // Binary frames are not accepted. Reported the same way a
                // malformed text frame would be, with no msgId to ack.
                let value = protocol::wire_message(
                    "error",
                    &errors::RouterError::InvalidRequest("binary frames are not accepted".to_string())
                        .to_wire(None),
                );
                ctx.handle.send_value(&value);
                state.metrics.incr("msgs_rejected_total");
            }
            _ => {}
        }
    }

    if let Some((stream_id, user_id, _)) = ctx.participant.take() {
        state.rate_limiter.release_user(&user_id);
        let outbound = state.rooms.leave_stream(&stream_id, &user_id);
        relay::dispatch(&state.rooms, &state.metrics, &state.coalescer, &state.flush_fn, outbound);
    }
    state.connections.unregister(socket_id);
    ctx.handle.mark_closed();
    writer.abort();
}
