//! Admin/observability HTTP surface: `/health`, `/healthz`, `/_version`,
//! `/readyz`, `/metrics`, `/validate`, `/validate/report`, plus the
//! security-headers middleware applied to every HTTP response. The teacher
//! exposes none of this — its only HTTP route is the WS upgrade itself
//! (`relay-server/src/main.rs`) — so these handlers are grounded on the
//! plain-axum-handler style the teacher does use, generalized to the small
//! JSON/Prometheus bodies an operator needs to poll.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use axum::routing::{get, post};
use serde_json::{Value, json};

use crate::state::AppState;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

async fn health() -> Json<Value> {
    Json(json!({"ok": true, "timestamp": now_ms()}))
}

/// `/healthz`: one entry per room, viewer count only — host and guest
/// participants are not reported, since this surface describes the
/// receive-only audience a given stream is carrying.
async fn healthz(State(state): State<Arc<AppState>>) -> Json<Value> {
    let rooms: Vec<Value> = state
        .rooms
        .room_summaries()
        .into_iter()
        .map(|(id, viewers_count)| json!({"id": id, "viewersCount": viewers_count, "h264Only": true}))
        .collect();
    Json(json!({"rooms": rooms}))
}

async fn version() -> Json<Value> {
    Json(json!({
        "build": env!("CARGO_PKG_VERSION"),
        "timestamp": now_ms(),
        "commitHash": option_env!("GIT_COMMIT_HASH").unwrap_or("unknown"),
    }))
}

/// `/readyz`: 200 when every check passes, 503 otherwise. Checks: router
/// enabled, TURN credentials configured, error rate (the
/// `invalid_request` + `payload_too_large` counters, summed, under 5), ws
/// operational (the accept path has never errored out from under us, which
/// for this process just means "we are still running").
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let router_enabled = state.config.router_enabled;
    let turn_configured = state.config.turn_configured();
    let error_count = state.metrics.counter("errors_invalid_request_total")
        + state.metrics.counter("errors_payload_too_large_total");
    let error_rate_ok = error_count < 5;
    let ws_operational = true;

    let checks = json!({
        "router": router_enabled,
        "turn": turn_configured,
        "errorRateOk": error_rate_ok,
        "ws": ws_operational,
    });
    let ready = router_enabled && turn_configured && error_rate_ok && ws_operational;

    if ready {
        (StatusCode::OK, Json(json!({"ready": true, "checks": checks}))).into_response()
    } else {
        let mut issues = Vec::new();
        if !router_enabled {
            issues.push("router disabled");
        }
        if !turn_configured {
            issues.push("turn not configured");
        }
        if !error_rate_ok {
            issues.push("error rate too high");
        }
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"ready": false, "checks": checks, "issues": issues})),
        )
            .into_response()
    }
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics.set_gauge("room_count", state.rooms.room_summaries().len() as f64);
    state.metrics.set_gauge("ws_connections_active", state.connections.count() as f64);
    ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], state.metrics.render())
}

/// `/validate`: returns the latest report stashed by `/validate/report`, or
/// `null` if none has been submitted yet.
async fn validate(State(state): State<Arc<AppState>>) -> Json<Value> {
    let report = state.validation_report.lock().expect("validation report lock poisoned").clone();
    Json(json!({"report": report}))
}

/// `/validate/report`: stores a client-supplied validation report,
/// replacing whatever was there before.
async fn validate_report(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Json<Value> {
    *state.validation_report.lock().expect("validation report lock poisoned") = Some(body);
    Json(json!({"ok": true}))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(healthz))
        .route("/_version", get(version))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/validate", post(validate))
        .route("/validate/report", post(validate_report))
}

/// Applies the fixed security header set to every HTTP response.
pub async fn security_headers(request: axum::extract::Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        HeaderName::from_static("x-xss-protection"),
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response
}
