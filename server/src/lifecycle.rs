//! Lifecycle Manager: the idle-room reaper, the session sweeper, and the
//! graceful shutdown drain. Each sweep runs as its own periodic task spawned
//! from `main`, generalizing the teacher's single `tokio::spawn`
//! watchdog-loop shape (`cleanup_dead_rooms` on a 1200 s interval in
//! `relay-server/src/main.rs`) into three independent sweeps at much
//! shorter cadences.

use std::sync::Arc;
use std::time::Duration;

use crate::room::RoomRegistry;
use crate::state::AppState;

const REAP_INTERVAL: Duration = Duration::from_secs(30);
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);
const FORCE_EXIT_GRACE: Duration = Duration::from_secs(1);

/// Idle-room reaper: every 30 s, closes rooms with no host present for
/// longer than `HOST_ABSENT_TIMEOUT_SECS`, notifying every
/// remaining participant with `room_closed{reason:"host_timeout"}` before
/// releasing the room's Coalescer state.
pub fn spawn_idle_reaper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REAP_INTERVAL);
        loop {
            interval.tick().await;
            for (stream_id, handles) in state.rooms.reap_idle_rooms() {
                tracing::info!(room_id = %stream_id, "reaping idle room: host absent timeout");
                let message = RoomRegistry::room_closed_message("host_timeout");
                for handle in &handles {
                    handle.send_value(&message);
                    handle.close(1000, "Room closed: host timeout");
                }
                state.coalescer.clear_room(&stream_id);
            }
        }
    });
}

/// Session sweeper: every 30 s, evicts expired session tokens from the
/// Session Manager.
pub fn spawn_session_sweeper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let evicted = state.sessions.sweep_expired();
            if evicted > 0 {
                tracing::debug!(evicted, "swept expired sessions");
            }
        }
    });
}

/// Graceful shutdown: notify every open connection with `server_shutdown`,
/// close each with protocol code 1001/"Server shutdown",
/// wait up to 5 s for the drain, then force-exit the process 1 s later —
/// `axum::serve`'s graceful-shutdown future already stops accepting new
/// upgrades the moment this is invoked, so there is nothing left to refuse
/// explicitly.
pub async fn graceful_shutdown(state: Arc<AppState>) {
    let connections = state.connections.all();
    tracing::info!(count = connections.len(), "graceful shutdown: notifying open connections");

    let message = protocol::wire_message("server_shutdown", &protocol::ServerShutdownPayload::default());
    for handle in &connections {
        handle.send_value(&message);
        handle.close(1001, "Server shutdown");
    }

    tokio::time::sleep(SHUTDOWN_DRAIN).await;
    tracing::info!("drain window elapsed, forcing exit");
    tokio::time::sleep(FORCE_EXIT_GRACE).await;
    std::process::exit(0);
}
