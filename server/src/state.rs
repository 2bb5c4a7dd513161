//! The application state container, generalizing the teacher's
//! `lobby::AppState` (`Mutex<HashMap<String, Room>>` + `RwLock<HashMap<...>>`
//! configs) into the full set of shared subsystems this server needs: Room
//! Registry, Session Manager, Metrics Tracker, Rate Limiters, each shared
//! with single-writer or per-entity locking. Passed around as one
//! `Arc<AppState>` — no ambient singletons, no global mutable state.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::coalescer::{Coalescer, FlushFn};
use crate::config::Config;
use crate::connection::ConnectionRegistry;
use crate::identity::IdentityProvider;
use crate::metrics::Metrics;
use crate::rate_limit::RateLimiter;
use crate::relay;
use crate::room::RoomRegistry;
use crate::session::SessionManager;

pub struct AppState {
    pub rooms: Arc<RoomRegistry>,
    pub sessions: SessionManager,
    pub metrics: Arc<Metrics>,
    pub rate_limiter: RateLimiter,
    pub coalescer: Coalescer,
    pub config: Config,
    pub identity: Box<dyn IdentityProvider>,
    pub flush_fn: FlushFn,
    /// Every accepted socket, independent of room membership — used for
    /// graceful shutdown and the `ws_connections_active` metric.
    pub connections: ConnectionRegistry,
    /// The `/validate` ⇄ `/validate/report` in-memory slot: a client can
    /// POST a report and later GET the latest one back.
    pub validation_report: Mutex<Option<Value>>,
}

impl AppState {
    pub fn new(config: Config, identity: Box<dyn IdentityProvider>) -> Arc<Self> {
        let rooms = Arc::new(RoomRegistry::default());
        let metrics = Arc::new(Metrics::default());
        let flush_fn = relay::make_flush_fn(rooms.clone(), metrics.clone());

        Arc::new(AppState {
            rooms,
            sessions: SessionManager::default(),
            metrics,
            rate_limiter: RateLimiter::default(),
            coalescer: Coalescer::default(),
            config,
            identity,
            flush_fn,
            connections: ConnectionRegistry::default(),
            validation_report: Mutex::new(None),
        })
    }
}
