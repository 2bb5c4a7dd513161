//! Startup configuration, assembled once from the process environment. Kept
//! as one explicit struct rather than a generic config-loading framework —
//! the teacher reads a single on-disk file for its one piece of runtime
//! config (`GameConfig.json` in `lobby::reload_config`); this generalizes
//! that "read once, log once, hand around as a value" shape to the env vars
//! this server actually needs.

use std::env;

use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub development: bool,
    pub allowed_origins: Vec<String>,
    pub router_enabled: bool,
    pub debug_sdp: bool,
    pub turn_url: Option<String>,
    pub turns_url: Option<String>,
    pub turn_username: Option<String>,
    pub turn_credential: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5050);
        let development = env::var("NODE_ENV").as_deref() == Ok("development");
        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();
        let router_enabled = env::var("ROUTER_ENABLED").as_deref() != Ok("false");
        let debug_sdp = env::var("DEBUG_SDP").as_deref() == Ok("true");

        Config {
            port,
            development,
            allowed_origins,
            router_enabled,
            debug_sdp,
            turn_url: env::var("TURN_URL").ok(),
            turns_url: env::var("TURNS_URL").ok(),
            turn_username: env::var("TURN_USERNAME").ok(),
            turn_credential: env::var("TURN_CREDENTIAL").ok(),
        }
    }

    /// Whether the request `Origin` header is acceptable: `*` in the
    /// allow-list, an exact match, or no header at all (same-host).
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(origin) => {
                self.allowed_origins.iter().any(|o| o == "*") || self.allowed_origins.iter().any(|o| o == origin)
            }
        }
    }

    /// CORS for the admin API paths only — never applied to the WebSocket
    /// upgrade or any HTML route. `*` in `ALLOWED_ORIGINS`, or an empty
    /// allow-list under `NODE_ENV=development`, opens it up fully; otherwise
    /// only the configured origins are echoed back.
    pub fn cors_layer(&self) -> CorsLayer {
        if self.allowed_origins.iter().any(|o| o == "*") || (self.development && self.allowed_origins.is_empty()) {
            return CorsLayer::new().allow_origin(Any);
        }
        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    }

    pub fn turn_configured(&self) -> bool {
        self.turn_url.is_some()
            && self.turn_username.is_some()
            && self.turn_credential.is_some()
    }

    /// Logs the resolved configuration once at startup with the credential
    /// redacted, matching the teacher's practice of logging config state
    /// (`reload_handler`) rather than staying silent about it.
    pub fn log_startup(&self) {
        tracing::info!(
            port = self.port,
            development = self.development,
            allowed_origins = ?self.allowed_origins,
            router_enabled = self.router_enabled,
            debug_sdp = self.debug_sdp,
            turn_configured = self.turn_configured(),
            "resolved configuration"
        );
    }
}
