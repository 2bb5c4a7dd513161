//! The single pluggable-auth seam this server allows: authentication beyond
//! a pluggable hook that returns a user identity is out of scope, so
//! everything upstream of this trait (origin checks, transport) stays as-is
//! and everything downstream (the router, relay) only ever sees whatever
//! `authenticate` hands back.

use axum::http::HeaderMap;

/// Resolves the identity a connection should be trusted as. The default
/// implementation trusts the client-supplied `userId` on `join_stream` /
/// `resume` bodies — this is the seam a later revision would harden against
/// `fromUserId` spoofing without touching the router.
pub trait IdentityProvider: Send + Sync {
    /// Called once per upgraded connection, before any frames are read.
    /// Returning `None` does not reject the connection — pre-join traffic
    /// is still accepted (rate-limited under the `"anonymous"` bucket) — it
    /// only means no identity is pre-established.
    fn authenticate(&self, headers: &HeaderMap) -> Option<String> {
        let _ = headers;
        None
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveIdentityProvider;

impl IdentityProvider for PermissiveIdentityProvider {}
