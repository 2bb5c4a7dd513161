//! Closed error taxonomy as a `thiserror` enum, mirroring the `ErrorCode`
//! wire constants in `protocol` but carrying a human `message`
//! alongside each variant the way a caller actually needs to construct one.
//! The teacher itself never needed a structured error type — its connection
//! tasks return a plain `&'static str` reason on failure (`hand_shake.rs`) —
//! but `thiserror` is the pack's standard answer for a closed, displayable
//! error set (`signal-fish-server`, the `valence_*` crates), so this crate
//! reaches for the same thing rather than hand-rolling `impl Display`.

use protocol::{ErrorCode, ErrorPayload, MsgId};
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum RouterError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("message has no type field")]
    MissingType,
    #[error("payload exceeds {0} bytes")]
    PayloadTooLarge(usize),
    #[error("rate limited")]
    RateLimited,
    #[error("room is full")]
    RoomFull,
    #[error("session expired")]
    SessionExpired,
    #[error("operation requires the host role")]
    NotHost,
    #[error("invalid game_init payload: {0}")]
    InvalidInit(String),
    #[error("invalid game_state payload: {0}")]
    InvalidState(String),
    #[error("invalid game_event payload: {0}")]
    InvalidEvent(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RouterError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RouterError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            RouterError::UnknownType(_) => ErrorCode::UnknownType,
            RouterError::MissingType => ErrorCode::MissingType,
            RouterError::PayloadTooLarge(_) => ErrorCode::PayloadTooLarge,
            RouterError::RateLimited => ErrorCode::RateLimited,
            RouterError::RoomFull => ErrorCode::RoomFull,
            RouterError::SessionExpired => ErrorCode::SessionExpired,
            RouterError::NotHost => ErrorCode::NotHost,
            RouterError::InvalidInit(_) => ErrorCode::InvalidInit,
            RouterError::InvalidState(_) => ErrorCode::InvalidState,
            RouterError::InvalidEvent(_) => ErrorCode::InvalidEvent,
            RouterError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Converts to the wire `error` payload, attaching `msgId` as `ref` so
    /// the client can correlate the failure with its own send.
    pub fn to_wire(&self, msg_ref: Option<MsgId>) -> ErrorPayload {
        ErrorPayload {
            code: self.code().as_code().to_string(),
            message: self.to_string(),
            msg_ref,
        }
    }
}
