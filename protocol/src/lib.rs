//! Wire types for the signaling protocol, shared between the router and every
//! handler. Kept free of any transport or tokio dependency — this crate only
//! knows how to (de)serialize the JSON envelope and the closed catalog of
//! message kinds, the same way the original `protocol` crate held nothing but
//! the binary message constants for the relay server.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A user is identified by `(streamId, userId)`; both are plain opaque
/// strings supplied by the client (or, for userId, echoed back from a prior
/// join) rather than newtypes, since the wire format carries them as bare
/// JSON strings and no domain arithmetic is ever performed on them.
pub type UserId = String;
pub type StreamId = String;
pub type SessionToken = String;
pub type MsgId = String;

/// Cap on a `type` field per the envelope layer.
pub const MAX_TYPE_LEN: usize = 50;
/// Cap on a whole inbound frame, checked before any JSON parsing of the body.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Viewer,
    Guest,
}

/// The closed error taxonomy sent back in `error` frames. `as_code` gives the
/// exact wire string; most are snake_case, a few are historical
/// SCREAMING_SNAKE holdovers from the client SDK and are kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidRequest,
    UnknownType,
    MissingType,
    PayloadTooLarge,
    RateLimited,
    RoomFull,
    SessionExpired,
    NotHost,
    InvalidInit,
    InvalidState,
    InvalidEvent,
    InternalError,
}

impl ErrorCode {
    pub fn as_code(self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::UnknownType => "unknown_type",
            ErrorCode::MissingType => "missing_type",
            ErrorCode::PayloadTooLarge => "payload_too_large",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::RoomFull => "room_full",
            ErrorCode::SessionExpired => "SESSION_EXPIRED",
            ErrorCode::NotHost => "NOT_HOST",
            ErrorCode::InvalidInit => "INVALID_INIT",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::InvalidEvent => "INVALID_EVENT",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// The first-pass parse of an inbound frame: pulls the fields every message
/// carries (`type`, `msgId`, `seq`, `ts`) out of the JSON object and leaves
/// everything else in `fields` so that per-type validation can run as a
/// second pass without the two being coupled through `serde(flatten)` +
/// `deny_unknown_fields`, which serde cannot combine on one struct.
///
/// `kind` is optional rather than a required `String` so that a frame with no
/// `type` key at all still parses here — it's the envelope check right after
/// that turns an absent or empty `type` into `missing_type`, not this struct.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(rename = "msgId")]
    pub msg_id: Option<MsgId>,
    pub seq: Option<u32>,
    pub ts: Option<i64>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RawEnvelope {
    /// `kind`, defaulted to `""` when the `type` key was absent entirely.
    pub fn kind_str(&self) -> &str {
        self.kind.as_deref().unwrap_or("")
    }

    /// Rebuilds a plain JSON object (`type` + the type-specific fields) so
    /// it can be fed into `serde_json::from_value::<ClientPayload>`.
    pub fn to_payload_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("type".to_string(), Value::String(self.kind_str().to_string()));
        Value::Object(map)
    }
}

/// The closed catalog of inbound message kinds. Each variant's struct derives
/// `deny_unknown_fields`, so stray fields are rejected by the deserializer
/// itself rather than needing a separate allow-list sanitization pass.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientPayload {
    Ping(PingPayload),
    Echo(EchoPayload),
    JoinStream(JoinStreamPayload),
    LeaveStream(LeaveStreamPayload),
    Resume(ResumePayload),
    WebrtcOffer(OfferPayload),
    WebrtcAnswer(AnswerPayload),
    IceCandidate(IceCandidatePayload),
    RequestOffer(RequestOfferPayload),
    RequestKeyframe(RequestKeyframePayload),
    CohostRequest(CohostRequestPayload),
    CohostCancel(CohostCancelPayload),
    CohostAccept(CohostAcceptPayload),
    CohostDecline(CohostDeclinePayload),
    CohostEnd(CohostEndPayload),
    CohostMute(CohostTargetPayload),
    CohostUnmute(CohostTargetPayload),
    CohostCamOff(CohostTargetPayload),
    CohostCamOn(CohostTargetPayload),
    GameInit(GameInitPayload),
    GameState(GameStatePayload),
    GameEvent(GameEventPayload),
}

impl ClientPayload {
    /// Whether a successfully-handled message of this kind is acked back to
    /// the sender when it carries a `msgId` — the "critical" set that gets a
    /// confirmation beyond the generic duplicate-suppression ack.
    pub fn is_ack_eligible(&self) -> bool {
        matches!(
            self,
            ClientPayload::JoinStream(_)
                | ClientPayload::Resume(_)
                | ClientPayload::WebrtcOffer(_)
                | ClientPayload::WebrtcAnswer(_)
                | ClientPayload::IceCandidate(_)
                | ClientPayload::GameEvent(_)
                | ClientPayload::CohostRequest(_)
                | ClientPayload::CohostAccept(_)
                | ClientPayload::CohostDecline(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PingPayload {}

/// `echo` is a deliberately loose debug/round-trip message; it passes
/// whatever `payload` value the client sent straight back out.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct EchoPayload {
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinStreamPayload {
    #[serde(rename = "streamId")]
    pub stream_id: StreamId,
    #[serde(rename = "userId")]
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeaveStreamPayload {}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResumePayload {
    #[serde(rename = "sessionToken")]
    pub session_token: SessionToken,
    #[serde(rename = "roomId")]
    pub room_id: Option<StreamId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OfferPayload {
    #[serde(rename = "toUserId")]
    pub to_user_id: UserId,
    #[serde(rename = "fromUserId")]
    pub from_user_id: UserId,
    pub sdp: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnswerPayload {
    #[serde(rename = "toUserId")]
    pub to_user_id: UserId,
    #[serde(rename = "fromUserId")]
    pub from_user_id: UserId,
    pub sdp: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IceCandidatePayload {
    #[serde(rename = "toUserId")]
    pub to_user_id: UserId,
    #[serde(rename = "fromUserId")]
    pub from_user_id: UserId,
    pub candidate: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RequestOfferPayload {
    #[serde(rename = "toUserId")]
    pub to_user_id: Option<UserId>,
    #[serde(rename = "fromUserId")]
    pub from_user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RequestKeyframePayload {
    #[serde(rename = "toUserId")]
    pub to_user_id: Option<UserId>,
    #[serde(rename = "fromUserId")]
    pub from_user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CohostRequestPayload {}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CohostCancelPayload {}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CohostAcceptPayload {
    #[serde(rename = "streamId")]
    pub stream_id: StreamId,
    #[serde(rename = "guestUserId")]
    pub guest_user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CohostDeclinePayload {
    #[serde(rename = "streamId")]
    pub stream_id: StreamId,
    #[serde(rename = "viewerUserId")]
    pub viewer_user_id: UserId,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CohostEndPayload {
    #[serde(rename = "streamId")]
    pub stream_id: StreamId,
    pub by: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CohostTargetPayload {
    #[serde(rename = "streamId")]
    pub stream_id: StreamId,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameInitPayload {
    #[serde(rename = "streamId")]
    pub stream_id: StreamId,
    #[serde(rename = "gameId")]
    pub game_id: String,
    pub version: Option<u64>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameStatePayload {
    #[serde(rename = "streamId")]
    pub stream_id: StreamId,
    pub version: Option<u64>,
    pub full: Option<bool>,
    pub patch: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameEventPayload {
    #[serde(rename = "streamId")]
    pub stream_id: StreamId,
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub payload: Option<Value>,
}

// ---- Outbound payload bodies (server -> client) ----

#[derive(Debug, Clone, Serialize)]
pub struct AckPayload {
    #[serde(rename = "for")]
    pub for_msg: MsgId,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub msg_ref: Option<MsgId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PongPayload {
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionEchoTestPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinConfirmedPayload {
    pub role: Role,
    #[serde(rename = "sessionToken")]
    pub session_token: SessionToken,
    #[serde(rename = "streamId")]
    pub stream_id: StreamId,
    #[serde(rename = "userId")]
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinedStreamPayload {
    #[serde(rename = "userId")]
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantCountUpdatePayload {
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResumeOkPayload {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(rename = "gameStateVersion")]
    pub game_state_version: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResumeMigratedPayload {
    pub role: Role,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CohostRequestNotifyPayload {
    #[serde(rename = "fromUserId")]
    pub from_user_id: UserId,
}

#[derive(Debug, Clone, Serialize)]
pub struct CohostAcceptedPayload {
    #[serde(rename = "streamId")]
    pub stream_id: StreamId,
}

#[derive(Debug, Clone, Serialize)]
pub struct CohostDeclinedPayload {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CohostEndedPayload {
    pub by: String,
    #[serde(rename = "guestUserId", skip_serializing_if = "Option::is_none")]
    pub guest_user_id: Option<UserId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CohostQueueEntryWire {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CohostQueueUpdatedPayload {
    pub queue: Vec<CohostQueueEntryWire>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameInitBroadcastPayload {
    #[serde(rename = "gameId")]
    pub game_id: String,
    pub version: u64,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameStateSnapshotPayload {
    pub version: u64,
    pub full: bool,
    pub data: Option<Value>,
    #[serde(rename = "gameId")]
    pub game_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameEventForwardPayload {
    pub from: UserId,
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomClosedPayload {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerShutdownPayload {}

/// Wraps any outbound payload body with the `type` discriminant the wire
/// format expects, the same flattening trick used on the inbound side.
/// Serialization of these payload types cannot fail: they are plain data
/// with no manual `Serialize` impls, unbounded recursion, or non-string map
/// keys, so the type->value step is infallible in practice.
pub fn wire_message<T: Serialize>(kind: &str, payload: &T) -> Value {
    let mut value = serde_json::to_value(payload).expect("payload type is always serializable");
    if let Value::Object(ref mut map) = value {
        map.insert("type".to_string(), Value::String(kind.to_string()));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_envelope_splits_common_fields() {
        let raw: RawEnvelope = serde_json::from_str(
            r#"{"type":"join_stream","msgId":"m1","seq":3,"streamId":"r1","userId":"u1"}"#,
        )
        .unwrap();
        assert_eq!(raw.kind_str(), "join_stream");
        assert_eq!(raw.msg_id.as_deref(), Some("m1"));
        assert_eq!(raw.seq, Some(3));
        assert!(raw.fields.contains_key("streamId"));
        assert!(!raw.fields.contains_key("msgId"));
    }

    #[test]
    fn payload_rejects_unknown_fields() {
        let raw: RawEnvelope = serde_json::from_str(
            r#"{"type":"join_stream","streamId":"r1","userId":"u1","extra":true}"#,
        )
        .unwrap();
        let result = serde_json::from_value::<ClientPayload>(raw.to_payload_value());
        assert!(result.is_err());
    }

    #[test]
    fn raw_envelope_allows_missing_type_key() {
        let raw: RawEnvelope = serde_json::from_str(r#"{"msgId":"x"}"#).unwrap();
        assert_eq!(raw.kind, None);
        assert_eq!(raw.kind_str(), "");
    }

    #[test]
    fn payload_dispatches_by_tag() {
        let raw: RawEnvelope = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        let payload: ClientPayload = serde_json::from_value(raw.to_payload_value()).unwrap();
        assert_eq!(payload, ClientPayload::Ping(PingPayload {}));
        assert!(!payload.is_ack_eligible());
    }

    #[test]
    fn wire_message_injects_type() {
        let value = wire_message("pong", &PongPayload { ts: 42 });
        assert_eq!(value["type"], "pong");
        assert_eq!(value["ts"], 42);
    }
}
