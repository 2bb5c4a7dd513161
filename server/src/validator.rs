//! Payload Validator. Envelope-shape and size checks run before any JSON
//! parsing of the body; per-type field length caps run after
//! `protocol::ClientPayload` has already enforced required-field presence
//! and rejected unknown fields via `deny_unknown_fields` — sanitization
//! proper collapses to a no-op since unknown fields never survive the
//! deserializer.

use protocol::{ClientPayload, MAX_PAYLOAD_BYTES, MAX_TYPE_LEN};

use crate::errors::RouterError;

/// Envelope-level checks that run on the raw bytes/type before any per-type
/// parsing.
pub fn check_envelope(raw_bytes: &[u8], kind: &str) -> Result<(), RouterError> {
    if raw_bytes.len() > MAX_PAYLOAD_BYTES {
        return Err(RouterError::PayloadTooLarge(MAX_PAYLOAD_BYTES));
    }
    if kind.is_empty() {
        return Err(RouterError::MissingType);
    }
    if kind.len() > MAX_TYPE_LEN {
        return Err(RouterError::InvalidRequest(format!(
            "type exceeds {MAX_TYPE_LEN} characters"
        )));
    }
    Ok(())
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), RouterError> {
    if value.chars().count() > max {
        Err(RouterError::InvalidRequest(format!(
            "{field} exceeds {max} characters"
        )))
    } else {
        Ok(())
    }
}

/// Per-type field-length caps from the schema table. Field *presence* is
/// already enforced by `protocol`'s struct definitions; this only layers on
/// the maxLength constraints serde can't express.
pub fn check_field_lengths(payload: &ClientPayload) -> Result<(), RouterError> {
    match payload {
        ClientPayload::JoinStream(p) => {
            check_len("streamId", &p.stream_id, 100)?;
            check_len("userId", &p.user_id, 100)?;
        }
        ClientPayload::Resume(p) => {
            check_len("sessionToken", &p.session_token, 200)?;
            if let Some(room_id) = &p.room_id {
                check_len("roomId", room_id, 100)?;
            }
        }
        ClientPayload::WebrtcOffer(p) => {
            check_len("toUserId", &p.to_user_id, 100)?;
            check_len("fromUserId", &p.from_user_id, 100)?;
        }
        ClientPayload::WebrtcAnswer(p) => {
            check_len("toUserId", &p.to_user_id, 100)?;
            check_len("fromUserId", &p.from_user_id, 100)?;
        }
        ClientPayload::IceCandidate(p) => {
            check_len("toUserId", &p.to_user_id, 100)?;
            check_len("fromUserId", &p.from_user_id, 100)?;
        }
        ClientPayload::CohostAccept(p) => {
            check_len("streamId", &p.stream_id, 100)?;
            check_len("guestUserId", &p.guest_user_id, 100)?;
        }
        ClientPayload::CohostDecline(p) => {
            check_len("streamId", &p.stream_id, 100)?;
            check_len("viewerUserId", &p.viewer_user_id, 100)?;
        }
        ClientPayload::GameInit(p) => {
            check_len("gameId", &p.game_id, 100)?;
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::JoinStreamPayload;

    #[test]
    fn envelope_rejects_oversized_payload() {
        let big = vec![b'x'; MAX_PAYLOAD_BYTES + 1];
        assert!(check_envelope(&big, "ping").is_err());
    }

    #[test]
    fn envelope_rejects_missing_type() {
        assert!(check_envelope(b"{}", "").is_err());
    }

    #[test]
    fn field_length_enforced_beyond_serde() {
        let payload = ClientPayload::JoinStream(JoinStreamPayload {
            stream_id: "r".repeat(101),
            user_id: "u1".to_string(),
        });
        assert!(check_field_lengths(&payload).is_err());
    }

    #[test]
    fn field_length_passes_for_reasonable_values() {
        let payload = ClientPayload::JoinStream(JoinStreamPayload {
            stream_id: "r1".to_string(),
            user_id: "u1".to_string(),
        });
        assert!(check_field_lengths(&payload).is_ok());
    }
}
