//! Backpressure Monitor: classifies a connection's outbound queue depth and
//! decides whether a non-critical message should be silently dropped rather
//! than enqueued.

const WARNING_BYTES: usize = 512 * 1024;
const CRITICAL_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Ok,
    Warning,
    Critical,
}

pub fn classify(queue_bytes: usize) -> QueueStatus {
    if queue_bytes >= CRITICAL_BYTES {
        QueueStatus::Critical
    } else if queue_bytes >= WARNING_BYTES {
        QueueStatus::Warning
    } else {
        QueueStatus::Ok
    }
}

/// The droppable kinds; every other kind is "critical" and is enqueued
/// regardless of queue depth.
fn is_droppable(kind: &str) -> bool {
    matches!(kind, "ice_candidate" | "participant_count_update" | "game_state")
}

/// `shouldDrop(conn, kind) = (status == critical) ∧ kind ∈ {droppable}`.
pub fn should_drop(queue_bytes: usize, kind: &str) -> bool {
    classify(queue_bytes) == QueueStatus::Critical && is_droppable(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_thresholds() {
        assert_eq!(classify(0), QueueStatus::Ok);
        assert_eq!(classify(WARNING_BYTES), QueueStatus::Warning);
        assert_eq!(classify(CRITICAL_BYTES), QueueStatus::Critical);
    }

    #[test]
    fn only_droppable_kinds_are_dropped_when_critical() {
        assert!(should_drop(CRITICAL_BYTES, "ice_candidate"));
        assert!(!should_drop(CRITICAL_BYTES, "webrtc_offer"));
        assert!(!should_drop(WARNING_BYTES, "ice_candidate"));
    }
}
