use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

/// Deterministic digest of a single task-completion event.
///
/// The digest is derived from immutable event data (employee, task and
/// completion timestamp) and is the idempotency key for on-chain anchoring:
/// the same completion event always produces the same hash, so a retried
/// submission resolves to the existing audit entry instead of a duplicate.
pub fn activity_hash(employee_id: &str, task_id: &str, completed_at: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(employee_id.as_bytes());
    hasher.update(b"|");
    hasher.update(task_id.as_bytes());
    hasher.update(b"|");
    hasher.update(completed_at.as_bytes());

    let digest = hasher.finalize();
    STANDARD_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_events_hash_identically() {
        let a = activity_hash("emp-1", "task-9", "2026-03-01T12:00:00Z");
        let b = activity_hash("emp-1", "task-9", "2026-03-01T12:00:00Z");
        assert_eq!(a, b);
    }

    #[test]
    fn any_field_change_alters_the_hash() {
        let base = activity_hash("emp-1", "task-9", "2026-03-01T12:00:00Z");
        assert_ne!(base, activity_hash("emp-2", "task-9", "2026-03-01T12:00:00Z"));
        assert_ne!(base, activity_hash("emp-1", "task-8", "2026-03-01T12:00:00Z"));
        assert_ne!(base, activity_hash("emp-1", "task-9", "2026-03-01T12:00:01Z"));
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        // "ab" + "c" must not collide with "a" + "bc".
        assert_ne!(
            activity_hash("ab", "c", "t"),
            activity_hash("a", "bc", "t")
        );
    }
}
