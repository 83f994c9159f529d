//! Which task records may be claimed right now.

use chrono::{DateTime, Utc};
use outpost_core::models::{TaskRecord, TaskState};

/// SQL form of [`Availability::admits`]; `$1` is the current time.
pub const AVAILABLE_PREDICATE: &str = "state = 'enqueued' AND visible_after <= $1";

/// Eligibility of a record at a point in time: enqueued and past its
/// visibility window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub now: DateTime<Utc>,
}

impl Availability {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn admits(&self, record: &TaskRecord) -> bool {
        record.state == TaskState::Enqueued && record.visible_after <= self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use outpost_core::models::TaskPayload;
    use serde_json::json;

    fn record(now: DateTime<Utc>) -> TaskRecord {
        TaskRecord::new(TaskPayload::new("orders", json!({})), now)
    }

    #[test]
    fn admits_enqueued_record_at_its_visibility_instant() {
        let now = Utc::now();
        assert!(Availability::at(now).admits(&record(now)));
    }

    #[test]
    fn rejects_record_inside_visibility_window() {
        let now = Utc::now();
        let mut r = record(now);
        r.visible_after = now + Duration::seconds(2);

        assert!(!Availability::at(now).admits(&r));
        assert!(Availability::at(now + Duration::seconds(2)).admits(&r));
    }

    #[test]
    fn rejects_every_non_enqueued_state() {
        let now = Utc::now();
        for state in [TaskState::Succeeded, TaskState::Failed, TaskState::Deleted] {
            let mut r = record(now - Duration::minutes(1));
            r.state = state;
            assert!(!Availability::at(now).admits(&r), "{state} must not be claimable");
        }
    }
}
