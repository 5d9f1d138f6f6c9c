//! Status history derived from a reference's transition timestamps.
//!
//! Each transition writes its own timestamp column exactly once, so the
//! history can be rebuilt from the reference row alone.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::status::AchievementStatus;
use crate::db::relational::AchievementReference;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub status: AchievementStatus,
    pub at: DateTime<Utc>,
    /// Student id for owner transitions, lecturer id for advisor decisions.
    pub by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Oldest first.
pub fn history_of(reference: &AchievementReference) -> Vec<HistoryEntry> {
    let owner = || reference.student_id.clone();
    let mut entries = vec![HistoryEntry {
        status: AchievementStatus::Draft,
        at: reference.created_at,
        by: owner(),
        note: None,
    }];

    if let Some(at) = reference.submitted_at {
        entries.push(HistoryEntry {
            status: AchievementStatus::Submitted,
            at,
            by: owner(),
            note: None,
        });
    }

    match reference.status {
        AchievementStatus::Verified | AchievementStatus::Rejected => {
            if let (Some(at), Some(by)) = (reference.verified_at, reference.verified_by.clone()) {
                entries.push(HistoryEntry {
                    status: reference.status,
                    at,
                    by,
                    note: reference.rejection_note.clone(),
                });
            }
        }
        AchievementStatus::Deleted => entries.push(HistoryEntry {
            status: AchievementStatus::Deleted,
            at: reference.updated_at,
            by: owner(),
            note: None,
        }),
        AchievementStatus::Draft | AchievementStatus::Submitted => {}
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reference(status: AchievementStatus) -> AchievementReference {
        let t0 = Utc::now();
        AchievementReference {
            id: "a1".into(),
            student_id: "s1".into(),
            record_id: "r1".into(),
            status,
            created_at: t0,
            submitted_at: None,
            verified_at: None,
            verified_by: None,
            rejection_note: None,
            updated_at: t0,
        }
    }

    #[test]
    fn test_draft_has_single_entry() {
        let entries = history_of(&reference(AchievementStatus::Draft));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, AchievementStatus::Draft);
        assert_eq!(entries[0].by, "s1");
    }

    #[test]
    fn test_rejected_carries_note_and_advisor() {
        let mut r = reference(AchievementStatus::Rejected);
        r.submitted_at = Some(r.created_at + Duration::minutes(1));
        r.verified_at = Some(r.created_at + Duration::minutes(2));
        r.verified_by = Some("l1".into());
        r.rejection_note = Some("missing certificate".into());

        let entries = history_of(&r);
        let statuses: Vec<_> = entries.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                AchievementStatus::Draft,
                AchievementStatus::Submitted,
                AchievementStatus::Rejected
            ]
        );
        assert_eq!(entries[2].by, "l1");
        assert_eq!(entries[2].note.as_deref(), Some("missing certificate"));
    }

    #[test]
    fn test_deleted_uses_last_update() {
        let mut r = reference(AchievementStatus::Deleted);
        r.updated_at = r.created_at + Duration::minutes(5);
        let entries = history_of(&r);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].at, r.updated_at);
    }
}
