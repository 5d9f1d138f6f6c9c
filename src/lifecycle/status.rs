//! Achievement workflow status.
//!
//! ```text
//! draft ──submit──▶ submitted ──verify──▶ verified
//!   │                   └──────reject──▶ rejected
//!   └──delete──▶ deleted
//! ```
//!
//! The relational reference row is authoritative for the status; the
//! document record never carries it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::MeritError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementStatus {
    Draft,
    Submitted,
    Verified,
    Rejected,
    Deleted,
}

impl AchievementStatus {
    pub const ALL: [AchievementStatus; 5] = [
        Self::Draft,
        Self::Submitted,
        Self::Verified,
        Self::Rejected,
        Self::Deleted,
    ];

    /// Column value stored in `achievement_references.status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
            Self::Deleted => "deleted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Rejected | Self::Deleted)
    }

    /// The single status a reference must be in to move to `next`.
    ///
    /// Returns `None` for targets that are never reached by a transition
    /// (`draft` is only ever the initial status).
    pub fn required_source(next: AchievementStatus) -> Option<AchievementStatus> {
        match next {
            Self::Draft => None,
            Self::Submitted => Some(Self::Draft),
            Self::Verified | Self::Rejected => Some(Self::Submitted),
            Self::Deleted => Some(Self::Draft),
        }
    }

    pub fn can_transition_to(&self, next: AchievementStatus) -> bool {
        Self::required_source(next) == Some(*self)
    }

    /// Record fields other than attachments may change only in draft.
    pub fn allows_record_edits(&self) -> bool {
        matches!(self, Self::Draft)
    }

    /// Attachments may be appended until an advisor has decided.
    pub fn allows_attachments(&self) -> bool {
        matches!(self, Self::Draft | Self::Submitted)
    }
}

impl fmt::Display for AchievementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchievementStatus {
    type Err = MeritError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "submitted" => Ok(Self::Submitted),
            "verified" => Ok(Self::Verified),
            "rejected" => Ok(Self::Rejected),
            "deleted" => Ok(Self::Deleted),
            other => Err(MeritError::Validation(format!(
                "unknown achievement status '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use AchievementStatus::*;
        assert!(Draft.can_transition_to(Submitted));
        assert!(Draft.can_transition_to(Deleted));
        assert!(Submitted.can_transition_to(Verified));
        assert!(Submitted.can_transition_to(Rejected));
    }

    #[test]
    fn test_no_skipping_or_reopening() {
        use AchievementStatus::*;
        assert!(!Draft.can_transition_to(Verified));
        assert!(!Draft.can_transition_to(Rejected));
        assert!(!Submitted.can_transition_to(Deleted));
        assert!(!Submitted.can_transition_to(Submitted));
        for terminal in [Verified, Rejected, Deleted] {
            assert!(terminal.is_terminal());
            for next in AchievementStatus::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_parse_round_trips_column_values() {
        for status in AchievementStatus::ALL {
            assert_eq!(status.as_str().parse::<AchievementStatus>().unwrap(), status);
        }
        assert!(matches!(
            "archived".parse::<AchievementStatus>(),
            Err(MeritError::Validation(_))
        ));
    }

    #[test]
    fn test_attachment_window() {
        assert!(AchievementStatus::Draft.allows_attachments());
        assert!(AchievementStatus::Submitted.allows_attachments());
        assert!(!AchievementStatus::Verified.allows_attachments());
        assert!(!AchievementStatus::Submitted.allows_record_edits());
    }
}
