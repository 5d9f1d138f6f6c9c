//! Permission names, role names and the default role → permission table

use serde::{Deserialize, Serialize};
use std::fmt;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_LECTURER: &str = "lecturer";
pub const ROLE_STUDENT: &str = "student";

// Achievement lifecycle
pub const ACHIEVEMENT_CREATE: &str = "achievement:create";
pub const ACHIEVEMENT_SUBMIT: &str = "achievement:submit";
pub const ACHIEVEMENT_UPDATE: &str = "achievement:update";
pub const ACHIEVEMENT_DELETE: &str = "achievement:delete";
pub const ACHIEVEMENT_UPLOAD: &str = "achievement:upload";
pub const ACHIEVEMENT_VERIFY: &str = "achievement:verify";
pub const ACHIEVEMENT_REJECT: &str = "achievement:reject";
pub const ACHIEVEMENT_DETAIL: &str = "achievement:detail";
pub const ACHIEVEMENT_HISTORY: &str = "achievement:history";
pub const ACHIEVEMENT_LIST: &str = "achievement:list";

// Listing tiers
pub const ACHIEVEMENT_LIST_ALL: &str = "achievement:list:all";
pub const ACHIEVEMENT_LIST_ADVISOR: &str = "achievement:list:advisor";
pub const ACHIEVEMENT_LIST_SELF: &str = "achievement:list:self";

// People and administration
pub const STUDENT_READ: &str = "student:read";
pub const STUDENT_LIST: &str = "student:list";
pub const STUDENT_SET_ADVISOR: &str = "student:set-advisor";
pub const LECTURER_LIST: &str = "lecturer:list";
pub const USER_MANAGE: &str = "user:manage";
pub const REPORT_VIEW: &str = "report:view";

/// Visibility tier for listings, highest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    All,
    Advisor,
    #[serde(rename = "self")]
    SelfOnly,
}

impl Tier {
    /// Tiers in the order they are checked. Only the first match counts.
    pub const PRECEDENCE: [Tier; 3] = [Tier::All, Tier::Advisor, Tier::SelfOnly];

    pub fn permission(&self) -> &'static str {
        match self {
            Tier::All => ACHIEVEMENT_LIST_ALL,
            Tier::Advisor => ACHIEVEMENT_LIST_ADVISOR,
            Tier::SelfOnly => ACHIEVEMENT_LIST_SELF,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::All => write!(f, "all"),
            Tier::Advisor => write!(f, "advisor"),
            Tier::SelfOnly => write!(f, "self"),
        }
    }
}

const ADMIN_PERMISSIONS: &[&str] = &[
    ACHIEVEMENT_DETAIL,
    ACHIEVEMENT_HISTORY,
    ACHIEVEMENT_LIST,
    ACHIEVEMENT_LIST_ALL,
    STUDENT_READ,
    STUDENT_LIST,
    STUDENT_SET_ADVISOR,
    LECTURER_LIST,
    USER_MANAGE,
    REPORT_VIEW,
];

const LECTURER_PERMISSIONS: &[&str] = &[
    ACHIEVEMENT_VERIFY,
    ACHIEVEMENT_REJECT,
    ACHIEVEMENT_DETAIL,
    ACHIEVEMENT_HISTORY,
    ACHIEVEMENT_LIST,
    ACHIEVEMENT_LIST_ADVISOR,
    STUDENT_READ,
    STUDENT_LIST,
    LECTURER_LIST,
    REPORT_VIEW,
];

const STUDENT_PERMISSIONS: &[&str] = &[
    ACHIEVEMENT_CREATE,
    ACHIEVEMENT_SUBMIT,
    ACHIEVEMENT_UPDATE,
    ACHIEVEMENT_DELETE,
    ACHIEVEMENT_UPLOAD,
    ACHIEVEMENT_DETAIL,
    ACHIEVEMENT_HISTORY,
    ACHIEVEMENT_LIST,
    ACHIEVEMENT_LIST_SELF,
    STUDENT_LIST,
    REPORT_VIEW,
];

/// Permissions seeded for the built-in roles.
pub fn default_role_permissions() -> Vec<(&'static str, &'static [&'static str])> {
    vec![
        (ROLE_ADMIN, ADMIN_PERMISSIONS),
        (ROLE_LECTURER, LECTURER_PERMISSIONS),
        (ROLE_STUDENT, STUDENT_PERMISSIONS),
    ]
}

/// Every permission name known to the system.
pub fn all_permissions() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = default_role_permissions()
        .into_iter()
        .flat_map(|(_, perms)| perms.iter().copied())
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_precedence_order() {
        assert_eq!(Tier::PRECEDENCE[0], Tier::All);
        assert!(Tier::All < Tier::Advisor && Tier::Advisor < Tier::SelfOnly);
        assert_eq!(serde_json::to_string(&Tier::SelfOnly).unwrap(), "\"self\"");
    }

    #[test]
    fn test_each_role_holds_exactly_one_tier() {
        for (role, perms) in default_role_permissions() {
            let tiers = Tier::PRECEDENCE
                .iter()
                .filter(|t| perms.contains(&t.permission()))
                .count();
            assert_eq!(tiers, 1, "role {} should hold one listing tier", role);
        }
    }

    #[test]
    fn test_lifecycle_actions_are_split_by_role() {
        let table = default_role_permissions();
        let perms_of = |role: &str| {
            table
                .iter()
                .find(|(r, _)| *r == role)
                .map(|(_, p)| *p)
                .unwrap()
        };
        assert!(perms_of(ROLE_STUDENT).contains(&ACHIEVEMENT_SUBMIT));
        assert!(!perms_of(ROLE_STUDENT).contains(&ACHIEVEMENT_VERIFY));
        assert!(perms_of(ROLE_LECTURER).contains(&ACHIEVEMENT_VERIFY));
        assert!(!perms_of(ROLE_LECTURER).contains(&ACHIEVEMENT_CREATE));
        assert!(!perms_of(ROLE_ADMIN).contains(&ACHIEVEMENT_VERIFY));
    }

    #[test]
    fn test_all_permissions_is_deduplicated() {
        let all = all_permissions();
        assert_eq!(all.len(), 19);
        assert!(all.contains(&USER_MANAGE));
    }
}
