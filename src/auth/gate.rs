//! Authorization gate.
//!
//! Every lifecycle operation starts with [`AuthorizationGate::require`].
//! Listings additionally resolve a [`Tier`]; single-resource reads check the
//! caller's relationship to the owning student with [`resource_access`].

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::permissions::Tier;
use super::resolver::PermissionResolver;
use crate::db::relational::StudentProfile;
use crate::types::{MeritError, Result};

/// An authenticated caller, as established by the token layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role_id: String,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role_id: role_id.into(),
        }
    }
}

/// How a caller is related to a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceAccess {
    /// Holds the `all` listing tier.
    All,
    /// Is the owning student.
    Owner,
    /// Is the owning student's advisor of record.
    Advisor,
}

/// Decide whether a caller may read a resource owned by `owner`.
///
/// `caller_student_id` / `caller_lecturer_id` are the caller's own profile
/// ids, if any.
pub fn resource_access(
    tier: Option<Tier>,
    caller_student_id: Option<&str>,
    caller_lecturer_id: Option<&str>,
    owner: &StudentProfile,
) -> Option<ResourceAccess> {
    if tier == Some(Tier::All) {
        return Some(ResourceAccess::All);
    }
    if caller_student_id == Some(owner.id.as_str()) {
        return Some(ResourceAccess::Owner);
    }
    match (caller_lecturer_id, owner.advisor_id.as_deref()) {
        (Some(lecturer), Some(advisor)) if lecturer == advisor => Some(ResourceAccess::Advisor),
        _ => None,
    }
}

pub struct AuthorizationGate {
    resolver: Arc<PermissionResolver>,
}

impl AuthorizationGate {
    pub fn new(resolver: Arc<PermissionResolver>) -> Self {
        Self { resolver }
    }

    pub async fn has(&self, caller: &Caller, permission: &str) -> Result<bool> {
        self.resolver
            .has_permission(&caller.role_id, permission)
            .await
    }

    /// Fail with `Forbidden` unless the caller's role grants `permission`.
    pub async fn require(&self, caller: &Caller, permission: &str) -> Result<()> {
        if self.has(caller, permission).await? {
            return Ok(());
        }
        debug!(
            user_id = %caller.user_id,
            role_id = %caller.role_id,
            permission,
            "Permission denied"
        );
        Err(MeritError::Forbidden(format!(
            "missing permission '{}'",
            permission
        )))
    }

    /// The highest-precedence listing tier the caller holds.
    pub async fn list_tier(&self, caller: &Caller) -> Result<Option<Tier>> {
        let permissions = self.resolver.permissions(&caller.role_id).await?;
        Ok(Tier::PRECEDENCE
            .into_iter()
            .find(|tier| permissions.contains(tier.permission())))
    }

    pub fn resolver(&self) -> &Arc<PermissionResolver> {
        &self.resolver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::resolver::{PermissionCacheConfig, PermissionSource};
    use async_trait::async_trait;
    use chrono::Utc;

    struct Table;

    #[async_trait]
    impl PermissionSource for Table {
        async fn permissions_for_role(&self, role_id: &str) -> Result<Vec<String>> {
            let perms: &[&str] = match role_id {
                // Holds two tiers; only the higher one may count.
                "dean" => &["achievement:list:advisor", "achievement:list:all"],
                "student" => &["achievement:list:self", "achievement:submit"],
                _ => &[],
            };
            Ok(perms.iter().map(|p| p.to_string()).collect())
        }
    }

    fn gate() -> AuthorizationGate {
        AuthorizationGate::new(Arc::new(PermissionResolver::new(
            Arc::new(Table),
            PermissionCacheConfig::default(),
        )))
    }

    fn owner(advisor: Option<&str>) -> StudentProfile {
        StudentProfile {
            id: "s1".into(),
            user_id: "u1".into(),
            full_name: "Sari".into(),
            student_number: None,
            program_study: None,
            advisor_id: advisor.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_require() {
        let gate = gate();
        let student = Caller::new("u1", "student");
        assert!(gate.require(&student, "achievement:submit").await.is_ok());
        let err = gate
            .require(&student, "achievement:verify")
            .await
            .unwrap_err();
        assert!(matches!(err, MeritError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_tier_uses_first_match_only() {
        let gate = gate();
        assert_eq!(
            gate.list_tier(&Caller::new("u", "dean")).await.unwrap(),
            Some(Tier::All)
        );
        assert_eq!(
            gate.list_tier(&Caller::new("u", "student")).await.unwrap(),
            Some(Tier::SelfOnly)
        );
        assert_eq!(gate.list_tier(&Caller::new("u", "guest")).await.unwrap(), None);
    }

    #[test]
    fn test_resource_access() {
        let owned = owner(Some("l1"));
        assert_eq!(
            resource_access(Some(Tier::All), None, None, &owned),
            Some(ResourceAccess::All)
        );
        assert_eq!(
            resource_access(Some(Tier::SelfOnly), Some("s1"), None, &owned),
            Some(ResourceAccess::Owner)
        );
        assert_eq!(
            resource_access(Some(Tier::Advisor), None, Some("l1"), &owned),
            Some(ResourceAccess::Advisor)
        );
        assert_eq!(
            resource_access(Some(Tier::Advisor), None, Some("l2"), &owned),
            None
        );
        assert_eq!(
            resource_access(Some(Tier::SelfOnly), Some("s2"), None, &owned),
            None
        );
        assert_eq!(
            resource_access(Some(Tier::Advisor), None, Some("l1"), &owner(None)),
            None
        );
    }
}
