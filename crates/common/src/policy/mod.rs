//! Authorization policies
//!
//! Every check here is a pure function over an [`Actor`] and the facts of the
//! resource being touched. Handlers load the facts, ask the policy, and turn a
//! `false` into [`AppError::Forbidden`] through [`authorize`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{ApprovalStatus, ProjectStatus, Visibility};
use crate::errors::{AppError, Result};

/// Role a user holds inside one tenant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantRole {
    TenantAdmin,
    ProjectManager,
    Contributor,
}

impl TenantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantRole::TenantAdmin => "tenant_admin",
            TenantRole::ProjectManager => "project_manager",
            TenantRole::Contributor => "contributor",
        }
    }
}

impl fmt::Display for TenantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tenant_admin" => Ok(TenantRole::TenantAdmin),
            "project_manager" => Ok(TenantRole::ProjectManager),
            "contributor" => Ok(TenantRole::Contributor),
            other => Err(AppError::InvalidFormat {
                message: format!("unknown tenant role '{}'", other),
            }),
        }
    }
}

/// The caller, as seen from the current tenant
#[derive(Clone, Debug, Default)]
pub struct Actor {
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub is_system_admin: bool,
    pub roles: Vec<TenantRole>,
}

impl Actor {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn has_role(&self, role: TenantRole) -> bool {
        self.roles.contains(&role)
    }

    /// Holds any role in the current tenant
    pub fn is_member(&self) -> bool {
        !self.roles.is_empty()
    }

    pub fn is_tenant_admin(&self) -> bool {
        self.is_system_admin || self.has_role(TenantRole::TenantAdmin)
    }

    fn is(&self, user_id: Uuid) -> bool {
        self.user_id == Some(user_id)
    }
}

/// What policies need to know about a project
#[derive(Clone, Debug)]
pub struct ProjectFacts {
    pub manager_id: Option<Uuid>,
    pub status: ProjectStatus,
    pub visibility: Visibility,
    /// The actor holds an invitation to this project
    pub invited: bool,
    pub has_contributions: bool,
}

/// Turn a policy verdict into a result
pub fn authorize(allowed: bool, action: &str) -> Result<()> {
    if allowed {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("not allowed to {}", action)))
    }
}

// ============================================================================
// Tenant
// ============================================================================

pub fn can_view_tenant(actor: &Actor) -> bool {
    actor.is_system_admin || actor.is_member()
}

/// Settings and role assignments
pub fn can_manage_tenant(actor: &Actor) -> bool {
    actor.is_tenant_admin()
}

/// Cross-tenant administration: suspensions, fees, application review
pub fn can_administer_platform(actor: &Actor) -> bool {
    actor.is_system_admin
}

// ============================================================================
// Project
// ============================================================================

pub fn can_create_project(actor: &Actor) -> bool {
    actor.is_tenant_admin() || actor.has_role(TenantRole::ProjectManager)
}

/// Tenant admins, or the project manager assigned to this project
pub fn can_manage_project(actor: &Actor, project: &ProjectFacts) -> bool {
    if actor.is_tenant_admin() {
        return true;
    }
    actor.has_role(TenantRole::ProjectManager)
        && project.manager_id.is_some_and(|manager| actor.is(manager))
}

pub fn can_view_project(actor: &Actor, project: &ProjectFacts) -> bool {
    if can_manage_project(actor, project) {
        return true;
    }
    if project.status == ProjectStatus::Draft {
        return false;
    }
    match project.visibility {
        Visibility::Public => true,
        Visibility::Private => actor.is_member(),
        Visibility::InviteOnly => actor.is_member() || (actor.is_authenticated() && project.invited),
    }
}

/// Only drafts nobody has pledged to can be removed
pub fn can_delete_project(actor: &Actor, project: &ProjectFacts) -> bool {
    actor.is_tenant_admin()
        && project.status == ProjectStatus::Draft
        && !project.has_contributions
}

// ============================================================================
// Contribution
// ============================================================================

pub fn can_contribute(actor: &Actor, project: &ProjectFacts) -> bool {
    actor.is_authenticated()
        && project.status.accepts_contributions()
        && can_view_project(actor, project)
}

pub fn can_view_contribution(actor: &Actor, owner_id: Uuid, project: &ProjectFacts) -> bool {
    actor.is(owner_id) || can_manage_project(actor, project)
}

/// Approve, reject, and record payments
pub fn can_review_contribution(actor: &Actor, project: &ProjectFacts) -> bool {
    can_manage_project(actor, project)
}

pub fn can_cancel_contribution(
    actor: &Actor,
    owner_id: Uuid,
    status: ApprovalStatus,
    nothing_paid: bool,
) -> bool {
    actor.is(owner_id) && status == ApprovalStatus::Pending && nothing_paid
}

// ============================================================================
// Tenant application
// ============================================================================

pub fn can_submit_application(actor: &Actor, has_pending: bool) -> bool {
    actor.is_authenticated() && !has_pending
}

pub fn can_view_application(actor: &Actor, applicant_id: Uuid) -> bool {
    actor.is_system_admin || actor.is(applicant_id)
}

pub fn can_review_application(actor: &Actor) -> bool {
    actor.is_system_admin
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(roles: &[TenantRole]) -> Actor {
        Actor {
            user_id: Some(Uuid::new_v4()),
            email: Some("someone@example.org".into()),
            is_system_admin: false,
            roles: roles.to_vec(),
        }
    }

    fn sysadmin() -> Actor {
        Actor {
            is_system_admin: true,
            ..user(&[])
        }
    }

    fn project(status: ProjectStatus, visibility: Visibility) -> ProjectFacts {
        ProjectFacts {
            manager_id: None,
            status,
            visibility,
            invited: false,
            has_contributions: false,
        }
    }

    #[test]
    fn test_role_strings() {
        for role in [
            TenantRole::TenantAdmin,
            TenantRole::ProjectManager,
            TenantRole::Contributor,
        ] {
            assert_eq!(role.as_str().parse::<TenantRole>().ok(), Some(role));
        }
        assert!("owner".parse::<TenantRole>().is_err());
    }

    #[test]
    fn test_tenant_policies() {
        let outsider = user(&[]);
        let contributor = user(&[TenantRole::Contributor]);
        let admin = user(&[TenantRole::TenantAdmin]);

        assert!(!can_view_tenant(&outsider));
        assert!(can_view_tenant(&contributor));
        assert!(!can_manage_tenant(&contributor));
        assert!(can_manage_tenant(&admin));
        assert!(!can_administer_platform(&admin));
        assert!(can_administer_platform(&sysadmin()));
        assert!(can_manage_tenant(&sysadmin()));
    }

    #[test]
    fn test_public_project_visibility() {
        let active = project(ProjectStatus::Active, Visibility::Public);
        assert!(can_view_project(&Actor::anonymous(), &active));

        let draft = project(ProjectStatus::Draft, Visibility::Public);
        assert!(!can_view_project(&Actor::anonymous(), &draft));
        assert!(!can_view_project(&user(&[TenantRole::Contributor]), &draft));
        assert!(can_view_project(&user(&[TenantRole::TenantAdmin]), &draft));
    }

    #[test]
    fn test_private_and_invite_only_visibility() {
        let private = project(ProjectStatus::Active, Visibility::Private);
        assert!(!can_view_project(&user(&[]), &private));
        assert!(can_view_project(&user(&[TenantRole::Contributor]), &private));

        let mut invite_only = project(ProjectStatus::Paused, Visibility::InviteOnly);
        assert!(!can_view_project(&user(&[]), &invite_only));
        invite_only.invited = true;
        assert!(can_view_project(&user(&[]), &invite_only));
        assert!(!can_view_project(&Actor::anonymous(), &invite_only));
    }

    #[test]
    fn test_project_manager_scope() {
        let pm = user(&[TenantRole::ProjectManager]);
        let mut facts = project(ProjectStatus::Draft, Visibility::Public);

        assert!(can_create_project(&pm));
        assert!(!can_manage_project(&pm, &facts));

        facts.manager_id = pm.user_id;
        assert!(can_manage_project(&pm, &facts));
        assert!(can_view_project(&pm, &facts));
        // managers cannot delete, only tenant admins
        assert!(!can_delete_project(&pm, &facts));

        // the manager id alone is not enough without the role
        let demoted = Actor {
            roles: vec![TenantRole::Contributor],
            ..pm
        };
        assert!(!can_manage_project(&demoted, &facts));
    }

    #[test]
    fn test_delete_only_empty_drafts() {
        let admin = user(&[TenantRole::TenantAdmin]);
        let mut facts = project(ProjectStatus::Draft, Visibility::Public);
        assert!(can_delete_project(&admin, &facts));

        facts.has_contributions = true;
        assert!(!can_delete_project(&admin, &facts));

        let active = project(ProjectStatus::Active, Visibility::Public);
        assert!(!can_delete_project(&admin, &active));
    }

    #[test]
    fn test_contribution_policies() {
        let backer = user(&[]);
        let active = project(ProjectStatus::Active, Visibility::Public);
        let paused = project(ProjectStatus::Paused, Visibility::Public);

        assert!(can_contribute(&backer, &active));
        assert!(!can_contribute(&backer, &paused));
        assert!(!can_contribute(&Actor::anonymous(), &active));

        let owner = backer.user_id.unwrap();
        assert!(can_view_contribution(&backer, owner, &active));
        assert!(!can_view_contribution(&user(&[]), owner, &active));
        assert!(can_view_contribution(&user(&[TenantRole::TenantAdmin]), owner, &active));

        assert!(!can_review_contribution(&backer, &active));
        assert!(can_review_contribution(&sysadmin(), &active));

        assert!(can_cancel_contribution(&backer, owner, ApprovalStatus::Pending, true));
        assert!(!can_cancel_contribution(&backer, owner, ApprovalStatus::Pending, false));
        assert!(!can_cancel_contribution(&backer, owner, ApprovalStatus::Approved, true));
    }

    #[test]
    fn test_application_policies() {
        let applicant = user(&[]);
        let id = applicant.user_id.unwrap();

        assert!(can_submit_application(&applicant, false));
        assert!(!can_submit_application(&applicant, true));
        assert!(!can_submit_application(&Actor::anonymous(), false));

        assert!(can_view_application(&applicant, id));
        assert!(!can_view_application(&user(&[]), id));
        assert!(can_view_application(&sysadmin(), id));

        assert!(!can_review_application(&user(&[TenantRole::TenantAdmin])));
        assert!(can_review_application(&sysadmin()));
    }

    #[test]
    fn test_authorize_maps_to_forbidden() {
        assert!(authorize(true, "view project").is_ok());
        let err = authorize(false, "view project").unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }
}
