//! API handlers module

pub mod admin;
pub mod applications;
pub mod auth;
pub mod contributions;
pub mod health;
pub mod products;
pub mod projects;
pub mod tenants;

use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use pledgehub_common::{
    auth::AuthContext,
    db::{models::Project, Page, Repository},
    domain::Visibility,
    errors::{AppError, Result},
    policy::{can_view_project, Actor, ProjectFacts},
};

/// `page` / `per_page` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        let defaults = Page::default();
        Page {
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
        }
        .normalized()
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`)
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// The caller as seen from a tenant; anonymous when unauthenticated
pub(crate) async fn tenant_actor(
    repo: &Repository,
    auth: Option<&AuthContext>,
    tenant_id: Uuid,
) -> Result<Actor> {
    let Some(auth) = auth else {
        return Ok(Actor::anonymous());
    };

    let roles = repo.roles_for(auth.user_id, tenant_id).await?;
    Ok(Actor {
        user_id: Some(auth.user_id),
        email: Some(auth.email.clone()),
        is_system_admin: auth.is_system_admin,
        roles,
    })
}

/// The caller outside any tenant
pub(crate) fn platform_actor(auth: &AuthContext) -> Actor {
    Actor {
        user_id: Some(auth.user_id),
        email: Some(auth.email.clone()),
        is_system_admin: auth.is_system_admin,
        roles: Vec::new(),
    }
}

/// Policy facts for a project; `has_contributions` is only loaded on demand
pub(crate) async fn project_facts(
    repo: &Repository,
    project: &Project,
    actor: &Actor,
) -> Result<ProjectFacts> {
    let visibility = project.project_visibility()?;

    let invited = match (actor.user_id, actor.email.as_deref()) {
        (Some(user_id), Some(email)) if visibility == Visibility::InviteOnly => {
            repo.is_invited(project.id, user_id, email).await?
        }
        _ => false,
    };

    Ok(ProjectFacts {
        manager_id: project.manager_id,
        status: project.project_status()?,
        visibility,
        invited,
        has_contributions: false,
    })
}

/// Load a project the actor may see; hidden projects read as missing
pub(crate) async fn visible_project(
    repo: &Repository,
    tenant_id: Uuid,
    project_id: Uuid,
    actor: &Actor,
) -> Result<(Project, ProjectFacts)> {
    let not_found = || AppError::ProjectNotFound {
        id: project_id.to_string(),
    };

    let project = repo
        .find_project(tenant_id, project_id)
        .await?
        .ok_or_else(not_found)?;
    let facts = project_facts(repo, &project, actor).await?;

    if !can_view_project(actor, &facts) {
        return Err(not_found());
    }
    Ok((project, facts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        ends_on: Option<Option<String>>,
    }

    #[test]
    fn test_double_option_distinguishes_null() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.ends_on, None);

        let cleared: Patch = serde_json::from_str(r#"{"ends_on": null}"#).unwrap();
        assert_eq!(cleared.ends_on, Some(None));

        let set: Patch = serde_json::from_str(r#"{"ends_on": "2026-12-31"}"#).unwrap();
        assert_eq!(set.ends_on, Some(Some("2026-12-31".to_string())));
    }

    #[test]
    fn test_page_query_clamps() {
        let query = PageQuery {
            page: Some(0),
            per_page: Some(1000),
        };
        assert_eq!(query.page(), Page { page: 1, per_page: 100 });
        assert_eq!(PageQuery::default().page(), Page::default());
    }

    #[test]
    fn test_platform_actor_has_no_tenant_roles() {
        let auth = AuthContext {
            user_id: Uuid::new_v4(),
            email: "root@pledgehub.example".to_string(),
            is_system_admin: true,
        };
        let actor = platform_actor(&auth);
        assert!(actor.is_system_admin);
        assert!(!actor.is_member());
    }
}
