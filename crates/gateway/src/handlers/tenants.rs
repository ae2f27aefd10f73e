//! Tenant props, settings and membership

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::handlers::tenant_actor;
use crate::AppState;
use pledgehub_common::{
    auth::{AuthContext, MaybeAuth},
    db::{models::User, TenantSettings},
    domain::money,
    errors::{AppError, Result},
    policy::{authorize, can_create_project, can_manage_tenant, can_view_tenant, TenantRole},
    tenancy::CurrentTenant,
};

/// What the caller may do in this tenant
#[derive(Serialize)]
pub struct ViewerProps {
    pub authenticated: bool,
    pub roles: Vec<TenantRole>,
    pub can_manage: bool,
    pub can_create_projects: bool,
}

#[derive(Serialize)]
pub struct TenantResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub currency: String,

    /// Member-only details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_fee_percent: Option<Decimal>,

    pub viewer: ViewerProps,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,

    #[validate(email)]
    pub contact_email: Option<String>,

    pub currency: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    #[validate(email)]
    pub email: String,

    pub role: TenantRole,
}

#[derive(Serialize)]
pub struct MemberResponse {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub roles: Vec<TenantRole>,
}

impl MemberResponse {
    fn new(user: User, roles: Vec<TenantRole>) -> Self {
        Self {
            user_id: user.id,
            name: user.name,
            email: user.email,
            roles,
        }
    }
}

/// Tenant props for the current tenant; visitors get the public part
pub async fn show_tenant(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    MaybeAuth(auth): MaybeAuth,
) -> Result<Json<TenantResponse>> {
    let actor = tenant_actor(&state.repo(), auth.as_ref(), tenant.id).await?;
    let insider = can_view_tenant(&actor);

    Ok(Json(TenantResponse {
        id: tenant.id,
        name: tenant.name,
        slug: tenant.slug,
        currency: tenant.currency,
        contact_email: insider.then_some(tenant.contact_email),
        platform_fee_percent: insider.then_some(tenant.platform_fee_percent),
        viewer: ViewerProps {
            authenticated: actor.is_authenticated(),
            can_manage: can_manage_tenant(&actor),
            can_create_projects: can_create_project(&actor),
            roles: actor.roles,
        },
    }))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<pledgehub_common::db::models::Tenant>> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, Some(&auth), tenant.id).await?;
    authorize(can_manage_tenant(&actor), "change tenant settings")?;
    request.validate()?;

    let currency = request
        .currency
        .as_deref()
        .map(money::normalize_currency)
        .transpose()?;

    let updated = repo
        .update_tenant_settings(
            tenant.id,
            TenantSettings {
                name: request.name.map(|n| n.trim().to_string()),
                contact_email: request.contact_email,
                currency,
            },
        )
        .await?;

    tracing::info!(tenant_id = %tenant.id, user_id = %auth.user_id, "Tenant settings updated");

    Ok(Json(updated))
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
) -> Result<Json<Vec<MemberResponse>>> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, Some(&auth), tenant.id).await?;
    authorize(can_manage_tenant(&actor), "manage members")?;

    let members = repo
        .list_members(tenant.id)
        .await?
        .into_iter()
        .map(|(user, roles)| MemberResponse::new(user, roles))
        .collect();

    Ok(Json(members))
}

/// Grant a role to a registered user
pub async fn add_member(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
    Json(request): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<MemberResponse>)> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, Some(&auth), tenant.id).await?;
    authorize(can_manage_tenant(&actor), "manage members")?;
    request.validate()?;

    let user = repo
        .find_user_by_email(&request.email)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource_type: "user".to_string(),
            id: request.email.clone(),
        })?;

    repo.assign_role(user.id, tenant.id, request.role).await?;
    let roles = repo.roles_for(user.id, tenant.id).await?;

    tracing::info!(
        tenant_id = %tenant.id,
        member_id = %user.id,
        role = %request.role,
        granted_by = %auth.user_id,
        "Role granted"
    );

    Ok((StatusCode::CREATED, Json(MemberResponse::new(user, roles))))
}

/// Revoke one role; the last tenant admin cannot be removed
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
    Path((user_id, role)): Path<(Uuid, TenantRole)>,
) -> Result<StatusCode> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, Some(&auth), tenant.id).await?;
    authorize(can_manage_tenant(&actor), "manage members")?;

    if !repo.revoke_role(user_id, tenant.id, role).await? {
        return Err(AppError::NotFound {
            resource_type: "role assignment".to_string(),
            id: format!("{}/{}", user_id, role),
        });
    }

    tracing::info!(
        tenant_id = %tenant.id,
        member_id = %user_id,
        role = %role,
        revoked_by = %auth.user_id,
        "Role revoked"
    );

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_member_role_names() {
        let request: AddMemberRequest =
            serde_json::from_str(r#"{"email":"pm@example.org","role":"project_manager"}"#).unwrap();
        assert_eq!(request.role, TenantRole::ProjectManager);

        let bad = serde_json::from_str::<AddMemberRequest>(r#"{"email":"pm@example.org","role":"owner"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_settings_fields_are_optional() {
        let request: UpdateSettingsRequest = serde_json::from_str(r#"{"currency":"eur"}"#).unwrap();
        assert!(request.validate().is_ok());
        assert!(request.name.is_none());
        assert_eq!(
            request.currency.as_deref().map(money::normalize_currency).transpose().unwrap(),
            Some("EUR".to_string())
        );
    }
}
