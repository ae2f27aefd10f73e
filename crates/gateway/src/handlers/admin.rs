//! Platform administration: application review, tenant oversight, fees

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::handlers::{platform_actor, PageQuery};
use crate::AppState;
use pledgehub_common::{
    auth::AuthContext,
    db::{
        models::{Tenant, TenantApplication},
        Paged, PlatformStats, TenantDefaults,
    },
    domain::{application::check_decision, money, ApplicationStatus, Decision},
    errors::{AppError, Result},
    metrics,
    policy::{authorize, can_administer_platform, can_review_application},
    tenancy::TenantStatus,
};

#[derive(Debug, Deserialize)]
pub struct ApplicationListQuery {
    pub status: Option<ApplicationStatus>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectRequest {
    #[validate(length(min = 1, max = 2000))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct FeeRequest {
    pub platform_fee_percent: Decimal,
}

#[derive(Serialize)]
pub struct ApprovalResponse {
    pub application: TenantApplication,
    pub tenant: Tenant,
}

fn require_admin(auth: &AuthContext) -> Result<()> {
    authorize(
        can_administer_platform(&platform_actor(auth)),
        "administer the platform",
    )
}

/// Applications for review, filtered by status
pub async fn list_applications(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ApplicationListQuery>,
) -> Result<Json<Paged<TenantApplication>>> {
    authorize(
        can_review_application(&platform_actor(&auth)),
        "review tenant applications",
    )?;

    let page = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .page();

    let applications = state.repo().list_applications(query.status, page).await?;
    Ok(Json(applications))
}

/// Approve: creates the tenant and makes the applicant its admin
pub async fn approve_application(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(application_id): Path<Uuid>,
) -> Result<Json<ApprovalResponse>> {
    authorize(
        can_review_application(&platform_actor(&auth)),
        "review tenant applications",
    )?;

    let repo = state.repo();
    let application = repo
        .find_application(application_id)
        .await?
        .ok_or_else(|| AppError::ApplicationNotFound {
            id: application_id.to_string(),
        })?;

    check_decision(application.application_status()?, &Decision::Approve)?;

    let defaults = TenantDefaults {
        fee_percent: state.config.platform.default_fee_percent,
        currency: money::normalize_currency(&state.config.platform.default_currency)?,
    };
    let (application, tenant) = repo
        .approve_application(application, auth.user_id, defaults)
        .await?;

    metrics::record_application_review("approved");
    tracing::info!(
        application_id = %application.id,
        tenant_id = %tenant.id,
        slug = %tenant.slug,
        reviewer_id = %auth.user_id,
        "Tenant application approved"
    );

    Ok(Json(ApprovalResponse {
        application,
        tenant,
    }))
}

pub async fn reject_application(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(application_id): Path<Uuid>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<TenantApplication>> {
    authorize(
        can_review_application(&platform_actor(&auth)),
        "review tenant applications",
    )?;
    request.validate()?;

    let repo = state.repo();
    let application = repo
        .find_application(application_id)
        .await?
        .ok_or_else(|| AppError::ApplicationNotFound {
            id: application_id.to_string(),
        })?;

    let reason = request.reason.trim().to_string();
    check_decision(
        application.application_status()?,
        &Decision::Reject {
            reason: reason.clone(),
        },
    )?;

    let application = repo
        .reject_application(application_id, auth.user_id, reason)
        .await?;

    metrics::record_application_review("rejected");
    tracing::info!(
        application_id = %application.id,
        reviewer_id = %auth.user_id,
        "Tenant application rejected"
    );

    Ok(Json(application))
}

pub async fn list_tenants(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paged<Tenant>>> {
    require_admin(&auth)?;
    let tenants = state.repo().list_tenants(query.page()).await?;
    Ok(Json(tenants))
}

pub async fn suspend_tenant(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<Tenant>> {
    change_tenant_status(state, auth, tenant_id, TenantStatus::Suspended).await
}

pub async fn reactivate_tenant(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<Tenant>> {
    change_tenant_status(state, auth, tenant_id, TenantStatus::Active).await
}

async fn change_tenant_status(
    state: AppState,
    auth: AuthContext,
    tenant_id: Uuid,
    status: TenantStatus,
) -> Result<Json<Tenant>> {
    require_admin(&auth)?;

    let tenant = state.repo().set_tenant_status(tenant_id, status).await?;

    tracing::info!(
        tenant_id = %tenant.id,
        status = %status,
        admin_id = %auth.user_id,
        "Tenant status changed"
    );

    Ok(Json(tenant))
}

/// Set the platform fee charged on the tenant's future contributions
pub async fn set_tenant_fee(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<FeeRequest>,
) -> Result<Json<Tenant>> {
    require_admin(&auth)?;
    let percent = money::ensure_fee_percent(request.platform_fee_percent)?;

    let tenant = state.repo().set_tenant_fee(tenant_id, percent).await?;

    tracing::info!(
        tenant_id = %tenant.id,
        platform_fee_percent = %percent,
        admin_id = %auth.user_id,
        "Tenant fee changed"
    );

    Ok(Json(tenant))
}

pub async fn platform_stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<PlatformStats>> {
    require_admin(&auth)?;
    Ok(Json(state.repo().platform_stats().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_request_accepts_numbers_and_strings() {
        let request: FeeRequest = serde_json::from_str(r#"{"platform_fee_percent": 7.5}"#).unwrap();
        assert_eq!(request.platform_fee_percent, Decimal::new(75, 1));

        let request: FeeRequest = serde_json::from_str(r#"{"platform_fee_percent": "2.25"}"#).unwrap();
        assert_eq!(request.platform_fee_percent, Decimal::new(225, 2));
    }

    #[test]
    fn test_reject_needs_reason() {
        let request = RejectRequest {
            reason: String::new(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_non_admins_are_refused() {
        let auth = AuthContext {
            user_id: Uuid::new_v4(),
            email: "tenant-admin@example.org".to_string(),
            is_system_admin: false,
        };
        let err = require_admin(&auth).unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }
}
