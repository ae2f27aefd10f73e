//! Tenant applications filed by users who want to run an organization

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::platform_actor;
use crate::AppState;
use pledgehub_common::{
    auth::AuthContext,
    db::{models::TenantApplication, NewApplication},
    errors::{AppError, Result},
    metrics,
    policy::{authorize, can_submit_application, can_view_application},
    tenancy::validate_slug,
};

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitApplicationRequest {
    #[validate(length(min = 1, max = 200))]
    pub organization_name: String,

    pub requested_slug: String,

    #[validate(email)]
    pub contact_email: String,

    #[serde(default)]
    #[validate(length(max = 5000))]
    pub message: String,
}

/// File an application; one pending application per user
pub async fn submit_application(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<SubmitApplicationRequest>,
) -> Result<(StatusCode, Json<TenantApplication>)> {
    request.validate()?;
    let slug = validate_slug(&request.requested_slug)?;

    let repo = state.repo();
    let actor = platform_actor(&auth);

    let has_pending = repo.has_pending_application(auth.user_id).await?;
    if !can_submit_application(&actor, has_pending) {
        return Err(AppError::Conflict {
            message: "you already have an application awaiting review".to_string(),
        });
    }

    if repo.slug_taken(&slug, None).await? {
        return Err(AppError::DuplicateSlug { slug });
    }

    let application = repo
        .create_application(NewApplication {
            applicant_id: auth.user_id,
            organization_name: request.organization_name.trim().to_string(),
            requested_slug: slug,
            contact_email: request.contact_email,
            message: request.message,
        })
        .await?;

    metrics::record_application_submitted();
    tracing::info!(
        application_id = %application.id,
        applicant_id = %auth.user_id,
        slug = %application.requested_slug,
        "Tenant application submitted"
    );

    Ok((StatusCode::CREATED, Json(application)))
}

pub async fn my_applications(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<TenantApplication>>> {
    let applications = state.repo().list_applications_for(auth.user_id).await?;
    Ok(Json(applications))
}

pub async fn get_application(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(application_id): Path<Uuid>,
) -> Result<Json<TenantApplication>> {
    let application = state
        .repo()
        .find_application(application_id)
        .await?
        .ok_or_else(|| AppError::ApplicationNotFound {
            id: application_id.to_string(),
        })?;

    authorize(
        can_view_application(&platform_actor(&auth), application.applicant_id),
        "view this application",
    )?;

    Ok(Json(application))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_optional() {
        let request: SubmitApplicationRequest = serde_json::from_str(
            r#"{"organization_name":"Riverside Choir","requested_slug":"riverside","contact_email":"hello@riverside.org"}"#,
        )
        .unwrap();
        assert!(request.message.is_empty());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_contact_email_required_format() {
        let request = SubmitApplicationRequest {
            organization_name: "Riverside Choir".to_string(),
            requested_slug: "riverside".to_string(),
            contact_email: "riverside".to_string(),
            message: String::new(),
        };
        assert!(request.validate().is_err());
    }
}
