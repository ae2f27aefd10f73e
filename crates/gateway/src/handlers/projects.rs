//! Project handlers: listing, CRUD, lifecycle transitions, summary and invitations

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::handlers::{double_option, project_facts, tenant_actor, visible_project, PageQuery};
use crate::AppState;
use pledgehub_common::{
    auth::{generate_invitation_token, hash_token, AuthContext, MaybeAuth},
    db::{
        models::{Product, Project, ProjectInvitation},
        NewProject, Paged, ProjectChanges, ProjectScope, Repository,
    },
    domain::{
        money,
        project::{check_transition, ensure_date_range, ActivationCheck},
        ProjectStatus, Visibility,
    },
    errors::{AppError, Result},
    metrics,
    policy::{
        authorize, can_contribute, can_create_project, can_delete_project, can_manage_project,
        Actor, ProjectFacts, TenantRole,
    },
    tenancy::CurrentTenant,
};

#[derive(Debug, Deserialize)]
pub struct ProjectListQuery {
    pub status: Option<ProjectStatus>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[serde(default)]
    #[validate(length(max = 20000))]
    pub description: String,

    #[serde(default = "default_visibility")]
    pub visibility: Visibility,

    #[serde(default)]
    pub total_amount: Decimal,

    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,

    /// Defaults to the creating project manager
    pub manager_id: Option<Uuid>,
}

fn default_visibility() -> Visibility {
    Visibility::Public
}

/// Partial update; `null` clears a nullable field
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,

    #[validate(length(max = 20000))]
    pub description: Option<String>,

    pub visibility: Option<Visibility>,

    pub total_amount: Option<Decimal>,

    #[serde(default, deserialize_with = "double_option")]
    pub manager_id: Option<Option<Uuid>>,

    #[serde(default, deserialize_with = "double_option")]
    pub starts_on: Option<Option<NaiveDate>>,

    #[serde(default, deserialize_with = "double_option")]
    pub ends_on: Option<Option<NaiveDate>>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub to: ProjectStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InviteRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AcceptInvitationRequest {
    #[validate(length(min = 1))]
    pub token: String,
}

/// What the caller may do with a project
#[derive(Serialize)]
pub struct ProjectPermissions {
    pub can_manage: bool,
    pub can_contribute: bool,
    pub can_delete: bool,
}

#[derive(Serialize)]
pub struct ProjectResponse {
    #[serde(flatten)]
    pub project: Project,
    pub products: Vec<Product>,
    pub next_statuses: Vec<ProjectStatus>,
    pub permissions: ProjectPermissions,
}

#[derive(Serialize)]
pub struct ProjectSummary {
    pub project_id: Uuid,
    pub status: ProjectStatus,
    pub currency: String,
    pub total_amount: Decimal,
    pub pledged: Decimal,
    pub paid: Decimal,
    pub remaining: Decimal,
    pub progress_percent: Decimal,
    pub contribution_count: i64,
    pub contributor_count: i64,
}

#[derive(Serialize)]
pub struct InvitationResponse {
    #[serde(flatten)]
    pub invitation: ProjectInvitation,
    /// Shown once; only its hash is stored
    pub token: String,
}

/// Share of `total` reached by `pledged`, in percent with two decimals
fn progress_percent(pledged: Decimal, total: Decimal) -> Decimal {
    if total <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (pledged * Decimal::ONE_HUNDRED / total).round_dp(2)
}

/// Money fields are frozen once a project leaves draft
fn ensure_financials_editable(changes: &ProjectChanges, status: ProjectStatus) -> Result<()> {
    if changes.touches_financials() && !status.allows_financial_edits() {
        return Err(AppError::guard(
            "the total amount can only change while the project is a draft",
        ));
    }
    Ok(())
}

fn project_not_found(id: Uuid) -> AppError {
    AppError::ProjectNotFound { id: id.to_string() }
}

/// Projects the caller can see, newest first
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    MaybeAuth(auth): MaybeAuth,
    Query(query): Query<ProjectListQuery>,
) -> Result<Json<Paged<Project>>> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, auth.as_ref(), tenant.id).await?;

    let scope = match (&auth, actor.is_tenant_admin(), actor.is_member()) {
        (_, true, _) => ProjectScope::All,
        (Some(auth), false, true) => ProjectScope::Member {
            user_id: auth.user_id,
            manages: actor.has_role(TenantRole::ProjectManager),
        },
        (Some(auth), false, false) => ProjectScope::Visitor {
            invited: repo
                .invited_project_ids(tenant.id, auth.user_id, &auth.email)
                .await?,
        },
        (None, _, _) => ProjectScope::Visitor { invited: Vec::new() },
    };

    let page = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .page();

    let projects = repo.list_projects(tenant.id, scope, query.status, page).await?;
    Ok(Json(projects))
}

/// Create a draft project
pub async fn create_project(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>)> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, Some(&auth), tenant.id).await?;
    authorize(can_create_project(&actor), "create projects")?;
    request.validate()?;

    let total_amount = money::ensure_money_amount("total_amount", request.total_amount)?;
    ensure_date_range(request.starts_on, request.ends_on)?;

    let manager_id = if actor.is_tenant_admin() {
        match request.manager_id {
            Some(manager_id) => Some(ensure_manager(&repo, tenant.id, manager_id).await?),
            None => None,
        }
    } else {
        // project managers always manage what they create
        Some(auth.user_id)
    };

    let project = repo
        .create_project(NewProject {
            tenant_id: tenant.id,
            manager_id,
            title: request.title.trim().to_string(),
            description: request.description,
            visibility: request.visibility,
            total_amount,
            starts_on: request.starts_on,
            ends_on: request.ends_on,
        })
        .await?;

    tracing::info!(
        tenant_id = %tenant.id,
        project_id = %project.id,
        user_id = %auth.user_id,
        "Project created"
    );

    let facts = project_facts(&repo, &project, &actor).await?;
    let response = project_response(project, Vec::new(), &actor, &facts);
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_project(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    MaybeAuth(auth): MaybeAuth,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectResponse>> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, auth.as_ref(), tenant.id).await?;
    let (project, mut facts) = visible_project(&repo, tenant.id, project_id, &actor).await?;

    if actor.is_tenant_admin() && facts.status == ProjectStatus::Draft {
        facts.has_contributions = repo.project_has_contributions(project.id).await?;
    }
    let products = repo.list_products(project.id).await?;

    Ok(Json(project_response(project, products, &actor, &facts)))
}

pub async fn update_project(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
    Json(request): Json<UpdateProjectRequest>,
) -> Result<Json<ProjectResponse>> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, Some(&auth), tenant.id).await?;
    let (project, facts) = visible_project(&repo, tenant.id, project_id, &actor).await?;
    authorize(can_manage_project(&actor, &facts), "edit this project")?;
    request.validate()?;

    if facts.status.is_terminal() {
        return Err(AppError::guard(format!(
            "{} projects cannot be edited",
            facts.status
        )));
    }

    let total_amount = request
        .total_amount
        .map(|amount| money::ensure_money_amount("total_amount", amount))
        .transpose()?;

    let manager_id = match request.manager_id {
        Some(new_manager) if new_manager != project.manager_id => {
            if !actor.is_tenant_admin() {
                return Err(AppError::forbidden("only tenant admins reassign projects"));
            }
            match new_manager {
                Some(id) => Some(Some(ensure_manager(&repo, tenant.id, id).await?)),
                None => Some(None),
            }
        }
        _ => None,
    };

    let changes = ProjectChanges {
        title: request.title.map(|t| t.trim().to_string()),
        description: request.description,
        visibility: request.visibility,
        manager_id,
        total_amount,
        starts_on: request.starts_on,
        ends_on: request.ends_on,
    };

    ensure_financials_editable(&changes, facts.status)?;
    ensure_date_range(
        changes.starts_on.unwrap_or(project.starts_on),
        changes.ends_on.unwrap_or(project.ends_on),
    )?;

    let project = repo.update_project(project, changes).await?;

    tracing::info!(
        tenant_id = %tenant.id,
        project_id = %project.id,
        user_id = %auth.user_id,
        "Project updated"
    );

    let facts = project_facts(&repo, &project, &actor).await?;
    let products = repo.list_products(project.id).await?;
    Ok(Json(project_response(project, products, &actor, &facts)))
}

/// Delete a draft nobody has pledged to
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, Some(&auth), tenant.id).await?;
    let (project, mut facts) = visible_project(&repo, tenant.id, project_id, &actor).await?;

    facts.has_contributions = repo.project_has_contributions(project.id).await?;
    authorize(can_delete_project(&actor, &facts), "delete this project")?;

    if !repo.delete_project(project.id).await? {
        return Err(project_not_found(project_id));
    }

    tracing::info!(
        tenant_id = %tenant.id,
        project_id = %project_id,
        user_id = %auth.user_id,
        "Project deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Move a project through its lifecycle
pub async fn transition_project(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<ProjectResponse>> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, Some(&auth), tenant.id).await?;
    let (project, facts) = visible_project(&repo, tenant.id, project_id, &actor).await?;
    authorize(can_manage_project(&actor, &facts), "change this project's status")?;

    let from = facts.status;
    let to = request.to;
    let products = repo.list_products(project.id).await?;

    let prices: Vec<Decimal> = products.iter().map(|p| p.price).collect();
    let activation = ActivationCheck {
        total_amount: project.total_amount,
        product_prices: &prices,
        starts_on: project.starts_on,
        ends_on: project.ends_on,
    };
    check_transition(from, to, Some(&activation))?;

    let project = repo.set_project_status(project.id, from, to).await?;

    metrics::record_project_transition(from.as_str(), to.as_str());
    tracing::info!(
        tenant_id = %tenant.id,
        project_id = %project.id,
        from = %from,
        to = %to,
        user_id = %auth.user_id,
        "Project status changed"
    );

    let facts = project_facts(&repo, &project, &actor).await?;
    Ok(Json(project_response(project, products, &actor, &facts)))
}

/// Funding progress for a project
pub async fn project_summary(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    MaybeAuth(auth): MaybeAuth,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectSummary>> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, auth.as_ref(), tenant.id).await?;
    let (project, facts) = visible_project(&repo, tenant.id, project_id, &actor).await?;

    let totals = repo.project_totals(project.id).await?;

    Ok(Json(ProjectSummary {
        project_id: project.id,
        status: facts.status,
        currency: tenant.currency,
        total_amount: project.total_amount,
        remaining: (project.total_amount - totals.pledged).max(Decimal::ZERO),
        progress_percent: progress_percent(totals.pledged, project.total_amount),
        pledged: totals.pledged,
        paid: totals.paid,
        contribution_count: totals.contribution_count,
        contributor_count: totals.contributor_count,
    }))
}

/// Invite someone by email; the response carries the token to send them
pub async fn invite(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
    Json(request): Json<InviteRequest>,
) -> Result<(StatusCode, Json<InvitationResponse>)> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, Some(&auth), tenant.id).await?;
    let (project, facts) = visible_project(&repo, tenant.id, project_id, &actor).await?;
    authorize(can_manage_project(&actor, &facts), "invite people to this project")?;
    request.validate()?;

    if facts.status.is_terminal() {
        return Err(AppError::guard(format!(
            "{} projects take no invitations",
            facts.status
        )));
    }

    let token = generate_invitation_token();
    let invitation = repo
        .create_invitation(project.id, &request.email, hash_token(&token), auth.user_id)
        .await?;

    tracing::info!(
        tenant_id = %tenant.id,
        project_id = %project.id,
        invitation_id = %invitation.id,
        invited_by = %auth.user_id,
        "Project invitation created"
    );

    Ok((StatusCode::CREATED, Json(InvitationResponse { invitation, token })))
}

/// Redeem an invitation token for the signed-in user
pub async fn accept_invitation(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
    Json(request): Json<AcceptInvitationRequest>,
) -> Result<Json<ProjectInvitation>> {
    request.validate()?;
    let repo = state.repo();

    let not_found = || AppError::NotFound {
        resource_type: "invitation".to_string(),
        id: "token".to_string(),
    };

    let invitation = repo
        .find_invitation_by_token(&hash_token(request.token.trim()))
        .await?
        .ok_or_else(not_found)?;

    // tokens from another tenant's projects do not exist here
    if repo.find_project(tenant.id, invitation.project_id).await?.is_none() {
        return Err(not_found());
    }

    let invitation = repo.accept_invitation(invitation, auth.user_id).await?;

    tracing::info!(
        tenant_id = %tenant.id,
        project_id = %invitation.project_id,
        user_id = %auth.user_id,
        "Project invitation accepted"
    );

    Ok(Json(invitation))
}

/// A project manager assignment must name someone holding that role here
async fn ensure_manager(repo: &Repository, tenant_id: Uuid, user_id: Uuid) -> Result<Uuid> {
    let roles = repo.roles_for(user_id, tenant_id).await?;
    if !roles.contains(&TenantRole::ProjectManager) {
        return Err(AppError::invalid_field(
            "manager_id",
            "the manager must hold the project_manager role in this tenant",
        ));
    }
    Ok(user_id)
}

fn project_response(
    project: Project,
    products: Vec<Product>,
    actor: &Actor,
    facts: &ProjectFacts,
) -> ProjectResponse {
    let can_manage = can_manage_project(actor, facts);
    let next_statuses = if can_manage {
        facts.status.next_statuses().to_vec()
    } else {
        Vec::new()
    };

    ProjectResponse {
        project,
        products,
        next_statuses,
        permissions: ProjectPermissions {
            can_manage,
            can_contribute: can_contribute(actor, facts),
            can_delete: can_delete_project(actor, facts),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent() {
        assert_eq!(
            progress_percent(Decimal::new(2500, 2), Decimal::new(10000, 2)),
            Decimal::new(25, 0)
        );
        assert_eq!(progress_percent(Decimal::ONE, Decimal::ZERO), Decimal::ZERO);
        // over-funded projects report more than 100
        assert_eq!(
            progress_percent(Decimal::new(150, 0), Decimal::new(100, 0)),
            Decimal::new(150, 0)
        );
        assert_eq!(
            progress_percent(Decimal::ONE, Decimal::new(3, 0)),
            Decimal::new(3333, 2)
        );
    }

    #[test]
    fn test_create_request_defaults() {
        let request: CreateProjectRequest =
            serde_json::from_str(r#"{"title":"New organ"}"#).unwrap();
        assert_eq!(request.visibility, Visibility::Public);
        assert_eq!(request.total_amount, Decimal::ZERO);
        assert!(request.manager_id.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_update_request_can_clear_dates() {
        let request: UpdateProjectRequest =
            serde_json::from_str(r#"{"ends_on":null,"visibility":"invite_only"}"#).unwrap();
        assert_eq!(request.ends_on, Some(None));
        assert_eq!(request.starts_on, None);
        assert_eq!(request.visibility, Some(Visibility::InviteOnly));
    }

    #[test]
    fn test_financial_edits_only_in_draft() {
        let total_change = ProjectChanges {
            total_amount: Some(Decimal::new(250_000, 2)),
            ..Default::default()
        };
        let title_change = ProjectChanges {
            title: Some("Bell tower".to_string()),
            ..Default::default()
        };

        assert!(ensure_financials_editable(&total_change, ProjectStatus::Draft).is_ok());
        for status in [ProjectStatus::Active, ProjectStatus::Paused] {
            let err = ensure_financials_editable(&total_change, status).unwrap_err();
            assert!(matches!(err, AppError::GuardFailed { .. }), "{:?}", err);
            assert_eq!(err.status_code(), StatusCode::CONFLICT);
            assert!(ensure_financials_editable(&title_change, status).is_ok());
        }
    }

    #[test]
    fn test_update_request_rejects_sub_cent_total() {
        let request: UpdateProjectRequest =
            serde_json::from_str(r#"{"total_amount":"1200.999"}"#).unwrap();
        let checked = request
            .total_amount
            .map(|amount| money::ensure_money_amount("total_amount", amount))
            .transpose();
        assert!(checked.is_err());
    }

    #[test]
    fn test_transition_request_parses_status() {
        let request: TransitionRequest = serde_json::from_str(r#"{"to":"active"}"#).unwrap();
        assert_eq!(request.to, ProjectStatus::Active);
        assert!(serde_json::from_str::<TransitionRequest>(r#"{"to":"archived"}"#).is_err());
    }

    #[test]
    fn test_response_hides_transitions_from_visitors() {
        let project_facts = ProjectFacts {
            manager_id: None,
            status: ProjectStatus::Active,
            visibility: Visibility::Public,
            invited: false,
            has_contributions: false,
        };
        let now = chrono::Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            manager_id: None,
            title: "Roof repair".to_string(),
            description: String::new(),
            status: "active".to_string(),
            visibility: "public".to_string(),
            total_amount: Decimal::new(1000, 0),
            starts_on: None,
            ends_on: None,
            created_at: now.into(),
            updated_at: now.into(),
        };

        let response =
            project_response(project, Vec::new(), &Actor::anonymous(), &project_facts);
        assert!(response.next_statuses.is_empty());
        assert!(!response.permissions.can_manage);
        assert!(!response.permissions.can_contribute);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["title"], "Roof repair");
        assert_eq!(json["status"], "active");
    }
}
