//! Contribution handlers: pledging, review, payments and cancellation

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::handlers::{project_facts, tenant_actor, visible_project, PageQuery};
use crate::AppState;
use pledgehub_common::{
    auth::AuthContext,
    db::{
        models::{Contribution, Project, Tenant},
        NewContribution, Paged, Repository,
    },
    domain::{
        contribution::{check_review, schedule},
        money, ApprovalStatus, Installment, PaymentPlan,
    },
    errors::{AppError, Result},
    metrics,
    policy::{
        authorize, can_cancel_contribution, can_contribute, can_review_contribution,
        can_view_contribution, Actor, ProjectFacts,
    },
    tenancy::CurrentTenant,
};

#[derive(Debug, Deserialize)]
pub struct CreateContributionRequest {
    /// Pledge toward a specific product; its price is the minimum amount
    pub product_id: Option<Uuid>,

    /// Required without a product
    pub amount: Option<Decimal>,

    #[serde(default = "default_plan")]
    pub plan: PaymentPlan,

    /// Defaults to today
    pub first_due_on: Option<NaiveDate>,
}

fn default_plan() -> PaymentPlan {
    PaymentPlan::Full
}

#[derive(Debug, Deserialize)]
pub struct ContributionListQuery {
    pub status: Option<ApprovalStatus>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    fn target(self) -> ApprovalStatus {
        match self {
            ReviewDecision::Approve => ApprovalStatus::Approved,
            ReviewDecision::Reject => ApprovalStatus::Rejected,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PaymentRequest {
    pub amount: Decimal,

    /// Reference issued by the external payment gateway
    #[validate(length(min = 1, max = 200))]
    pub gateway_reference: Option<String>,
}

/// A contribution with its schedule and balances as of today
#[derive(Serialize)]
pub struct ContributionResponse {
    #[serde(flatten)]
    pub contribution: Contribution,
    pub schedule: Vec<Installment>,
    pub amount_owed: Decimal,
    pub amount_due: Decimal,
    pub arrears: Decimal,
    pub next_installment: Option<Installment>,
    pub settled: bool,
}

impl ContributionResponse {
    fn build(contribution: Contribution, as_of: NaiveDate) -> Result<Self> {
        let ledger = contribution.ledger()?;
        Ok(Self {
            amount_owed: ledger.amount_owed(),
            amount_due: ledger.amount_due(as_of),
            arrears: ledger.arrears(as_of),
            next_installment: ledger.next_installment().cloned(),
            settled: ledger.is_settled(),
            schedule: ledger.installments,
            contribution,
        })
    }
}

#[derive(Serialize)]
pub struct MyContribution {
    #[serde(flatten)]
    pub contribution: ContributionResponse,
    pub project_title: String,
    pub project_status: String,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Only active projects take pledges
fn ensure_accepting_contributions(facts: &ProjectFacts) -> Result<()> {
    if !facts.status.accepts_contributions() {
        return Err(AppError::guard(format!(
            "{} projects do not accept contributions",
            facts.status
        )));
    }
    Ok(())
}

/// Pick the pledged amount from the request and the chosen product's price
fn pledged_amount(requested: Option<Decimal>, product_price: Option<Decimal>) -> Result<Decimal> {
    let amount = match (requested, product_price) {
        (Some(amount), Some(price)) if amount < price => {
            return Err(AppError::invalid_field(
                "amount",
                format!("must be at least the product price of {}", price),
            ))
        }
        (Some(amount), _) => amount,
        (None, Some(price)) => price,
        (None, None) => {
            return Err(AppError::MissingField {
                field: "amount".to_string(),
            })
        }
    };
    money::ensure_positive_amount("amount", amount)
}

/// Load a contribution whose project belongs to the current tenant
async fn tenant_contribution(
    repo: &Repository,
    tenant: &Tenant,
    contribution_id: Uuid,
    actor: &Actor,
) -> Result<(Contribution, Project, ProjectFacts)> {
    let not_found = || AppError::ContributionNotFound {
        id: contribution_id.to_string(),
    };

    let contribution = repo
        .find_contribution(contribution_id)
        .await?
        .ok_or_else(not_found)?;
    let project = repo
        .find_project(tenant.id, contribution.project_id)
        .await?
        .ok_or_else(not_found)?;
    let facts = project_facts(repo, &project, actor).await?;

    if !can_view_contribution(actor, contribution.user_id, &facts) {
        return Err(not_found());
    }
    Ok((contribution, project, facts))
}

/// Pledge to an active project
pub async fn create_contribution(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
    Json(request): Json<CreateContributionRequest>,
) -> Result<(StatusCode, Json<ContributionResponse>)> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, Some(&auth), tenant.id).await?;
    let (project, facts) = visible_project(&repo, tenant.id, project_id, &actor).await?;
    ensure_accepting_contributions(&facts)?;
    authorize(can_contribute(&actor, &facts), "contribute to this project")?;

    let product_price = match request.product_id {
        Some(product_id) => {
            let product = repo
                .list_products(project.id)
                .await?
                .into_iter()
                .find(|p| p.id == product_id)
                .ok_or_else(|| AppError::invalid_field("product_id", "not a product of this project"))?;
            Some(product.price)
        }
        None => None,
    };
    let amount = pledged_amount(request.amount, product_price)?;

    let plan = request.plan;
    plan.validate(state.config.platform.max_installments)?;

    let today = today();
    let first_due_on = request.first_due_on.unwrap_or(today);
    if first_due_on < today {
        return Err(AppError::invalid_field("first_due_on", "must not be in the past"));
    }
    schedule(amount, plan, first_due_on, project.ends_on)?;

    let contribution = repo
        .create_contribution(NewContribution {
            tenant_id: tenant.id,
            project_id: project.id,
            user_id: auth.user_id,
            product_id: request.product_id,
            amount,
            platform_fee: money::platform_fee(amount, tenant.platform_fee_percent),
            plan,
            first_due_on,
        })
        .await?;

    metrics::record_contribution(&tenant.slug, plan.kind(), amount);
    tracing::info!(
        tenant_id = %tenant.id,
        project_id = %project.id,
        contribution_id = %contribution.id,
        user_id = %auth.user_id,
        amount = %amount,
        plan = plan.kind(),
        "Contribution created"
    );

    Ok((
        StatusCode::CREATED,
        Json(ContributionResponse::build(contribution, today)?),
    ))
}

/// Contributions to a project, for its managers
pub async fn list_project_contributions(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
    Query(query): Query<ContributionListQuery>,
) -> Result<Json<Paged<ContributionResponse>>> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, Some(&auth), tenant.id).await?;
    let (project, facts) = visible_project(&repo, tenant.id, project_id, &actor).await?;
    authorize(can_review_contribution(&actor, &facts), "see this project's contributions")?;

    let page = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .page();

    let today = today();
    let contributions = repo
        .list_project_contributions(project.id, query.status, page)
        .await?
        .try_map(|c| ContributionResponse::build(c, today))?;

    Ok(Json(contributions))
}

/// The caller's own contributions in this tenant
pub async fn my_contributions(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
) -> Result<Json<Vec<MyContribution>>> {
    let today = today();

    let contributions = state
        .repo()
        .list_user_contributions(tenant.id, auth.user_id)
        .await?
        .into_iter()
        .map(|(contribution, project)| {
            Ok(MyContribution {
                contribution: ContributionResponse::build(contribution, today)?,
                project_title: project.title,
                project_status: project.status,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Json(contributions))
}

pub async fn get_contribution(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
    Path(contribution_id): Path<Uuid>,
) -> Result<Json<ContributionResponse>> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, Some(&auth), tenant.id).await?;
    let (contribution, _, _) = tenant_contribution(&repo, &tenant, contribution_id, &actor).await?;

    Ok(Json(ContributionResponse::build(contribution, today())?))
}

/// Approve or reject a pending contribution
pub async fn review_contribution(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
    Path(contribution_id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<ContributionResponse>> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, Some(&auth), tenant.id).await?;
    let (contribution, project, facts) =
        tenant_contribution(&repo, &tenant, contribution_id, &actor).await?;
    authorize(can_review_contribution(&actor, &facts), "review this contribution")?;

    let from = contribution.status()?;
    let to = request.decision.target();
    check_review(from, to)?;

    let contribution = repo.set_contribution_status(contribution.id, from, to).await?;

    metrics::record_contribution_review(&tenant.slug, to.as_str());
    tracing::info!(
        tenant_id = %tenant.id,
        project_id = %project.id,
        contribution_id = %contribution.id,
        status = %to,
        reviewer_id = %auth.user_id,
        "Contribution reviewed"
    );

    Ok(Json(ContributionResponse::build(contribution, today())?))
}

/// Record money received by the payment gateway against an approved pledge
pub async fn record_payment(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
    Path(contribution_id): Path<Uuid>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<ContributionResponse>> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, Some(&auth), tenant.id).await?;
    let (contribution, project, facts) =
        tenant_contribution(&repo, &tenant, contribution_id, &actor).await?;
    authorize(can_review_contribution(&actor, &facts), "record payments")?;
    request.validate()?;

    if contribution.status()? != ApprovalStatus::Approved {
        return Err(AppError::guard("only approved contributions accept payments"));
    }

    let new_paid = contribution.ledger()?.apply_payment(request.amount)?;
    let contribution = repo
        .record_payment(
            contribution.id,
            contribution.amount_paid,
            new_paid,
            request.gateway_reference,
        )
        .await?;

    let response = ContributionResponse::build(contribution, today())?;

    metrics::record_payment(&tenant.slug, response.settled);
    tracing::info!(
        tenant_id = %tenant.id,
        project_id = %project.id,
        contribution_id = %response.contribution.id,
        amount = %request.amount,
        amount_paid = %response.contribution.amount_paid,
        recorded_by = %auth.user_id,
        "Payment recorded"
    );

    Ok(Json(response))
}

/// Withdraw a pending pledge nothing has been paid on
pub async fn cancel_contribution(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
    Path(contribution_id): Path<Uuid>,
) -> Result<Json<ContributionResponse>> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, Some(&auth), tenant.id).await?;
    let (contribution, _, _) = tenant_contribution(&repo, &tenant, contribution_id, &actor).await?;

    let status = contribution.status()?;
    authorize(
        can_cancel_contribution(
            &actor,
            contribution.user_id,
            status,
            contribution.amount_paid.is_zero(),
        ),
        "cancel this contribution",
    )?;

    let contribution = repo
        .set_contribution_status(contribution.id, status, ApprovalStatus::Cancelled)
        .await?;

    metrics::record_contribution_review(&tenant.slug, ApprovalStatus::Cancelled.as_str());
    tracing::info!(
        tenant_id = %tenant.id,
        contribution_id = %contribution.id,
        user_id = %auth.user_id,
        "Contribution cancelled"
    );

    Ok(Json(ContributionResponse::build(contribution, today())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pledgehub_common::domain::{ProjectStatus, Visibility};

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn contribution(amount: &str, paid: &str, plan: PaymentPlan, status: ApprovalStatus) -> Contribution {
        let now = Utc::now();
        Contribution {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            product_id: None,
            amount: dec(amount),
            platform_fee: Decimal::ZERO,
            payment_plan: plan.kind().to_string(),
            installment_count: plan.installment_count() as i32,
            amount_paid: dec(paid),
            first_due_on: date(2026, 1, 15),
            approval_status: status.as_str().to_string(),
            gateway_reference: None,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn test_only_active_projects_accept_contributions() {
        let facts = |status| ProjectFacts {
            manager_id: None,
            status,
            visibility: Visibility::Public,
            invited: false,
            has_contributions: false,
        };

        assert!(ensure_accepting_contributions(&facts(ProjectStatus::Active)).is_ok());
        for status in [
            ProjectStatus::Draft,
            ProjectStatus::Paused,
            ProjectStatus::Completed,
            ProjectStatus::Cancelled,
        ] {
            let err = ensure_accepting_contributions(&facts(status)).unwrap_err();
            assert!(matches!(err, AppError::GuardFailed { .. }), "{:?}", err);
            assert_eq!(err.status_code(), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn test_pledged_amount_rules() {
        assert_eq!(pledged_amount(None, Some(dec("25.00"))).unwrap(), dec("25.00"));
        assert_eq!(pledged_amount(Some(dec("40")), Some(dec("25.00"))).unwrap(), dec("40"));
        assert_eq!(pledged_amount(Some(dec("12.50")), None).unwrap(), dec("12.50"));

        assert!(pledged_amount(Some(dec("10")), Some(dec("25.00"))).is_err());
        assert!(matches!(
            pledged_amount(None, None),
            Err(AppError::MissingField { .. })
        ));
        assert!(pledged_amount(Some(dec("0")), None).is_err());
        assert!(pledged_amount(Some(dec("1.001")), None).is_err());
    }

    #[test]
    fn test_plan_defaults_to_full() {
        let request: CreateContributionRequest = serde_json::from_str(r#"{"amount":"50"}"#).unwrap();
        assert_eq!(request.plan, PaymentPlan::Full);

        let request: CreateContributionRequest = serde_json::from_str(
            r#"{"amount":"50","plan":{"kind":"installments","count":5}}"#,
        )
        .unwrap();
        assert_eq!(request.plan, PaymentPlan::Installments(5));
    }

    #[test]
    fn test_review_decisions() {
        let request: ReviewRequest = serde_json::from_str(r#"{"decision":"reject"}"#).unwrap();
        assert_eq!(request.decision.target(), ApprovalStatus::Rejected);
        assert_eq!(ReviewDecision::Approve.target(), ApprovalStatus::Approved);
        assert!(serde_json::from_str::<ReviewRequest>(r#"{"decision":"cancel"}"#).is_err());
    }

    #[test]
    fn test_response_reports_arrears() {
        let c = contribution(
            "300.00",
            "100.00",
            PaymentPlan::Installments(3),
            ApprovalStatus::Approved,
        );

        // second installment fell due on 2026-02-15 and is unpaid
        let response = ContributionResponse::build(c, date(2026, 3, 1)).unwrap();
        assert_eq!(response.schedule.len(), 3);
        assert_eq!(response.amount_owed, dec("200.00"));
        assert_eq!(response.amount_due, dec("200.00"));
        assert_eq!(response.arrears, dec("100.00"));
        assert_eq!(response.next_installment.map(|i| i.number), Some(2));
        assert!(!response.settled);
    }

    #[test]
    fn test_settled_contribution() {
        let c = contribution("80.00", "80.00", PaymentPlan::Full, ApprovalStatus::Approved);
        let response = ContributionResponse::build(c, date(2026, 1, 1)).unwrap();
        assert!(response.settled);
        assert!(response.next_installment.is_none());
        assert_eq!(response.arrears, Decimal::ZERO);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["approval_status"], "approved");
        assert_eq!(json["payment_plan"], "full");
    }
}
