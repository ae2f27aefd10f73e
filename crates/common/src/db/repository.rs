//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling and transaction support.

use crate::auth::normalize_email;
use crate::db::models::*;
use crate::db::{DbPool, Page, Paged};
use crate::domain::{ApplicationStatus, ApprovalStatus, PaymentPlan, ProjectStatus, Visibility};
use crate::errors::{AppError, Result};
use crate::policy::TenantRole;
use crate::tenancy::TenantStatus;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, DbBackend, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QueryResult, QuerySelect, Select, Set, Statement, TransactionTrait, UpdateMany,
};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Fields for a new project
#[derive(Debug, Clone)]
pub struct NewProject {
    pub tenant_id: Uuid,
    pub manager_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub visibility: Visibility,
    pub total_amount: Decimal,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
}

/// Partial project update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct ProjectChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
    pub manager_id: Option<Option<Uuid>>,
    pub total_amount: Option<Decimal>,
    pub starts_on: Option<Option<NaiveDate>>,
    pub ends_on: Option<Option<NaiveDate>>,
}

impl ProjectChanges {
    pub fn touches_financials(&self) -> bool {
        self.total_amount.is_some()
    }
}

/// Fields for a product; position in the list becomes the sort order
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub image_url: Option<String>,
}

/// Fields for a new contribution, already validated and priced
#[derive(Debug, Clone)]
pub struct NewContribution {
    /// Tenant owning the project; the backer joins it as a contributor
    pub tenant_id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub product_id: Option<Uuid>,
    pub amount: Decimal,
    pub platform_fee: Decimal,
    pub plan: PaymentPlan,
    pub first_due_on: NaiveDate,
}

/// Fields for a new tenant application
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub applicant_id: Uuid,
    pub organization_name: String,
    pub requested_slug: String,
    pub contact_email: String,
    pub message: String,
}

/// Platform defaults stamped onto tenants created from applications
#[derive(Debug, Clone)]
pub struct TenantDefaults {
    pub fee_percent: Decimal,
    pub currency: String,
}

/// Tenant settings a tenant admin may change
#[derive(Debug, Clone, Default)]
pub struct TenantSettings {
    pub name: Option<String>,
    pub contact_email: Option<String>,
    pub currency: Option<String>,
}

/// Which projects a caller may list
#[derive(Debug, Clone)]
pub enum ProjectScope {
    /// Tenant and system admins
    All,
    /// Tenant members; drafts only when `manages` and assigned to `user_id`
    Member { user_id: Uuid, manages: bool },
    /// Everyone else; public projects plus accepted invitations
    Visitor { invited: Vec<Uuid> },
}

/// Money and head counts for one project
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ProjectTotals {
    pub pledged: Decimal,
    pub paid: Decimal,
    pub contribution_count: i64,
    pub contributor_count: i64,
}

/// Cross-tenant counts for the admin dashboard
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlatformStats {
    pub tenants_active: u64,
    pub tenants_suspended: u64,
    pub applications_pending: u64,
    pub users: u64,
    pub projects_by_status: BTreeMap<String, u64>,
    pub total_pledged: Decimal,
    pub total_fees: Decimal,
}

/// Repository for data access operations
#[derive(Clone, Debug)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Tenant Operations
    // ========================================================================

    /// Find tenant by ID
    pub async fn find_tenant_by_id(&self, id: Uuid) -> Result<Option<Tenant>> {
        TenantEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find tenant by slug
    pub async fn find_tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>> {
        TenantEntity::find()
            .filter(TenantColumn::Slug.eq(slug))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// A slug is taken by a tenant or by another pending application
    pub async fn slug_taken(&self, slug: &str, ignore_application: Option<Uuid>) -> Result<bool> {
        if self.find_tenant_by_slug(slug).await?.is_some() {
            return Ok(true);
        }

        let mut query = TenantApplicationEntity::find()
            .filter(TenantApplicationColumn::RequestedSlug.eq(slug))
            .filter(TenantApplicationColumn::Status.eq(ApplicationStatus::Pending.as_str()));
        if let Some(id) = ignore_application {
            query = query.filter(TenantApplicationColumn::Id.ne(id));
        }

        Ok(query.count(self.read_conn()).await? > 0)
    }

    /// List tenants, newest first
    pub async fn list_tenants(&self, page: Page) -> Result<Paged<Tenant>> {
        let paginator = TenantEntity::find()
            .order_by_desc(TenantColumn::CreatedAt)
            .paginate(self.read_conn(), page.per_page);

        let total = paginator.num_items().await?;
        let tenants = paginator.fetch_page(page.index()).await?;

        Ok(Paged::new(tenants, page, total))
    }

    /// Update tenant settings
    pub async fn update_tenant_settings(
        &self,
        tenant_id: Uuid,
        settings: TenantSettings,
    ) -> Result<Tenant> {
        let mut tenant: TenantActiveModel = self.require_tenant(tenant_id).await?.into();

        if let Some(name) = settings.name {
            tenant.name = Set(name);
        }
        if let Some(email) = settings.contact_email {
            tenant.contact_email = Set(normalize_email(&email));
        }
        if let Some(currency) = settings.currency {
            tenant.currency = Set(currency);
        }
        tenant.updated_at = Set(Utc::now().into());

        tenant.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Suspend or reactivate a tenant
    pub async fn set_tenant_status(&self, tenant_id: Uuid, status: TenantStatus) -> Result<Tenant> {
        let mut tenant: TenantActiveModel = self.require_tenant(tenant_id).await?.into();
        tenant.status = Set(status.as_str().to_string());
        tenant.updated_at = Set(Utc::now().into());

        tenant.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Change the platform fee charged to a tenant
    pub async fn set_tenant_fee(&self, tenant_id: Uuid, percent: Decimal) -> Result<Tenant> {
        let mut tenant: TenantActiveModel = self.require_tenant(tenant_id).await?.into();
        tenant.platform_fee_percent = Set(percent);
        tenant.updated_at = Set(Utc::now().into());

        tenant.update(self.write_conn()).await.map_err(Into::into)
    }

    async fn require_tenant(&self, tenant_id: Uuid) -> Result<Tenant> {
        TenantEntity::find_by_id(tenant_id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource_type: "tenant".to_string(),
                id: tenant_id.to_string(),
            })
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    /// Register a user; emails are unique case-insensitively
    pub async fn create_user(
        &self,
        name: String,
        email: &str,
        password_hash: String,
        is_system_admin: bool,
    ) -> Result<User> {
        let email = normalize_email(email);
        if self.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::DuplicateEmail { email });
        }

        let now = Utc::now();
        let user = UserActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            email: Set(email),
            password_hash: Set(password_hash),
            is_system_admin: Set(is_system_admin),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        user.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find user by email
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Email.eq(normalize_email(email)))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find user by ID
    pub async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Role Operations
    // ========================================================================

    /// Roles a user holds in a tenant
    pub async fn roles_for(&self, user_id: Uuid, tenant_id: Uuid) -> Result<Vec<TenantRole>> {
        let rows = UserTenantRoleEntity::find()
            .filter(UserTenantRoleColumn::UserId.eq(user_id))
            .filter(UserTenantRoleColumn::TenantId.eq(tenant_id))
            .all(self.read_conn())
            .await?;

        rows.iter().map(UserTenantRole::tenant_role).collect()
    }

    /// Grant a role; granting an existing role is a no-op
    pub async fn assign_role(&self, user_id: Uuid, tenant_id: Uuid, role: TenantRole) -> Result<()> {
        assign_role_on(self.write_conn(), user_id, tenant_id, role).await
    }

    /// Revoke a role, returning whether anything was removed.
    ///
    /// Revocations in one tenant are serialized on the tenant row so the last
    /// tenant admin can never be removed, even by concurrent requests.
    pub async fn revoke_role(&self, user_id: Uuid, tenant_id: Uuid, role: TenantRole) -> Result<bool> {
        let txn = self.write_conn().begin().await?;

        TenantEntity::find_by_id(tenant_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource_type: "tenant".to_string(),
                id: tenant_id.to_string(),
            })?;

        let assignments = UserTenantRoleEntity::find()
            .filter(UserTenantRoleColumn::TenantId.eq(tenant_id))
            .filter(UserTenantRoleColumn::Role.eq(role.as_str()))
            .all(&txn)
            .await?;
        let holds_role = assignments.iter().any(|a| a.user_id == user_id);
        if !holds_role {
            return Ok(false);
        }
        if role == TenantRole::TenantAdmin && assignments.len() <= 1 {
            return Err(AppError::guard("a tenant needs at least one tenant admin"));
        }

        UserTenantRoleEntity::delete_many()
            .filter(UserTenantRoleColumn::UserId.eq(user_id))
            .filter(UserTenantRoleColumn::TenantId.eq(tenant_id))
            .filter(UserTenantRoleColumn::Role.eq(role.as_str()))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        Ok(true)
    }

    /// Every tenant a user belongs to, with the roles held there
    pub async fn memberships(&self, user_id: Uuid) -> Result<Vec<(Tenant, Vec<TenantRole>)>> {
        let rows = UserTenantRoleEntity::find()
            .filter(UserTenantRoleColumn::UserId.eq(user_id))
            .find_also_related(TenantEntity)
            .all(self.read_conn())
            .await?;

        let mut tenants: BTreeMap<Uuid, (Tenant, Vec<TenantRole>)> = BTreeMap::new();
        for (assignment, tenant) in rows {
            let Some(tenant) = tenant else { continue };
            let role = assignment.tenant_role()?;
            tenants
                .entry(tenant.id)
                .or_insert_with(|| (tenant, Vec::new()))
                .1
                .push(role);
        }

        let mut tenants: Vec<_> = tenants.into_values().collect();
        tenants.sort_by(|a, b| a.0.slug.cmp(&b.0.slug));
        Ok(tenants)
    }

    /// Members of a tenant with their roles, ordered by name
    pub async fn list_members(&self, tenant_id: Uuid) -> Result<Vec<(User, Vec<TenantRole>)>> {
        let rows = UserTenantRoleEntity::find()
            .filter(UserTenantRoleColumn::TenantId.eq(tenant_id))
            .find_also_related(UserEntity)
            .all(self.read_conn())
            .await?;

        let mut members: BTreeMap<Uuid, (User, Vec<TenantRole>)> = BTreeMap::new();
        for (assignment, user) in rows {
            let Some(user) = user else { continue };
            let role = assignment.tenant_role()?;
            members
                .entry(user.id)
                .or_insert_with(|| (user, Vec::new()))
                .1
                .push(role);
        }

        let mut members: Vec<_> = members.into_values().collect();
        members.sort_by(|a, b| a.0.name.cmp(&b.0.name));
        Ok(members)
    }

    // ========================================================================
    // Project Operations
    // ========================================================================

    /// Create a project in draft
    pub async fn create_project(&self, input: NewProject) -> Result<Project> {
        let now = Utc::now();

        let project = ProjectActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(input.tenant_id),
            manager_id: Set(input.manager_id),
            title: Set(input.title),
            description: Set(input.description),
            status: Set(ProjectStatus::Draft.as_str().to_string()),
            visibility: Set(input.visibility.as_str().to_string()),
            total_amount: Set(input.total_amount),
            starts_on: Set(input.starts_on),
            ends_on: Set(input.ends_on),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        project.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find a project inside a tenant; other tenants' projects are invisible
    pub async fn find_project(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Project>> {
        ProjectEntity::find_by_id(id)
            .filter(ProjectColumn::TenantId.eq(tenant_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List a tenant's projects visible within `scope`
    pub async fn list_projects(
        &self,
        tenant_id: Uuid,
        scope: ProjectScope,
        status: Option<ProjectStatus>,
        page: Page,
    ) -> Result<Paged<Project>> {
        let not_draft = ProjectColumn::Status.ne(ProjectStatus::Draft.as_str());

        let visible = match scope {
            ProjectScope::All => Condition::all(),
            ProjectScope::Member { user_id, manages } => {
                let mut any = Condition::any().add(not_draft);
                if manages {
                    any = any.add(ProjectColumn::ManagerId.eq(user_id));
                }
                any
            }
            ProjectScope::Visitor { invited } => {
                let mut reachable = Condition::any()
                    .add(ProjectColumn::Visibility.eq(Visibility::Public.as_str()));
                if !invited.is_empty() {
                    reachable = reachable.add(
                        Condition::all()
                            .add(ProjectColumn::Visibility.eq(Visibility::InviteOnly.as_str()))
                            .add(ProjectColumn::Id.is_in(invited)),
                    );
                }
                Condition::all().add(not_draft).add(reachable)
            }
        };

        let mut query = ProjectEntity::find()
            .filter(ProjectColumn::TenantId.eq(tenant_id))
            .filter(visible);
        if let Some(status) = status {
            query = query.filter(ProjectColumn::Status.eq(status.as_str()));
        }

        let paginator = query
            .order_by_desc(ProjectColumn::CreatedAt)
            .paginate(self.read_conn(), page.per_page);

        let total = paginator.num_items().await?;
        let projects = paginator.fetch_page(page.index()).await?;

        Ok(Paged::new(projects, page, total))
    }

    /// Apply a partial update, only while the project still has the status it was read with
    pub async fn update_project(&self, project: Project, changes: ProjectChanges) -> Result<Project> {
        let result = project_update(project.id, &project.status, changes)
            .exec(self.write_conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::Conflict {
                message: format!("project {} changed status concurrently", project.id),
            });
        }

        ProjectEntity::find_by_id(project.id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::ProjectNotFound {
                id: project.id.to_string(),
            })
    }

    /// Move a project to `to`, only if it is still in `from`
    pub async fn set_project_status(
        &self,
        project_id: Uuid,
        from: ProjectStatus,
        to: ProjectStatus,
    ) -> Result<Project> {
        let result = ProjectEntity::update_many()
            .col_expr(ProjectColumn::Status, Expr::value(to.as_str()))
            .col_expr(
                ProjectColumn::UpdatedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(ProjectColumn::Id.eq(project_id))
            .filter(ProjectColumn::Status.eq(from.as_str()))
            .exec(self.write_conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::Conflict {
                message: format!("project {} changed status concurrently", project_id),
            });
        }

        ProjectEntity::find_by_id(project_id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::ProjectNotFound {
                id: project_id.to_string(),
            })
    }

    /// Delete a project together with its products and invitations
    pub async fn delete_project(&self, project_id: Uuid) -> Result<bool> {
        let txn = self.write_conn().begin().await?;

        ProductEntity::delete_many()
            .filter(ProductColumn::ProjectId.eq(project_id))
            .exec(&txn)
            .await?;
        ProjectInvitationEntity::delete_many()
            .filter(ProjectInvitationColumn::ProjectId.eq(project_id))
            .exec(&txn)
            .await?;
        let result = ProjectEntity::delete_by_id(project_id).exec(&txn).await?;

        txn.commit().await?;
        Ok(result.rows_affected > 0)
    }

    /// Whether anyone has pledged to a project, whatever the status
    pub async fn project_has_contributions(&self, project_id: Uuid) -> Result<bool> {
        let count = ContributionEntity::find()
            .filter(ContributionColumn::ProjectId.eq(project_id))
            .count(self.read_conn())
            .await?;
        Ok(count > 0)
    }

    /// Pledged and paid totals over live contributions
    pub async fn project_totals(&self, project_id: Uuid) -> Result<ProjectTotals> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                COALESCE(SUM(amount), 0) AS pledged,
                COALESCE(SUM(amount_paid), 0) AS paid,
                COUNT(*) AS contribution_count,
                COUNT(DISTINCT user_id) AS contributor_count
            FROM contributions
            WHERE project_id = $1
              AND approval_status IN ($2, $3)
            "#,
            vec![
                project_id.into(),
                ApprovalStatus::Pending.as_str().into(),
                ApprovalStatus::Approved.as_str().into(),
            ],
        );

        let row = self.read_conn().query_one(stmt).await?;
        row.map(|row| totals_from_row(&row))
            .transpose()
            .map(Option::unwrap_or_default)
    }

    // ========================================================================
    // Product Operations
    // ========================================================================

    /// Products of a project in display order
    pub async fn list_products(&self, project_id: Uuid) -> Result<Vec<Product>> {
        ProductEntity::find()
            .filter(ProductColumn::ProjectId.eq(project_id))
            .order_by_asc(ProductColumn::SortOrder)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Replace the whole product list atomically
    pub async fn replace_products(
        &self,
        project_id: Uuid,
        products: Vec<NewProduct>,
    ) -> Result<Vec<Product>> {
        let now = Utc::now();
        let txn = self.write_conn().begin().await?;

        // products are only editable in draft; hold the row so activation waits
        let status = locked_project(project_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::ProjectNotFound {
                id: project_id.to_string(),
            })?
            .project_status()?;
        if !status.allows_financial_edits() {
            return Err(AppError::guard(
                "products can only change while the project is a draft",
            ));
        }

        ProductEntity::delete_many()
            .filter(ProductColumn::ProjectId.eq(project_id))
            .exec(&txn)
            .await?;

        let mut saved = Vec::with_capacity(products.len());
        for (position, product) in products.into_iter().enumerate() {
            let sort_order = i32::try_from(position).map_err(|_| {
                AppError::invalid_field("products", "too many products")
            })?;
            let model = ProductActiveModel {
                id: Set(Uuid::new_v4()),
                project_id: Set(project_id),
                name: Set(product.name),
                description: Set(product.description),
                price: Set(product.price),
                sort_order: Set(sort_order),
                image_url: Set(product.image_url),
                created_at: Set(now.into()),
            };
            saved.push(model.insert(&txn).await?);
        }

        txn.commit().await?;
        Ok(saved)
    }

    // ========================================================================
    // Invitation Operations
    // ========================================================================

    /// Record an invitation; re-inviting the same email is a conflict
    pub async fn create_invitation(
        &self,
        project_id: Uuid,
        email: &str,
        token_hash: String,
        invited_by: Uuid,
    ) -> Result<ProjectInvitation> {
        let email = normalize_email(email);
        let existing = ProjectInvitationEntity::find()
            .filter(ProjectInvitationColumn::ProjectId.eq(project_id))
            .filter(ProjectInvitationColumn::Email.eq(email.as_str()))
            .count(self.read_conn())
            .await?;
        if existing > 0 {
            return Err(AppError::Conflict {
                message: format!("{} is already invited", email),
            });
        }

        let invitation = ProjectInvitationActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(project_id),
            email: Set(email),
            token_hash: Set(token_hash),
            invited_by: Set(invited_by),
            accepted_by: Set(None),
            accepted_at: Set(None),
            created_at: Set(Utc::now().into()),
        };

        invitation.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Look an invitation up by the hash of its token
    pub async fn find_invitation_by_token(&self, token_hash: &str) -> Result<Option<ProjectInvitation>> {
        ProjectInvitationEntity::find()
            .filter(ProjectInvitationColumn::TokenHash.eq(token_hash))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Bind an invitation to the user redeeming it; redeeming twice is a no-op
    pub async fn accept_invitation(
        &self,
        invitation: ProjectInvitation,
        user_id: Uuid,
    ) -> Result<ProjectInvitation> {
        match invitation.accepted_by {
            Some(owner) if owner == user_id => return Ok(invitation),
            Some(_) => {
                return Err(AppError::Conflict {
                    message: "invitation already used".to_string(),
                })
            }
            None => {}
        }

        let result = ProjectInvitationEntity::update_many()
            .col_expr(ProjectInvitationColumn::AcceptedBy, Expr::value(user_id))
            .col_expr(
                ProjectInvitationColumn::AcceptedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(ProjectInvitationColumn::Id.eq(invitation.id))
            .filter(ProjectInvitationColumn::AcceptedBy.is_null())
            .exec(self.write_conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::Conflict {
                message: "invitation already used".to_string(),
            });
        }

        ProjectInvitationEntity::find_by_id(invitation.id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource_type: "invitation".to_string(),
                id: invitation.id.to_string(),
            })
    }

    /// Invited by email or through an accepted token
    pub async fn is_invited(&self, project_id: Uuid, user_id: Uuid, email: &str) -> Result<bool> {
        let count = ProjectInvitationEntity::find()
            .filter(ProjectInvitationColumn::ProjectId.eq(project_id))
            .filter(invitee_condition(user_id, email))
            .count(self.read_conn())
            .await?;
        Ok(count > 0)
    }

    /// Invite-only projects of a tenant the user was invited to
    pub async fn invited_project_ids(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        email: &str,
    ) -> Result<Vec<Uuid>> {
        let rows = ProjectInvitationEntity::find()
            .inner_join(ProjectEntity)
            .filter(ProjectColumn::TenantId.eq(tenant_id))
            .filter(invitee_condition(user_id, email))
            .all(self.read_conn())
            .await?;

        Ok(rows.into_iter().map(|i| i.project_id).collect())
    }

    // ========================================================================
    // Contribution Operations
    // ========================================================================

    /// Create a pending contribution and grant its backer the contributor role
    pub async fn create_contribution(&self, input: NewContribution) -> Result<Contribution> {
        let now = Utc::now();
        let installment_count = i32::try_from(input.plan.installment_count())
            .map_err(|_| AppError::invalid_field("installment_count", "out of range"))?;

        let contribution = ContributionActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(input.project_id),
            user_id: Set(input.user_id),
            product_id: Set(input.product_id),
            amount: Set(input.amount),
            platform_fee: Set(input.platform_fee),
            payment_plan: Set(input.plan.kind().to_string()),
            installment_count: Set(installment_count),
            amount_paid: Set(Decimal::ZERO),
            first_due_on: Set(input.first_due_on),
            approval_status: Set(ApprovalStatus::Pending.as_str().to_string()),
            gateway_reference: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let txn = self.write_conn().begin().await?;
        let contribution = contribution.insert(&txn).await?;
        assign_role_on(&txn, input.user_id, input.tenant_id, TenantRole::Contributor).await?;
        txn.commit().await?;

        Ok(contribution)
    }

    /// Find a contribution by ID
    pub async fn find_contribution(&self, id: Uuid) -> Result<Option<Contribution>> {
        ContributionEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Contributions to a project, newest first
    pub async fn list_project_contributions(
        &self,
        project_id: Uuid,
        status: Option<ApprovalStatus>,
        page: Page,
    ) -> Result<Paged<Contribution>> {
        let mut query = ContributionEntity::find()
            .filter(ContributionColumn::ProjectId.eq(project_id));
        if let Some(status) = status {
            query = query.filter(ContributionColumn::ApprovalStatus.eq(status.as_str()));
        }

        let paginator = query
            .order_by_desc(ContributionColumn::CreatedAt)
            .paginate(self.read_conn(), page.per_page);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.index()).await?;

        Ok(Paged::new(items, page, total))
    }

    /// A user's contributions across one tenant's projects
    pub async fn list_user_contributions(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<(Contribution, Project)>> {
        let rows = ContributionEntity::find()
            .filter(ContributionColumn::UserId.eq(user_id))
            .find_also_related(ProjectEntity)
            .filter(ProjectColumn::TenantId.eq(tenant_id))
            .order_by_desc(ContributionColumn::CreatedAt)
            .all(self.read_conn())
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(contribution, project)| project.map(|p| (contribution, p)))
            .collect())
    }

    /// Move a contribution out of `from`
    pub async fn set_contribution_status(
        &self,
        contribution_id: Uuid,
        from: ApprovalStatus,
        to: ApprovalStatus,
    ) -> Result<Contribution> {
        let result = ContributionEntity::update_many()
            .col_expr(ContributionColumn::ApprovalStatus, Expr::value(to.as_str()))
            .col_expr(
                ContributionColumn::UpdatedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(ContributionColumn::Id.eq(contribution_id))
            .filter(ContributionColumn::ApprovalStatus.eq(from.as_str()))
            .exec(self.write_conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::Conflict {
                message: format!("contribution {} changed concurrently", contribution_id),
            });
        }

        self.require_contribution(contribution_id).await
    }

    /// Store a new paid total, guarded by the previous one
    pub async fn record_payment(
        &self,
        contribution_id: Uuid,
        previous_paid: Decimal,
        new_paid: Decimal,
        gateway_reference: Option<String>,
    ) -> Result<Contribution> {
        let mut update = ContributionEntity::update_many()
            .col_expr(ContributionColumn::AmountPaid, Expr::value(new_paid))
            .col_expr(
                ContributionColumn::UpdatedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
            );
        if let Some(reference) = gateway_reference {
            update = update.col_expr(ContributionColumn::GatewayReference, Expr::value(reference));
        }

        let result = update
            .filter(ContributionColumn::Id.eq(contribution_id))
            .filter(ContributionColumn::AmountPaid.eq(previous_paid))
            .filter(ContributionColumn::ApprovalStatus.eq(ApprovalStatus::Approved.as_str()))
            .exec(self.write_conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::Conflict {
                message: format!("contribution {} changed concurrently", contribution_id),
            });
        }

        self.require_contribution(contribution_id).await
    }

    async fn require_contribution(&self, contribution_id: Uuid) -> Result<Contribution> {
        ContributionEntity::find_by_id(contribution_id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::ContributionNotFound {
                id: contribution_id.to_string(),
            })
    }

    // ========================================================================
    // Tenant Application Operations
    // ========================================================================

    /// File a pending application
    pub async fn create_application(&self, input: NewApplication) -> Result<TenantApplication> {
        let application = TenantApplicationActiveModel {
            id: Set(Uuid::new_v4()),
            applicant_id: Set(input.applicant_id),
            organization_name: Set(input.organization_name),
            requested_slug: Set(input.requested_slug),
            contact_email: Set(normalize_email(&input.contact_email)),
            message: Set(input.message),
            status: Set(ApplicationStatus::Pending.as_str().to_string()),
            reviewed_by: Set(None),
            reviewed_at: Set(None),
            rejection_reason: Set(None),
            tenant_id: Set(None),
            created_at: Set(Utc::now().into()),
        };

        application.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find an application by ID
    pub async fn find_application(&self, id: Uuid) -> Result<Option<TenantApplication>> {
        TenantApplicationEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Whether the user already waits on a decision
    pub async fn has_pending_application(&self, applicant_id: Uuid) -> Result<bool> {
        let count = TenantApplicationEntity::find()
            .filter(TenantApplicationColumn::ApplicantId.eq(applicant_id))
            .filter(TenantApplicationColumn::Status.eq(ApplicationStatus::Pending.as_str()))
            .count(self.read_conn())
            .await?;
        Ok(count > 0)
    }

    /// Applications filed by one user, newest first
    pub async fn list_applications_for(&self, applicant_id: Uuid) -> Result<Vec<TenantApplication>> {
        TenantApplicationEntity::find()
            .filter(TenantApplicationColumn::ApplicantId.eq(applicant_id))
            .order_by_desc(TenantApplicationColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Applications for review; pending ones oldest first
    pub async fn list_applications(
        &self,
        status: Option<ApplicationStatus>,
        page: Page,
    ) -> Result<Paged<TenantApplication>> {
        let mut query = TenantApplicationEntity::find();
        if let Some(status) = status {
            query = query.filter(TenantApplicationColumn::Status.eq(status.as_str()));
        }
        let query = match status {
            Some(ApplicationStatus::Pending) => query.order_by_asc(TenantApplicationColumn::CreatedAt),
            _ => query.order_by_desc(TenantApplicationColumn::CreatedAt),
        };

        let paginator = query.paginate(self.read_conn(), page.per_page);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.index()).await?;

        Ok(Paged::new(items, page, total))
    }

    /// Approve an application: create the tenant, make the applicant its
    /// admin and close the application, all in one transaction
    pub async fn approve_application(
        &self,
        application: TenantApplication,
        reviewer_id: Uuid,
        defaults: TenantDefaults,
    ) -> Result<(TenantApplication, Tenant)> {
        let now = Utc::now();
        let txn = self.write_conn().begin().await?;

        let taken = TenantEntity::find()
            .filter(TenantColumn::Slug.eq(application.requested_slug.as_str()))
            .count(&txn)
            .await?;
        if taken > 0 {
            return Err(AppError::DuplicateSlug {
                slug: application.requested_slug,
            });
        }

        let tenant = TenantActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(application.organization_name.clone()),
            slug: Set(application.requested_slug.clone()),
            contact_email: Set(application.contact_email.clone()),
            status: Set(TenantStatus::Active.as_str().to_string()),
            platform_fee_percent: Set(defaults.fee_percent),
            currency: Set(defaults.currency),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;

        assign_role_on(&txn, application.applicant_id, tenant.id, TenantRole::TenantAdmin).await?;

        let closed = TenantApplicationEntity::update_many()
            .col_expr(
                TenantApplicationColumn::Status,
                Expr::value(ApplicationStatus::Approved.as_str()),
            )
            .col_expr(TenantApplicationColumn::ReviewedBy, Expr::value(reviewer_id))
            .col_expr(
                TenantApplicationColumn::ReviewedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(now)),
            )
            .col_expr(TenantApplicationColumn::TenantId, Expr::value(tenant.id))
            .filter(TenantApplicationColumn::Id.eq(application.id))
            .filter(TenantApplicationColumn::Status.eq(ApplicationStatus::Pending.as_str()))
            .exec(&txn)
            .await?;
        if closed.rows_affected == 0 {
            return Err(AppError::Conflict {
                message: format!("application {} was already reviewed", application.id),
            });
        }

        let application = TenantApplicationEntity::find_by_id(application.id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::ApplicationNotFound {
                id: application.id.to_string(),
            })?;

        txn.commit().await?;
        Ok((application, tenant))
    }

    /// Reject a pending application
    pub async fn reject_application(
        &self,
        application_id: Uuid,
        reviewer_id: Uuid,
        reason: String,
    ) -> Result<TenantApplication> {
        let result = TenantApplicationEntity::update_many()
            .col_expr(
                TenantApplicationColumn::Status,
                Expr::value(ApplicationStatus::Rejected.as_str()),
            )
            .col_expr(TenantApplicationColumn::ReviewedBy, Expr::value(reviewer_id))
            .col_expr(
                TenantApplicationColumn::ReviewedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
            )
            .col_expr(TenantApplicationColumn::RejectionReason, Expr::value(reason))
            .filter(TenantApplicationColumn::Id.eq(application_id))
            .filter(TenantApplicationColumn::Status.eq(ApplicationStatus::Pending.as_str()))
            .exec(self.write_conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::Conflict {
                message: format!("application {} was already reviewed", application_id),
            });
        }

        TenantApplicationEntity::find_by_id(application_id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::ApplicationNotFound {
                id: application_id.to_string(),
            })
    }

    // ========================================================================
    // Platform Statistics
    // ========================================================================

    /// Counts for the system admin dashboard
    pub async fn platform_stats(&self) -> Result<PlatformStats> {
        let conn = self.read_conn();

        let tenants_active = TenantEntity::find()
            .filter(TenantColumn::Status.eq(TenantStatus::Active.as_str()))
            .count(conn)
            .await?;
        let tenants_suspended = TenantEntity::find()
            .filter(TenantColumn::Status.eq(TenantStatus::Suspended.as_str()))
            .count(conn)
            .await?;
        let applications_pending = TenantApplicationEntity::find()
            .filter(TenantApplicationColumn::Status.eq(ApplicationStatus::Pending.as_str()))
            .count(conn)
            .await?;
        let users = UserEntity::find().count(conn).await?;

        let mut projects_by_status = BTreeMap::new();
        for status in ProjectStatus::ALL {
            let count = ProjectEntity::find()
                .filter(ProjectColumn::Status.eq(status.as_str()))
                .count(conn)
                .await?;
            projects_by_status.insert(status.as_str().to_string(), count);
        }

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                COALESCE(SUM(amount), 0) AS pledged,
                COALESCE(SUM(platform_fee), 0) AS fees
            FROM contributions
            WHERE approval_status IN ($1, $2)
            "#,
            vec![
                ApprovalStatus::Pending.as_str().into(),
                ApprovalStatus::Approved.as_str().into(),
            ],
        );
        let (total_pledged, total_fees) = match conn.query_one(stmt).await? {
            Some(row) => (
                row.try_get::<Decimal>("", "pledged")?,
                row.try_get::<Decimal>("", "fees")?,
            ),
            None => Default::default(),
        };

        Ok(PlatformStats {
            tenants_active,
            tenants_suspended,
            applications_pending,
            users,
            projects_by_status,
            total_pledged,
            total_fees,
        })
    }
}

async fn assign_role_on<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    tenant_id: Uuid,
    role: TenantRole,
) -> Result<()> {
    let existing = UserTenantRoleEntity::find()
        .filter(UserTenantRoleColumn::UserId.eq(user_id))
        .filter(UserTenantRoleColumn::TenantId.eq(tenant_id))
        .filter(UserTenantRoleColumn::Role.eq(role.as_str()))
        .count(conn)
        .await?;
    if existing > 0 {
        return Ok(());
    }

    UserTenantRoleActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        tenant_id: Set(tenant_id),
        role: Set(role.as_str().to_string()),
        created_at: Set(Utc::now().into()),
    }
    .insert(conn)
    .await?;

    Ok(())
}

/// Partial project update that only applies while the stored status is `expected_status`
fn project_update(
    project_id: Uuid,
    expected_status: &str,
    changes: ProjectChanges,
) -> UpdateMany<ProjectEntity> {
    let mut update = ProjectEntity::update_many().col_expr(
        ProjectColumn::UpdatedAt,
        Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
    );

    if let Some(title) = changes.title {
        update = update.col_expr(ProjectColumn::Title, Expr::value(title));
    }
    if let Some(description) = changes.description {
        update = update.col_expr(ProjectColumn::Description, Expr::value(description));
    }
    if let Some(visibility) = changes.visibility {
        update = update.col_expr(ProjectColumn::Visibility, Expr::value(visibility.as_str()));
    }
    if let Some(manager_id) = changes.manager_id {
        update = update.col_expr(ProjectColumn::ManagerId, Expr::value(manager_id));
    }
    if let Some(total_amount) = changes.total_amount {
        update = update.col_expr(ProjectColumn::TotalAmount, Expr::value(total_amount));
    }
    if let Some(starts_on) = changes.starts_on {
        update = update.col_expr(ProjectColumn::StartsOn, Expr::value(starts_on));
    }
    if let Some(ends_on) = changes.ends_on {
        update = update.col_expr(ProjectColumn::EndsOn, Expr::value(ends_on));
    }

    update
        .filter(ProjectColumn::Id.eq(project_id))
        .filter(ProjectColumn::Status.eq(expected_status))
}

/// `SELECT ... FOR UPDATE` on one project row
fn locked_project(project_id: Uuid) -> Select<ProjectEntity> {
    ProjectEntity::find_by_id(project_id).lock_exclusive()
}

fn invitee_condition(user_id: Uuid, email: &str) -> Condition {
    Condition::any()
        .add(ProjectInvitationColumn::AcceptedBy.eq(user_id))
        .add(ProjectInvitationColumn::Email.eq(normalize_email(email)))
}

fn totals_from_row(row: &QueryResult) -> Result<ProjectTotals> {
    Ok(ProjectTotals {
        pledged: row.try_get("", "pledged")?,
        paid: row.try_get("", "paid")?,
        contribution_count: row.try_get("", "contribution_count")?,
        contributor_count: row.try_get("", "contributor_count")?,
    })
}
