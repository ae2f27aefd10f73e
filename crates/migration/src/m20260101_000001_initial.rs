//! Initial schema: tenants, users, roles, projects, pledges and applications.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // Platform
        // ============================================================
        db.execute_unprepared(TENANTS_SQL).await?;
        db.execute_unprepared(USERS_SQL).await?;
        db.execute_unprepared(USER_TENANT_ROLES_SQL).await?;
        db.execute_unprepared(TENANT_APPLICATIONS_SQL).await?;

        // ============================================================
        // Projects
        // ============================================================
        db.execute_unprepared(PROJECTS_SQL).await?;
        db.execute_unprepared(PRODUCTS_SQL).await?;
        db.execute_unprepared(PROJECT_INVITATIONS_SQL).await?;

        // ============================================================
        // Pledges
        // ============================================================
        db.execute_unprepared(CONTRIBUTIONS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL
// ============================================================

const TENANTS_SQL: &str = r"
CREATE TABLE tenants (
    id                   UUID PRIMARY KEY,
    name                 TEXT NOT NULL,
    slug                 TEXT NOT NULL UNIQUE,
    contact_email        TEXT NOT NULL,
    status               TEXT NOT NULL DEFAULT 'active'
                         CHECK (status IN ('active', 'suspended')),
    platform_fee_percent NUMERIC(5, 2) NOT NULL DEFAULT 5.00
                         CHECK (platform_fee_percent >= 0 AND platform_fee_percent <= 100),
    currency             TEXT NOT NULL DEFAULT 'USD' CHECK (currency ~ '^[A-Z]{3}$'),
    created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at           TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT tenants_slug_format CHECK (slug ~ '^[a-z0-9]([a-z0-9-]*[a-z0-9])?$')
);

CREATE INDEX idx_tenants_status ON tenants(status);
";

const USERS_SQL: &str = r"
CREATE TABLE users (
    id              UUID PRIMARY KEY,
    name            TEXT NOT NULL,
    email           TEXT NOT NULL UNIQUE,
    password_hash   TEXT NOT NULL,
    is_system_admin BOOLEAN NOT NULL DEFAULT FALSE,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
";

const USER_TENANT_ROLES_SQL: &str = r"
CREATE TABLE user_tenant_roles (
    id         UUID PRIMARY KEY,
    user_id    UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    tenant_id  UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    role       TEXT NOT NULL
               CHECK (role IN ('tenant_admin', 'project_manager', 'contributor')),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT uq_user_tenant_role UNIQUE (user_id, tenant_id, role)
);

CREATE INDEX idx_user_tenant_roles_tenant ON user_tenant_roles(tenant_id, role);
";

const TENANT_APPLICATIONS_SQL: &str = r"
CREATE TABLE tenant_applications (
    id                UUID PRIMARY KEY,
    applicant_id      UUID NOT NULL REFERENCES users(id),
    organization_name TEXT NOT NULL,
    requested_slug    TEXT NOT NULL,
    contact_email     TEXT NOT NULL,
    message           TEXT NOT NULL DEFAULT '',
    status            TEXT NOT NULL DEFAULT 'pending'
                      CHECK (status IN ('pending', 'approved', 'rejected')),
    reviewed_by       UUID REFERENCES users(id),
    reviewed_at       TIMESTAMPTZ,
    rejection_reason  TEXT,
    tenant_id         UUID REFERENCES tenants(id),
    created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT tenant_applications_rejection_reason CHECK (
        status <> 'rejected' OR rejection_reason IS NOT NULL
    )
);

CREATE INDEX idx_tenant_applications_status ON tenant_applications(status, created_at);
CREATE INDEX idx_tenant_applications_applicant ON tenant_applications(applicant_id);

-- At most one open application per applicant
CREATE UNIQUE INDEX uq_tenant_applications_pending
    ON tenant_applications(applicant_id) WHERE status = 'pending';
";

const PROJECTS_SQL: &str = r"
CREATE TABLE projects (
    id           UUID PRIMARY KEY,
    tenant_id    UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    manager_id   UUID REFERENCES users(id) ON DELETE SET NULL,
    title        TEXT NOT NULL,
    description  TEXT NOT NULL DEFAULT '',
    status       TEXT NOT NULL DEFAULT 'draft'
                 CHECK (status IN ('draft', 'active', 'paused', 'completed', 'cancelled')),
    visibility   TEXT NOT NULL DEFAULT 'public'
                 CHECK (visibility IN ('public', 'private', 'invite_only')),
    total_amount NUMERIC(12, 2) NOT NULL DEFAULT 0 CHECK (total_amount >= 0),
    starts_on    DATE,
    ends_on      DATE,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT projects_date_range CHECK (
        starts_on IS NULL OR ends_on IS NULL OR starts_on <= ends_on
    )
);

CREATE INDEX idx_projects_tenant_status ON projects(tenant_id, status);
CREATE INDEX idx_projects_manager ON projects(manager_id);
";

const PRODUCTS_SQL: &str = r"
CREATE TABLE products (
    id          UUID PRIMARY KEY,
    project_id  UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    price       NUMERIC(12, 2) NOT NULL CHECK (price > 0),
    sort_order  INTEGER NOT NULL DEFAULT 0,
    image_url   TEXT,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_products_project ON products(project_id, sort_order);
";

const PROJECT_INVITATIONS_SQL: &str = r"
CREATE TABLE project_invitations (
    id          UUID PRIMARY KEY,
    project_id  UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    email       TEXT NOT NULL,
    token_hash  TEXT NOT NULL UNIQUE,
    invited_by  UUID NOT NULL REFERENCES users(id),
    accepted_by UUID REFERENCES users(id),
    accepted_at TIMESTAMPTZ,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT uq_project_invitation_email UNIQUE (project_id, email)
);

CREATE INDEX idx_project_invitations_accepted_by ON project_invitations(accepted_by);
";

const CONTRIBUTIONS_SQL: &str = r"
CREATE TABLE contributions (
    id                UUID PRIMARY KEY,
    project_id        UUID NOT NULL REFERENCES projects(id),
    user_id           UUID NOT NULL REFERENCES users(id),
    product_id        UUID REFERENCES products(id) ON DELETE SET NULL,
    amount            NUMERIC(12, 2) NOT NULL CHECK (amount > 0),
    platform_fee      NUMERIC(12, 2) NOT NULL DEFAULT 0 CHECK (platform_fee >= 0),
    payment_plan      TEXT NOT NULL CHECK (payment_plan IN ('full', 'installments')),
    installment_count INTEGER NOT NULL DEFAULT 1 CHECK (installment_count >= 1),
    amount_paid       NUMERIC(12, 2) NOT NULL DEFAULT 0,
    first_due_on      DATE NOT NULL,
    approval_status   TEXT NOT NULL DEFAULT 'pending'
                      CHECK (approval_status IN ('pending', 'approved', 'rejected', 'cancelled')),
    gateway_reference TEXT,
    created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at        TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT contributions_paid_range CHECK (amount_paid >= 0 AND amount_paid <= amount),
    CONSTRAINT contributions_plan_count CHECK (
        (payment_plan = 'full' AND installment_count = 1)
        OR (payment_plan = 'installments' AND installment_count >= 2)
    )
);

CREATE INDEX idx_contributions_project_status ON contributions(project_id, approval_status);
CREATE INDEX idx_contributions_user ON contributions(user_id);
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS contributions;
DROP TABLE IF EXISTS project_invitations;
DROP TABLE IF EXISTS products;
DROP TABLE IF EXISTS projects;
DROP TABLE IF EXISTS tenant_applications;
DROP TABLE IF EXISTS user_tenant_roles;
DROP TABLE IF EXISTS users;
DROP TABLE IF EXISTS tenants;
";
