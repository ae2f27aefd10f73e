//! Tenant entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::Result as AppResult;
use crate::tenancy::TenantStatus;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "Text", unique)]
    pub slug: String,

    #[sea_orm(column_type = "Text")]
    pub contact_email: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub platform_fee_percent: Decimal,

    #[sea_orm(column_type = "Text")]
    pub currency: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the tenant status as an enum
    pub fn tenant_status(&self) -> AppResult<TenantStatus> {
        self.status.parse()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.tenant_status(), Ok(TenantStatus::Active))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::project::Entity")]
    Projects,

    #[sea_orm(has_many = "super::user_tenant_role::Entity")]
    Roles,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Projects.def()
    }
}

impl Related<super::user_tenant_role::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Roles.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
