//! Request from an organization to become a tenant

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::ApplicationStatus;
use crate::errors::Result as AppResult;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tenant_applications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub applicant_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub organization_name: String,

    #[sea_orm(column_type = "Text")]
    pub requested_slug: String,

    #[sea_orm(column_type = "Text")]
    pub contact_email: String,

    #[sea_orm(column_type = "Text")]
    pub message: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub reviewed_by: Option<Uuid>,

    pub reviewed_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(column_type = "Text", nullable)]
    pub rejection_reason: Option<String>,

    /// Tenant created on approval
    pub tenant_id: Option<Uuid>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn application_status(&self) -> AppResult<ApplicationStatus> {
        self.status.parse()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::ApplicantId",
        to = "super::user::Column::Id"
    )]
    Applicant,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Applicant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
