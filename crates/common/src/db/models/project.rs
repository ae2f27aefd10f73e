//! Project entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{ProjectStatus, Visibility};
use crate::errors::Result as AppResult;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub manager_id: Option<Uuid>,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text")]
    pub visibility: String,

    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total_amount: Decimal,

    pub starts_on: Option<Date>,

    pub ends_on: Option<Date>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the project status as an enum
    pub fn project_status(&self) -> AppResult<ProjectStatus> {
        self.status.parse()
    }

    pub fn project_visibility(&self) -> AppResult<Visibility> {
        self.visibility.parse()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,

    #[sea_orm(has_many = "super::product::Entity")]
    Products,

    #[sea_orm(has_many = "super::contribution::Entity")]
    Contributions,

    #[sea_orm(has_many = "super::project_invitation::Entity")]
    Invitations,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Products.def()
    }
}

impl Related<super::contribution::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contributions.def()
    }
}

impl Related<super::project_invitation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Invitations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ActiveValue, IntoActiveModel};

    fn project(status: &str, visibility: &str) -> Model {
        let now = chrono::Utc::now().into();
        Model {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            manager_id: None,
            title: "Roof repair".to_string(),
            description: String::new(),
            status: status.to_string(),
            visibility: visibility.to_string(),
            total_amount: Decimal::new(100_000, 2),
            starts_on: None,
            ends_on: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_typed_accessors() {
        let p = project("active", "invite_only");
        assert_eq!(p.project_status().unwrap(), ProjectStatus::Active);
        assert_eq!(p.project_visibility().unwrap(), Visibility::InviteOnly);
        assert!(project("archived", "public").project_status().is_err());
    }

    #[test]
    fn test_model_round_trips_through_active_model() {
        let p = project("draft", "public");
        let active = p.clone().into_active_model();
        assert_eq!(active.status, ActiveValue::Unchanged("draft".to_string()));
        assert_eq!(Model::try_from(active).unwrap(), p);
    }
}
