//! Contribution entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::contribution::{schedule, ApprovalStatus, Ledger, PaymentPlan};
use crate::errors::Result as AppResult;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "contributions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub project_id: Uuid,

    pub user_id: Uuid,

    pub product_id: Option<Uuid>,

    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub amount: Decimal,

    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub platform_fee: Decimal,

    #[sea_orm(column_type = "Text")]
    pub payment_plan: String,

    pub installment_count: i32,

    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub amount_paid: Decimal,

    pub first_due_on: Date,

    #[sea_orm(column_type = "Text")]
    pub approval_status: String,

    /// Reference from the external payment gateway
    #[sea_orm(column_type = "Text", nullable)]
    pub gateway_reference: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn plan(&self) -> AppResult<PaymentPlan> {
        PaymentPlan::from_parts(&self.payment_plan, self.installment_count)
    }

    pub fn status(&self) -> AppResult<ApprovalStatus> {
        self.approval_status.parse()
    }

    /// Balance view with the installment schedule rebuilt from stored columns
    pub fn ledger(&self) -> AppResult<Ledger> {
        let installments = schedule(self.amount, self.plan()?, self.first_due_on, None)?;
        Ok(Ledger {
            amount: self.amount,
            amount_paid: self.amount_paid,
            installments,
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id"
    )]
    Project,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
