//! SeaORM entity models
//!
//! Database entities for PledgeHub

mod contribution;
mod product;
mod project;
mod project_invitation;
mod tenant;
mod tenant_application;
mod user;
mod user_tenant_role;

pub use tenant::{
    Entity as TenantEntity,
    Model as Tenant,
    ActiveModel as TenantActiveModel,
    Column as TenantColumn,
};

pub use user::{
    Entity as UserEntity,
    Model as User,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};

pub use user_tenant_role::{
    Entity as UserTenantRoleEntity,
    Model as UserTenantRole,
    ActiveModel as UserTenantRoleActiveModel,
    Column as UserTenantRoleColumn,
};

pub use project::{
    Entity as ProjectEntity,
    Model as Project,
    ActiveModel as ProjectActiveModel,
    Column as ProjectColumn,
};

pub use product::{
    Entity as ProductEntity,
    Model as Product,
    ActiveModel as ProductActiveModel,
    Column as ProductColumn,
};

pub use project_invitation::{
    Entity as ProjectInvitationEntity,
    Model as ProjectInvitation,
    ActiveModel as ProjectInvitationActiveModel,
    Column as ProjectInvitationColumn,
};

pub use contribution::{
    Entity as ContributionEntity,
    Model as Contribution,
    ActiveModel as ContributionActiveModel,
    Column as ContributionColumn,
};

pub use tenant_application::{
    Entity as TenantApplicationEntity,
    Model as TenantApplication,
    ActiveModel as TenantApplicationActiveModel,
    Column as TenantApplicationColumn,
};
