//! Business rules independent of storage and transport

pub mod application;
pub mod contribution;
pub mod money;
pub mod project;

pub use application::{ApplicationStatus, Decision};
pub use contribution::{ApprovalStatus, Installment, Ledger, PaymentPlan};
pub use project::{ProjectStatus, Visibility};
