//! PledgeHub Common Library
//!
//! Shared code for the PledgeHub services including:
//! - Database models and repository patterns
//! - Domain rules for projects, contributions and tenant applications
//! - Authorization policies and tenant resolution
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod metrics;
pub mod policy;
pub mod tenancy;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
