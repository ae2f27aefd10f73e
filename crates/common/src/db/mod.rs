//! Database layer for PledgeHub
//!
//! Provides:
//! - SeaORM entity models
//! - Repository pattern for data access
//! - Connection pool management
//! - Pagination helpers

pub mod models;
mod repository;

pub use repository::{
    NewApplication, NewContribution, NewProduct, NewProject, PlatformStats, ProjectChanges,
    ProjectScope, ProjectTotals, Repository, TenantDefaults, TenantSettings,
};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Upper bound for `per_page`
pub const MAX_PER_PAGE: u64 = 100;

/// Database connection pool wrapper
#[derive(Clone, Debug)]
pub struct DbPool {
    /// Primary connection (for writes)
    pub primary: DatabaseConnection,

    /// Read replica connection (optional)
    pub replica: Option<DatabaseConnection>,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to primary database...");

        let primary = Database::connect(connect_options(&config.url, config))
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect to primary: {}", e),
            })?;

        // Connect to replica if configured
        let replica = match config.read_url {
            Some(ref read_url) => {
                info!("Connecting to read replica...");
                let replica_conn = Database::connect(connect_options(read_url, config))
                    .await
                    .map_err(|e| AppError::DatabaseConnection {
                        message: format!("Failed to connect to replica: {}", e),
                    })?;
                Some(replica_conn)
            }
            None => None,
        };

        info!("Database connections established");

        Ok(Self { primary, replica })
    }

    /// Wrap an existing connection, used by tests and tools
    pub fn from_connection(primary: DatabaseConnection) -> Self {
        Self {
            primary,
            replica: None,
        }
    }

    /// Get the connection for reads (replica if available, otherwise primary)
    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    /// Get the connection for writes (always primary)
    pub fn write(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.primary
            .ping()
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Primary ping failed: {}", e),
            })?;

        if let Some(ref replica) = self.replica {
            replica
                .ping()
                .await
                .map_err(|e| AppError::DatabaseConnection {
                    message: format!("Replica ping failed: {}", e),
                })?;
        }

        Ok(())
    }
}

fn connect_options(url: &str, config: &DatabaseConfig) -> ConnectOptions {
    let mut opts = ConnectOptions::new(url);
    opts.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .sqlx_logging(false);
    opts
}

/// 1-based page request
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Page {
    #[serde(default = "default_page")]
    pub page: u64,

    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 { 1 }
fn default_per_page() -> u64 { 20 }

impl Default for Page {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl Page {
    /// Clamp to sane bounds
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    /// Zero-based index as used by the SeaORM paginator
    pub fn index(&self) -> u64 {
        self.page.saturating_sub(1)
    }
}

/// A page of results with the total count
#[derive(Clone, Debug, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, page: Page, total: u64) -> Self {
        Self {
            items,
            page: page.page,
            per_page: page.per_page,
            total,
        }
    }

    /// Convert the items while keeping the paging data; stops at the first error
    pub fn try_map<U, E>(
        self,
        f: impl FnMut(T) -> std::result::Result<U, E>,
    ) -> std::result::Result<Paged<U>, E> {
        Ok(Paged {
            items: self
                .items
                .into_iter()
                .map(f)
                .collect::<std::result::Result<_, _>>()?,
            page: self.page,
            per_page: self.per_page,
            total: self.total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_normalization() {
        let page = Page { page: 0, per_page: 500 }.normalized();
        assert_eq!(page, Page { page: 1, per_page: MAX_PER_PAGE });
        assert_eq!(page.index(), 0);

        let page = Page { page: 3, per_page: 0 }.normalized();
        assert_eq!(page.per_page, 1);
        assert_eq!(page.index(), 2);
    }

    #[test]
    fn test_paged_try_map_keeps_totals() {
        let paged = Paged::new(vec![1, 2, 3], Page::default(), 42);
        let mapped = paged.try_map(|n| Ok::<_, AppError>(n * 10)).unwrap();
        assert_eq!(mapped.items, vec![10, 20, 30]);
        assert_eq!(mapped.total, 42);
        assert_eq!(mapped.per_page, 20);

        let failed = Paged::new(vec![1, 2], Page::default(), 2).try_map(|n| {
            if n == 2 {
                Err(AppError::guard("bad row"))
            } else {
                Ok(n)
            }
        });
        assert!(failed.is_err());
    }

    #[test]
    fn test_ping_reports_disconnected_pool() {
        let pool = DbPool::from_connection(DatabaseConnection::Disconnected);
        let err = tokio_test::block_on(pool.ping()).unwrap_err();
        assert!(matches!(err, AppError::DatabaseConnection { .. }));
    }
}
