//! Configuration management for PledgeHub services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Tenant resolution configuration
    #[serde(default)]
    pub tenancy: TenancyConfig,

    /// Platform-wide business defaults
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// JWT secret for token signing
    pub jwt_secret: Option<String>,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,

    /// Tenant slug header name, used when the host carries no subdomain
    #[serde(default = "default_tenant_header")]
    pub tenant_header: String,

    /// Request ID header name
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TenancyConfig {
    /// Domain under which tenants live as `{slug}.{base_domain}`
    #[serde(default = "default_base_domain")]
    pub base_domain: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformConfig {
    /// Fee percentage applied to new tenants
    #[serde(default = "default_fee_percent")]
    pub default_fee_percent: Decimal,

    /// Currency applied to new tenants
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Upper bound for installment plans
    #[serde(default = "default_max_installments")]
    pub max_installments: u32,

    /// Accounts registered with these emails become system administrators
    #[serde(default)]
    pub admin_emails: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_concurrent() -> usize { 256 }
fn default_database_url() -> String { "postgres://localhost/pledgehub".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_jwt_expiration() -> u64 { 86_400 }
fn default_tenant_header() -> String { "X-Tenant-Slug".to_string() }
fn default_request_id_header() -> String { "X-Request-ID".to_string() }
fn default_base_domain() -> String { "pledgehub.localhost".to_string() }
fn default_fee_percent() -> Decimal { Decimal::new(500, 2) }
fn default_currency() -> String { "USD".to_string() }
fn default_max_installments() -> u32 { 12 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "pledgehub".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_expiration_secs: default_jwt_expiration(),
            tenant_header: default_tenant_header(),
            request_id_header: default_request_id_header(),
        }
    }
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            base_domain: default_base_domain(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            default_fee_percent: default_fee_percent(),
            default_currency: default_currency(),
            max_installments: default_max_installments(),
            admin_emails: Vec::new(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fee = self.platform.default_fee_percent;
        if fee < Decimal::ZERO || fee > Decimal::ONE_HUNDRED {
            return Err(ConfigError::Message(format!(
                "platform.default_fee_percent must be within 0..=100, got {}",
                fee
            )));
        }
        if self.platform.max_installments < 2 {
            return Err(ConfigError::Message(
                "platform.max_installments must be at least 2".to_string(),
            ));
        }
        if crate::domain::money::normalize_currency(&self.platform.default_currency).is_err() {
            return Err(ConfigError::Message(format!(
                "platform.default_currency must be a three-letter ISO code, got '{}'",
                self.platform.default_currency
            )));
        }
        if self.tenancy.base_domain.trim().is_empty() {
            return Err(ConfigError::Message(
                "tenancy.base_domain must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether registering with `email` grants system administration
    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim();
        self.platform
            .admin_emails
            .iter()
            .any(|admin| admin.trim().eq_ignore_ascii_case(email))
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.tenant_header, "X-Tenant-Slug");
        assert_eq!(config.platform.default_fee_percent, Decimal::new(5, 0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/pledgehub");
    }

    #[test]
    fn test_rejects_out_of_range_fee() {
        let mut config = AppConfig::default();
        config.platform.default_fee_percent = Decimal::new(101, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_single_installment_limit() {
        let mut config = AppConfig::default();
        config.platform.max_installments = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_admin_emails_match_case_insensitively() {
        let mut config = AppConfig::default();
        assert!(!config.is_admin_email("root@pledgehub.example"));

        config.platform.admin_emails = vec!["Root@PledgeHub.example".to_string()];
        assert!(config.is_admin_email(" root@pledgehub.example"));
        assert!(!config.is_admin_email("someone@pledgehub.example"));
    }

    #[test]
    fn test_rejects_bad_default_currency() {
        let mut config = AppConfig::default();
        config.platform.default_currency = "dollars".to_string();
        assert!(config.validate().is_err());
    }
}
