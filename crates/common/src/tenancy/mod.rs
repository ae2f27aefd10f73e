//! Tenant resolution
//!
//! Requests reach a tenant either through a subdomain of the platform's base
//! domain (`acme.pledgehub.example`) or, for API clients hitting the bare
//! domain, through the tenant header.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::db::models::Tenant;
use crate::errors::{AppError, Result};

/// Labels that can never be tenant slugs
pub const RESERVED_SLUGS: &[&str] = &["www", "api", "admin", "app", "static", "mail"];

const SLUG_PATTERN: &str = r"^[a-z0-9](?:[a-z0-9-]{1,61}[a-z0-9])$";

fn slug_regex() -> &'static Regex {
    static SLUG: OnceLock<Regex> = OnceLock::new();
    SLUG.get_or_init(|| Regex::new(SLUG_PATTERN).expect("slug pattern is valid"))
}

/// Tenant account status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
        }
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            other => Err(AppError::InvalidFormat {
                message: format!("unknown tenant status '{}'", other),
            }),
        }
    }
}

/// The tenant a request is scoped to, stored in request extensions
#[derive(Clone, Debug)]
pub struct CurrentTenant(pub Tenant);

/// Validate a tenant slug and return it normalized
pub fn validate_slug(slug: &str) -> Result<String> {
    let slug = slug.trim().to_ascii_lowercase();
    if !slug_regex().is_match(&slug) {
        return Err(AppError::InvalidSlug {
            slug,
            reason: "use 3-63 lowercase letters, digits or hyphens, not starting or ending with a hyphen"
                .to_string(),
        });
    }
    if RESERVED_SLUGS.contains(&slug.as_str()) {
        return Err(AppError::InvalidSlug {
            slug,
            reason: "this name is reserved".to_string(),
        });
    }
    Ok(slug)
}

/// Pick the tenant slug for a request.
///
/// A single-label subdomain of `base_domain` wins unless it is reserved
/// (`api.`, `www.` and friends). The bare base domain, reserved labels and
/// deeper subdomains fall back to the header value.
pub fn resolve_slug(host: Option<&str>, base_domain: &str, header: Option<&str>) -> Option<String> {
    let subdomain = host
        .and_then(|h| subdomain_of(h, base_domain))
        .filter(|label| !RESERVED_SLUGS.contains(&label.as_str()));
    if let Some(slug) = subdomain {
        return Some(slug);
    }

    header
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
}

fn subdomain_of(host: &str, base_domain: &str) -> Option<String> {
    let host = strip_port(host.trim()).trim_end_matches('.').to_ascii_lowercase();
    let base = base_domain.trim().trim_end_matches('.').to_ascii_lowercase();

    let label = host.strip_suffix(&base)?.strip_suffix('.')?;
    if label.is_empty() || label.contains('.') {
        return None;
    }
    Some(label.to_string())
}

fn strip_port(host: &str) -> &str {
    // IPv6 literals never carry tenants
    if host.starts_with('[') {
        return host;
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "pledgehub.example";

    #[test]
    fn test_subdomain_resolution() {
        assert_eq!(
            resolve_slug(Some("acme.pledgehub.example"), BASE, None),
            Some("acme".to_string())
        );
        assert_eq!(
            resolve_slug(Some("ACME.PledgeHub.Example:8080"), BASE, None),
            Some("acme".to_string())
        );
    }

    #[test]
    fn test_bare_and_nested_hosts_use_header() {
        assert_eq!(resolve_slug(Some("pledgehub.example"), BASE, None), None);
        assert_eq!(
            resolve_slug(Some("pledgehub.example"), BASE, Some(" Acme ")),
            Some("acme".to_string())
        );
        assert_eq!(resolve_slug(Some("a.b.pledgehub.example"), BASE, None), None);
        // a look-alike domain is not a subdomain
        assert_eq!(resolve_slug(Some("acmepledgehub.example"), BASE, None), None);
    }

    #[test]
    fn test_subdomain_beats_header() {
        assert_eq!(
            resolve_slug(Some("acme.pledgehub.example"), BASE, Some("other")),
            Some("acme".to_string())
        );
        assert_eq!(resolve_slug(None, BASE, Some("")), None);
    }

    #[test]
    fn test_reserved_subdomains_use_header() {
        assert_eq!(
            resolve_slug(Some("api.pledgehub.example"), BASE, Some("acme")),
            Some("acme".to_string())
        );
        assert_eq!(
            resolve_slug(Some("WWW.pledgehub.example:8443"), BASE, Some("acme")),
            Some("acme".to_string())
        );
        assert_eq!(resolve_slug(Some("admin.pledgehub.example"), BASE, None), None);
    }

    #[test]
    fn test_slug_validation() {
        assert_eq!(validate_slug("Riverside-Choir").ok(), Some("riverside-choir".to_string()));
        assert!(validate_slug("ab").is_err());
        assert!(validate_slug("-acme").is_err());
        assert!(validate_slug("acme-").is_err());
        assert!(validate_slug("acme_co").is_err());
        assert!(validate_slug(&"a".repeat(64)).is_err());
        assert!(validate_slug(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_reserved_slugs() {
        let err = validate_slug("admin").unwrap_err();
        assert!(matches!(err, AppError::InvalidSlug { .. }));
        assert!(validate_slug("www").is_err());
    }

    #[test]
    fn test_tenant_status_parse() {
        assert_eq!("suspended".parse::<TenantStatus>().ok(), Some(TenantStatus::Suspended));
        assert!("closed".parse::<TenantStatus>().is_err());
    }
}
