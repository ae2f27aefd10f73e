//! Tenant resolution middleware
//!
//! Resolves the tenant from the request host (or the tenant header), refuses
//! unknown and suspended tenants, and stores [`CurrentTenant`] for handlers.

use axum::{
    extract::{Request, State},
    http::header::HOST,
    middleware::Next,
    response::Response,
};
use pledgehub_common::{
    errors::{AppError, Result},
    metrics,
    tenancy::{resolve_slug, CurrentTenant},
};

use crate::AppState;

pub async fn resolve_tenant(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let tenant_header = state.config.auth.tenant_header.as_str();

    let slug = {
        let headers = request.headers();
        // HTTP/2 clients send :authority instead of Host
        let host = headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| request.uri().host());
        let hinted = headers.get(tenant_header).and_then(|v| v.to_str().ok());
        resolve_slug(host, &state.config.tenancy.base_domain, hinted)
    };

    let Some(slug) = slug else {
        metrics::record_tenant_resolution_failure("missing");
        return Err(AppError::MissingField {
            field: tenant_header.to_string(),
        });
    };

    let Some(tenant) = state.repo().find_tenant_by_slug(&slug).await? else {
        metrics::record_tenant_resolution_failure("unknown");
        return Err(AppError::TenantNotFound { slug });
    };

    if !tenant.is_active() {
        metrics::record_tenant_resolution_failure("suspended");
        tracing::warn!(tenant_id = %tenant.id, slug = %tenant.slug, "Request to suspended tenant");
        return Err(AppError::TenantSuspended { slug });
    }

    request.extensions_mut().insert(CurrentTenant(tenant));
    Ok(next.run(request).await)
}
