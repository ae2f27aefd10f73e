//! PledgeHub API Gateway
//!
//! The entry point for all external API requests.
//! Handles:
//! - Authentication and tenant resolution
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    extract::FromRef,
    http::HeaderName,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use pledgehub_common::{
    auth::JwtManager,
    config::AppConfig,
    db::{DbPool, Repository},
    metrics,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub jwt: Arc<JwtManager>,
}

impl AppState {
    pub fn repo(&self) -> Repository {
        Repository::new(self.db.clone())
    }
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("failed to load configuration")?;

    // Initialize tracing; RUST_LOG overrides the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.observability.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.observability.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(
        service = %config.observability.service_name,
        "Starting PledgeHub API Gateway v{}",
        pledgehub_common::VERSION
    );

    let jwt_secret = config
        .auth
        .jwt_secret
        .clone()
        .filter(|secret| !secret.is_empty())
        .context("auth.jwt_secret must be set")?;
    let request_id_header = HeaderName::try_from(config.auth.request_id_header.as_str())
        .context("auth.request_id_header is not a valid header name")?;

    // Initialize metrics
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .install()
        .context("failed to install Prometheus exporter")?;
    metrics::register_metrics();
    info!("Metrics exposed on {}", metrics_addr);

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;

    let config = Arc::new(config);
    let state = AppState {
        jwt: Arc::new(JwtManager::new(&jwt_secret, config.auth.jwt_expiration_secs)),
        config: config.clone(),
        db,
    };

    // Build the router
    let app = create_router(state, request_id_header);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server.host / server.port")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState, request_id_header: HeaderName) -> Router {
    use handlers::{admin, applications, auth, contributions, health, products, projects, tenants};

    let config = state.config.clone();

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::new(request_id_header.clone(), MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::new(request_id_header);

    // Platform administration (system admins only)
    let admin_routes = Router::new()
        .route("/applications", get(admin::list_applications))
        .route("/applications/{id}/approve", post(admin::approve_application))
        .route("/applications/{id}/reject", post(admin::reject_application))
        .route("/tenants", get(admin::list_tenants))
        .route("/tenants/{id}/suspend", post(admin::suspend_tenant))
        .route("/tenants/{id}/reactivate", post(admin::reactivate_tenant))
        .route("/tenants/{id}/fee", put(admin::set_tenant_fee))
        .route("/stats", get(admin::platform_stats));

    // Routes scoped to the tenant resolved from the host or header
    let tenant_routes = Router::new()
        .route("/", get(tenants::show_tenant))
        .route("/settings", put(tenants::update_settings))
        .route("/members", get(tenants::list_members).post(tenants::add_member))
        .route("/members/{user_id}/{role}", delete(tenants::remove_member))
        .route("/projects", get(projects::list_projects).post(projects::create_project))
        .route(
            "/projects/{id}",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/projects/{id}/transition", post(projects::transition_project))
        .route("/projects/{id}/summary", get(projects::project_summary))
        .route(
            "/projects/{id}/products",
            get(products::list_products).put(products::replace_products),
        )
        .route("/projects/{id}/invitations", post(projects::invite))
        .route("/invitations/accept", post(projects::accept_invitation))
        .route(
            "/projects/{id}/contributions",
            get(contributions::list_project_contributions).post(contributions::create_contribution),
        )
        .route("/contributions/mine", get(contributions::my_contributions))
        .route("/contributions/{id}", get(contributions::get_contribution))
        .route("/contributions/{id}/review", post(contributions::review_contribution))
        .route("/contributions/{id}/payments", post(contributions::record_payment))
        .route("/contributions/{id}/cancel", post(contributions::cancel_contribution))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::tenant::resolve_tenant,
        ));

    // API routes
    let api_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/applications", post(applications::submit_application))
        .route("/applications/mine", get(applications::my_applications))
        .route("/applications/{id}", get(applications::get_application))
        .nest("/admin", admin_routes)
        .nest("/t", tenant_routes);

    // Compose the app
    let app = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .nest("/v1", api_routes)
        .route_layer(from_fn(middleware::metrics::track_metrics));

    let app = if config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
        );
        app.layer(from_fn_with_state(limiter, middleware::rate_limit::rate_limit))
    } else {
        warn!("Rate limiting disabled");
        app
    };

    app.layer(TimeoutLayer::new(config.request_timeout()))
        .layer(ConcurrencyLimitLayer::new(config.server.max_concurrent_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use pledgehub_common::db::models::Tenant;
    use pledgehub_common::tenancy::TenantStatus;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
    use tower::ServiceExt;

    fn state_with(db: DatabaseConnection) -> AppState {
        let mut config = AppConfig::default();
        config.rate_limit.enabled = false;
        AppState {
            config: Arc::new(config),
            db: DbPool::from_connection(db),
            jwt: Arc::new(JwtManager::new("test_secret", 3600)),
        }
    }

    fn test_state() -> AppState {
        state_with(DatabaseConnection::Disconnected)
    }

    /// Router whose database answers one tenant lookup
    fn app_with_tenant(tenant: Option<Tenant>) -> Router {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([tenant.into_iter().collect::<Vec<_>>()])
            .into_connection();
        create_router(state_with(db), HeaderName::from_static("x-request-id"))
    }

    fn tenant(slug: &str, status: TenantStatus) -> Tenant {
        let now = chrono::Utc::now().into();
        Tenant {
            id: uuid::Uuid::new_v4(),
            name: "Acme".to_string(),
            slug: slug.to_string(),
            contact_email: "ops@acme.test".to_string(),
            status: status.as_str().to_string(),
            platform_fee_percent: rust_decimal::Decimal::new(500, 2),
            currency: "USD".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn tenant_request(host: &str) -> Request<Body> {
        Request::get("/v1/t/projects")
            .header("host", host)
            .body(Body::empty())
            .unwrap()
    }

    fn app() -> Router {
        create_router(test_state(), HeaderName::from_static("x-request-id"))
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "pledgehub");
    }

    #[tokio::test]
    async fn test_ready_reports_database_down() {
        let response = app()
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["status"], "not_ready");
        assert_eq!(body["checks"]["primary"]["up"], false);
        assert!(body["checks"].get("replica").is_none());
    }

    #[tokio::test]
    async fn test_me_requires_token() {
        let response = app()
            .oneshot(Request::get("/v1/auth/me").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_admin_routes_reject_non_admins() {
        let state = test_state();
        let token = state
            .jwt
            .generate_token(uuid::Uuid::new_v4(), "someone@example.org", false)
            .unwrap();
        let app = create_router(state, HeaderName::from_static("x-request-id"));

        let response = app
            .oneshot(
                Request::get("/v1/admin/stats")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_tenant_routes_need_a_tenant() {
        let response = app()
            .oneshot(
                Request::get("/v1/t/projects")
                    .header("host", "pledgehub.localhost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "MISSING_FIELD");
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_not_found() {
        let response = app_with_tenant(None)
            .oneshot(tenant_request("ghost.pledgehub.localhost"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "TENANT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_suspended_tenant_is_forbidden() {
        let response = app_with_tenant(Some(tenant("acme", TenantStatus::Suspended)))
            .oneshot(tenant_request("acme.pledgehub.localhost"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error"]["code"], "TENANT_SUSPENDED");
    }

    #[tokio::test]
    async fn test_reserved_subdomain_falls_back_to_header() {
        let response = app_with_tenant(Some(tenant("acme", TenantStatus::Suspended)))
            .oneshot(
                Request::get("/v1/t/projects")
                    .header("host", "api.pledgehub.localhost")
                    .header("x-tenant-slug", "acme")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["error"]["message"], "Tenant is suspended: acme");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = app()
            .oneshot(Request::get("/v2/projects").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
