//! Liveness and readiness probes

use std::collections::BTreeMap;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use sea_orm::DatabaseConnection;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct Liveness {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct Readiness {
    pub status: &'static str,
    /// Keyed by connection: `primary`, plus `replica` when configured
    pub checks: BTreeMap<&'static str, Probe>,
}

#[derive(Serialize)]
pub struct Probe {
    pub up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Probe {
    async fn run(connection: &DatabaseConnection) -> Self {
        let started = Instant::now();
        match connection.ping().await {
            Ok(()) => Self {
                up: true,
                latency_ms: Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)),
                error: None,
            },
            Err(e) => Self {
                up: false,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

pub async fn health(State(state): State<AppState>) -> Json<Liveness> {
    Json(Liveness {
        status: "healthy",
        service: state.config.observability.service_name.clone(),
        version: pledgehub_common::VERSION,
    })
}

/// 503 until every database connection answers
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let mut checks = BTreeMap::new();
    checks.insert("primary", Probe::run(&state.db.primary).await);
    if let Some(replica) = &state.db.replica {
        checks.insert("replica", Probe::run(replica).await);
    }

    if checks.values().all(|probe| probe.up) {
        (StatusCode::OK, Json(Readiness { status: "ready", checks }))
    } else {
        tracing::warn!("Readiness check failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Readiness {
                status: "not_ready",
                checks,
            }),
        )
    }
}
