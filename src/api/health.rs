// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthHealth;
use crate::state::AppState;

/// Health check response with dependency status.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthReport {
    /// Always "available" when the process can answer.
    pub status: String,
    #[serde(rename = "application-details")]
    pub application_details: ApplicationDetails,
    pub dependencies: Dependencies,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApplicationDetails {
    pub version: String,
    pub environment: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Dependencies {
    pub database: DatabaseHealth,
}

/// Token database status as seen through the failure gate.
#[derive(Debug, Serialize, ToSchema)]
pub struct DatabaseHealth {
    /// "healthy" or "unhealthy"
    pub status: String,
    /// "OPEN" or "CLOSED"
    pub circuit_breaker_state: String,
    /// Current run of consecutive failures
    pub circuit_breaker_failures: u32,
    /// Failures recorded since process start
    pub circuit_breaker_total_failures: u64,
}

impl From<&AuthHealth> for DatabaseHealth {
    fn from(health: &AuthHealth) -> Self {
        Self {
            status: health.database.clone(),
            circuit_breaker_state: health.circuit_breaker_state.as_str().to_string(),
            circuit_breaker_failures: health.circuit_breaker_failures,
            circuit_breaker_total_failures: health.circuit_breaker_total_failures,
        }
    }
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Health check endpoint handler.
///
/// Returns 503 when the database ping fails or the failure gate is open.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthReport),
        (status = 503, description = "Token storage unavailable", body = HealthReport)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let auth_health = state.auth.health().await;

    let status = if auth_health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let report = HealthReport {
        status: "available".to_string(),
        application_details: ApplicationDetails {
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: state.environment.clone(),
        },
        dependencies: Dependencies {
            database: DatabaseHealth::from(&auth_health),
        },
    };

    (status, Json(report))
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
/// Does not check dependencies.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
