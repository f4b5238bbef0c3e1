// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{AuthenticatedUser, TokenPair},
    state::AppState,
};

pub mod auth;
pub mod health;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/auth/refresh", post(auth::refresh_token))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/logout-all", post(auth::logout_all))
        .route("/auth/session", get(auth::session));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::refresh_token,
        auth::logout,
        auth::logout_all,
        auth::session,
        health::health,
        health::liveness
    ),
    components(
        schemas(
            TokenPair,
            AuthenticatedUser,
            auth::RefreshTokenRequest,
            auth::MessageResponse,
            auth::RevokeAllResponse,
            health::HealthReport,
            health::ApplicationDetails,
            health::Dependencies,
            health::DatabaseHealth,
            health::HealthResponse
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "Auth", description = "Session refresh and revocation"),
        (name = "Health", description = "Liveness and dependency status")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::{
        auth::{AuthService, TokenService},
        gate::{FailureGate, GateConfig},
        state::AppState,
        storage::{CredentialStore, TokenDatabase},
    };

    pub(crate) fn test_state() -> (AppState, TempDir) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db = TokenDatabase::open(&dir.path().join("tokens.redb")).unwrap();
        let store = CredentialStore::new(Arc::new(db), FailureGate::new(GateConfig::default()));
        let tokens = TokenService::new(Some("api-test-secret".to_string()));
        (AppState::new(AuthService::new(tokens, store), "test"), dir)
    }
}
