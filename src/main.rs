// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use broker_auth_server::{
    api::router,
    auth::{AuthService, TokenService},
    config::AppConfig,
    gate::{FailureGate, GateConfig},
    logging,
    state::AppState,
    storage::{CredentialStore, TokenDatabase},
    sweeper::ExpirySweeper,
};

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env();
    logging::init(config.log_format);
    info!(?config, "Starting broker auth server");

    let db_path = config.token_db_path();
    let database = TokenDatabase::open(&db_path).expect("Failed to open token database");
    info!(path = %db_path.display(), "Token database opened");

    // One gate shared by every storage call site.
    let gate = FailureGate::new(GateConfig::default());
    let store = CredentialStore::new(Arc::new(database), gate);

    let tokens = TokenService::new(config.jwt_secret.clone());
    if !tokens.has_secret() {
        warn!("JWT_SECRET is not set; token issuance and verification will fail");
    }

    let shutdown = CancellationToken::new();
    let sweeper = ExpirySweeper::new(store.clone()).with_interval(config.sweep_interval);
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    let state = AppState::new(AuthService::new(tokens, store), config.environment.clone());
    let app = router(state);

    let addr = config.bind_addr().expect("Failed to parse bind address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    info!(%addr, "Broker auth server listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("HTTP server failed");

    shutdown.cancel();
    if let Err(e) = sweeper_handle.await {
        warn!(error = %e, "Expiry sweeper task failed");
    }
    info!("Broker auth server stopped");
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                // Keep serving until cancelled some other way.
                shutdown.cancelled().await;
                return;
            }
            info!("Shutdown signal received");
        }
        _ = shutdown.cancelled() => {}
    }
}
