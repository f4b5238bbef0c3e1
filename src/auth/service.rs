// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session lifecycle: login, refresh rotation, logout.
//!
//! Combines the [`TokenService`] (stateless signing) with the
//! [`CredentialStore`] (gate-guarded persistence). Handlers only talk to
//! this type.

use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{AccessClaims, AuthError, TokenPair, TokenService};
use crate::gate::GatePhase;
use crate::storage::{CredentialStore, RefreshCredential};

/// Database dependency status reported by the health endpoint.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct AuthHealth {
    /// "healthy" or "unhealthy"
    pub database: String,
    pub circuit_breaker_state: GatePhase,
    /// Current run of consecutive failures
    pub circuit_breaker_failures: u32,
    /// Failures recorded since process start
    pub circuit_breaker_total_failures: u64,
}

impl AuthHealth {
    pub fn is_healthy(&self) -> bool {
        self.database == "healthy" && self.circuit_breaker_state == GatePhase::Closed
    }
}

#[derive(Debug, Clone)]
pub struct AuthService {
    tokens: TokenService,
    store: CredentialStore,
}

impl AuthService {
    pub fn new(tokens: TokenService, store: CredentialStore) -> Self {
        Self { tokens, store }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Start a session for an already-authenticated user.
    pub async fn login(&self, user_id: Uuid) -> Result<TokenPair, AuthError> {
        let pair = self.tokens.issue_pair(user_id)?;
        self.store
            .create(
                user_id,
                pair.refresh_token.clone(),
                TokenService::refresh_expiry_horizon(),
            )
            .await?;
        info!(user_id = %user_id, "Session started");
        Ok(pair)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.tokens.verify(token)
    }

    /// Exchange a refresh token for a new pair. The presented value stops
    /// working as soon as this returns successfully.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::MissingRefreshToken);
        }

        let credential = self
            .store
            .validate(refresh_token)
            .await?
            .ok_or(AuthError::RefreshTokenNotFound)?;

        let pair = self.tokens.issue_pair(credential.user_id)?;
        let replacement = RefreshCredential::new(
            credential.user_id,
            pair.refresh_token.clone(),
            TokenService::refresh_expiry_horizon(),
        );

        if !self.store.rotate(refresh_token, replacement).await? {
            // Concurrent refresh with the same value won the rotation.
            warn!(user_id = %credential.user_id, "Refresh token rotated concurrently");
            return Err(AuthError::RefreshTokenNotFound);
        }

        info!(user_id = %credential.user_id, "Refresh token rotated");
        Ok(pair)
    }

    /// Revoke one refresh token. Unknown tokens are not an error.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::MissingRefreshToken);
        }
        let removed = self.store.revoke(refresh_token).await?;
        info!(removed, "Logout");
        Ok(())
    }

    /// Revoke every refresh token of `user_id`.
    pub async fn logout_everywhere(&self, user_id: Uuid) -> Result<usize, AuthError> {
        let revoked = self.store.revoke_all_for_user(user_id).await?;
        info!(user_id = %user_id, revoked, "Revoked all sessions");
        Ok(revoked)
    }

    /// Probe the token database through the gate.
    pub async fn health(&self) -> AuthHealth {
        let database = match self.store.ping().await {
            Ok(()) => "healthy",
            Err(e) => {
                warn!(error = %e, "Token database health check failed");
                "unhealthy"
            }
        };
        let snapshot = self.store.gate().snapshot();
        AuthHealth {
            database: database.to_string(),
            circuit_breaker_state: snapshot.phase,
            circuit_breaker_failures: snapshot.consecutive_failures,
            circuit_breaker_total_failures: snapshot.total_failures,
        }
    }
}
