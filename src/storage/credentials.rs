// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Refresh-credential store.
//!
//! Every operation is exactly one storage interaction, executed on the
//! blocking pool and routed through the shared [`FailureGate`]. Callers see
//! [`StoreError::ServiceUnavailable`] while the gate is open and never need
//! to know about the gate directly.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error};
use uuid::Uuid;

use super::token_database::{
    RefreshCredential, RefreshTokenBackend, TokenDbError, TokenDbResult,
};
use crate::gate::{FailureGate, GateError};

/// Error type for credential store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The failure gate is open; retry later.
    #[error("authentication service temporarily unavailable")]
    ServiceUnavailable,

    #[error("token storage timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Backend(#[from] TokenDbError),
}

impl StoreError {
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, StoreError::ServiceUnavailable)
    }
}

impl From<GateError<TokenDbError>> for StoreError {
    fn from(e: GateError<TokenDbError>) -> Self {
        match e {
            GateError::Open => StoreError::ServiceUnavailable,
            GateError::TimedOut { after } => StoreError::TimedOut(after),
            GateError::Operation(inner) => StoreError::Backend(inner),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Gate-guarded operations on refresh-credential records.
///
/// Holds no in-memory copies; the storage engine owns every row.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn RefreshTokenBackend>,
    gate: FailureGate,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("gate", &self.gate.snapshot())
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn RefreshTokenBackend>, gate: FailureGate) -> Self {
        Self { backend, gate }
    }

    /// The gate shared by every call site of this store.
    pub fn gate(&self) -> &FailureGate {
        &self.gate
    }

    /// Insert a new refresh credential.
    pub async fn create(
        &self,
        user_id: Uuid,
        token: String,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<RefreshCredential> {
        let credential = RefreshCredential::new(user_id, token, expires_at);
        let record = credential.clone();
        self.guarded("create refresh token", move |backend| {
            backend.insert(&record)
        })
        .await?;
        Ok(credential)
    }

    /// Look up an unexpired credential by token value.
    ///
    /// `Ok(None)` means absent or expired; the two are indistinguishable.
    pub async fn validate(&self, token: &str) -> StoreResult<Option<RefreshCredential>> {
        let token = token.to_owned();
        self.guarded("validate refresh token", move |backend| {
            backend.find_active(&token)
        })
        .await
    }

    /// Delete one credential. Deleting an unknown token is not an error.
    pub async fn revoke(&self, token: &str) -> StoreResult<bool> {
        let token = token.to_owned();
        self.guarded("revoke refresh token", move |backend| backend.remove(&token))
            .await
    }

    /// Delete every credential owned by `user_id`.
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> StoreResult<usize> {
        self.guarded("revoke all user refresh tokens", move |backend| {
            backend.remove_all_for_user(user_id)
        })
        .await
    }

    /// Delete every credential whose expiry has passed.
    pub async fn delete_expired(&self) -> StoreResult<usize> {
        self.guarded("cleanup expired tokens", |backend| backend.remove_expired())
            .await
    }

    /// Swap an active `old_token` for `replacement` in one transaction.
    ///
    /// Returns `false` when `old_token` was no longer valid (already rotated,
    /// revoked, or expired).
    pub async fn rotate(
        &self,
        old_token: &str,
        replacement: RefreshCredential,
    ) -> StoreResult<bool> {
        let old_token = old_token.to_owned();
        self.guarded("rotate refresh token", move |backend| {
            backend.replace(&old_token, &replacement)
        })
        .await
    }

    /// Connectivity check through the gate.
    pub async fn ping(&self) -> StoreResult<()> {
        self.guarded("ping token database", |backend| backend.ping())
            .await
    }

    async fn guarded<T, F>(&self, operation: &'static str, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RefreshTokenBackend) -> TokenDbResult<T> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let result = self
            .gate
            .call(move || async move {
                match tokio::task::spawn_blocking(move || f(backend.as_ref())).await {
                    Ok(result) => result,
                    Err(e) => Err(TokenDbError::Task(e.to_string())),
                }
            })
            .await;

        match result {
            Ok(value) => {
                debug!(operation, "Token storage call succeeded");
                Ok(value)
            }
            Err(GateError::Open) => {
                error!(operation, "Token storage call blocked by failure gate");
                Err(StoreError::ServiceUnavailable)
            }
            Err(e) => {
                error!(operation, error = %e, "Token storage call failed");
                Err(e.into())
            }
        }
    }
}
