// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Verification failures keep their precise kind for logs, but every one of
//! them renders the same `401 unauthorized` body so a client cannot tell an
//! expired token from a forged one or from a refresh value that never existed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::storage::StoreError;

/// Authentication error type.
#[derive(Debug)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Invalid authorization header format
    InvalidAuthHeader,
    /// Refresh request without a refresh token
    MissingRefreshToken,
    /// Token is structurally unparsable
    MalformedToken,
    /// MAC does not verify, or the token names an unexpected algorithm or issuer
    InvalidSignature,
    /// Token has expired
    TokenExpired,
    /// Refresh value absent, expired or already rotated
    RefreshTokenNotFound,
    /// Token storage is tripped or failing
    ServiceUnavailable,
    /// Signing secret missing (fatal precondition)
    ConfigError(String),
    /// Secure random source failed (fatal precondition)
    EntropyUnavailable,
    /// Internal error
    InternalError(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Whether this is a credential-verification failure.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::MalformedToken
                | AuthError::InvalidSignature
                | AuthError::TokenExpired
                | AuthError::RefreshTokenNotFound
        )
    }

    /// Get the client-facing error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MissingRefreshToken => "missing_refresh_token",
            AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::RefreshTokenNotFound => "unauthorized",
            AuthError::ServiceUnavailable => "service_unavailable",
            AuthError::ConfigError(_)
            | AuthError::EntropyUnavailable
            | AuthError::InternalError(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::RefreshTokenNotFound => StatusCode::UNAUTHORIZED,
            AuthError::MissingRefreshToken => StatusCode::BAD_REQUEST,
            AuthError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::ConfigError(_)
            | AuthError::EntropyUnavailable
            | AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client.
    fn public_message(&self) -> String {
        if self.is_unauthorized() {
            return "Unauthorized".to_string();
        }
        match self {
            AuthError::ServiceUnavailable => {
                "Authentication service temporarily unavailable, retry later".to_string()
            }
            AuthError::ConfigError(_)
            | AuthError::EntropyUnavailable
            | AuthError::InternalError(_) => "Internal authentication error".to_string(),
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "Authorization header is required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::MissingRefreshToken => write!(f, "Refresh token is required"),
            AuthError::MalformedToken => write!(f, "Token is malformed"),
            AuthError::InvalidSignature => write!(f, "Token signature is invalid"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::RefreshTokenNotFound => write!(f, "Refresh token not found or expired"),
            AuthError::ServiceUnavailable => {
                write!(f, "Authentication service temporarily unavailable")
            }
            AuthError::ConfigError(msg) => write!(f, "Configuration error: {msg}"),
            AuthError::EntropyUnavailable => write!(f, "Secure random source unavailable"),
            AuthError::InternalError(msg) => write!(f, "Internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<StoreError> for AuthError {
    fn from(_: StoreError) -> Self {
        // The store already logged the engine-specific cause.
        AuthError::ServiceUnavailable
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.public_message(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
