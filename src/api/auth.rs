// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{Auth, AuthError, AuthenticatedUser, TokenPair},
    state::AppState,
};

/// Body of refresh and logout requests.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshTokenRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokeAllResponse {
    pub message: String,
    /// Number of refresh tokens deleted
    pub revoked: usize,
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshTokenRequest,
    tag = "Auth",
    responses(
        (
            status = 200,
            description = "New token pair; the presented refresh token is spent",
            body = TokenPair
        ),
        (status = 400, description = "Missing refresh token"),
        (status = 401, description = "Refresh token unknown, expired or already used"),
        (status = 503, description = "Token storage unavailable")
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(request): Json<RefreshTokenRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    let pair = state.auth.refresh(request.refresh_token.trim()).await?;
    Ok(Json(pair))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = RefreshTokenRequest,
    tag = "Auth",
    responses(
        (status = 200, body = MessageResponse),
        (status = 400, description = "Missing refresh token"),
        (status = 503, description = "Token storage unavailable")
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    Json(request): Json<RefreshTokenRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state.auth.logout(request.refresh_token.trim()).await?;
    Ok(Json(MessageResponse {
        message: "Token revoked successfully".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout-all",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = RevokeAllResponse),
        (status = 401, description = "Missing or invalid access token"),
        (status = 503, description = "Token storage unavailable")
    )
)]
pub async fn logout_all(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<RevokeAllResponse>, AuthError> {
    let revoked = state.auth.logout_everywhere(user.user_id).await?;
    Ok(Json(RevokeAllResponse {
        message: "All sessions revoked".to_string(),
        revoked,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = AuthenticatedUser),
        (status = 401, description = "Missing or invalid access token")
    )
)]
pub async fn session(Auth(user): Auth) -> Json<AuthenticatedUser> {
    Json(user)
}
