// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use broker_auth_server::{
    api::router,
    auth::{AuthService, TokenService},
    gate::{FailureGate, GateConfig},
    state::AppState,
    storage::{
        CredentialStore, RefreshCredential, RefreshTokenBackend, TokenDatabase, TokenDbError,
        TokenDbResult,
    },
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    app: Router,
    auth: Arc<AuthService>,
    _dir: TempDir,
}

fn test_app() -> TestApp {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db = TokenDatabase::open(&dir.path().join("refresh_tokens.redb")).unwrap();
    let store = CredentialStore::new(Arc::new(db), FailureGate::new(GateConfig::default()));
    let tokens = TokenService::new(Some("http-test-secret".to_string()));
    let state = AppState::new(AuthService::new(tokens, store), "test");
    TestApp {
        auth: Arc::clone(&state.auth),
        app: router(state),
        _dir: dir,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_bearer(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn refresh_returns_new_pair_and_rejects_replay() {
    let t = test_app();
    let pair = t.auth.login(Uuid::new_v4()).await.unwrap();

    let (status, body) = send(
        &t.app,
        post_json("/v1/auth/refresh", json!({ "refresh_token": pair.refresh_token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 600);
    let next_refresh = body["refresh_token"].as_str().unwrap();
    assert_eq!(next_refresh.len(), 64);
    assert_ne!(next_refresh, pair.refresh_token);
    let claims = t.auth.verify_access(body["access_token"].as_str().unwrap()).unwrap();
    assert!(claims.exp > claims.iat);

    let (status, body) = send(
        &t.app,
        post_json("/v1/auth/refresh", json!({ "refresh_token": pair.refresh_token })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized", "error_code": "unauthorized" }));
}

#[tokio::test]
async fn refresh_without_token_is_bad_request() {
    let t = test_app();
    let (status, body) = send(&t.app, post_json("/v1/auth/refresh", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "missing_refresh_token");
}

#[tokio::test]
async fn logout_revokes_refresh_token() {
    let t = test_app();
    let pair = t.auth.login(Uuid::new_v4()).await.unwrap();

    let (status, body) = send(
        &t.app,
        post_json("/v1/auth/logout", json!({ "refresh_token": pair.refresh_token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Token revoked successfully");

    let (status, _) = send(
        &t.app,
        post_json("/v1/auth/refresh", json!({ "refresh_token": pair.refresh_token })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_requires_valid_access_token() {
    let t = test_app();
    let user = Uuid::new_v4();
    let pair = t.auth.login(user).await.unwrap();

    let (status, body) = send(
        &t.app,
        with_bearer("GET", "/v1/auth/session", &pair.access_token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user.to_string());

    let request = Request::builder()
        .uri("/v1/auth/session")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "missing_auth_header");

    let (status, body) = send(&t.app, with_bearer("GET", "/v1/auth/session", "garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "unauthorized");
}

#[tokio::test]
async fn logout_all_revokes_every_session() {
    let t = test_app();
    let user = Uuid::new_v4();
    let first = t.auth.login(user).await.unwrap();
    let second = t.auth.login(user).await.unwrap();

    let (status, body) = send(
        &t.app,
        with_bearer("POST", "/v1/auth/logout-all", &second.access_token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], 2);

    for token in [first.refresh_token, second.refresh_token] {
        let (status, _) = send(
            &t.app,
            post_json("/v1/auth/refresh", json!({ "refresh_token": token })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn health_reports_database_dependency() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "available");
    assert_eq!(body["application-details"]["environment"], "test");
    assert_eq!(body["dependencies"]["database"]["status"], "healthy");
    assert_eq!(body["dependencies"]["database"]["circuit_breaker_state"], "CLOSED");

    let (status, body) = send(
        &t.app,
        Request::builder().uri("/health/live").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

struct DownBackend;

impl RefreshTokenBackend for DownBackend {
    fn insert(&self, _: &RefreshCredential) -> TokenDbResult<()> {
        Err(TokenDbError::Unavailable("down".into()))
    }
    fn find_active(&self, _: &str) -> TokenDbResult<Option<RefreshCredential>> {
        Err(TokenDbError::Unavailable("down".into()))
    }
    fn remove(&self, _: &str) -> TokenDbResult<bool> {
        Err(TokenDbError::Unavailable("down".into()))
    }
    fn remove_all_for_user(&self, _: Uuid) -> TokenDbResult<usize> {
        Err(TokenDbError::Unavailable("down".into()))
    }
    fn remove_expired(&self) -> TokenDbResult<usize> {
        Err(TokenDbError::Unavailable("down".into()))
    }
    fn replace(&self, _: &str, _: &RefreshCredential) -> TokenDbResult<bool> {
        Err(TokenDbError::Unavailable("down".into()))
    }
    fn ping(&self) -> TokenDbResult<()> {
        Err(TokenDbError::Unavailable("down".into()))
    }
}

#[tokio::test]
async fn failing_storage_surfaces_as_503() {
    let store = CredentialStore::new(
        Arc::new(DownBackend),
        FailureGate::new(GateConfig::default()),
    );
    let tokens = TokenService::new(Some("http-test-secret".to_string()));
    let app = router(AppState::new(AuthService::new(tokens, store), "test"));

    for _ in 0..5 {
        let (status, body) = send(
            &app,
            post_json("/v1/auth/refresh", json!({ "refresh_token": "abc" })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error_code"], "service_unavailable");
    }

    let (status, body) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["dependencies"]["database"]["status"], "unhealthy");
    assert_eq!(body["dependencies"]["database"]["circuit_breaker_state"], "OPEN");
    assert_eq!(body["dependencies"]["database"]["circuit_breaker_failures"], 5);
    assert_eq!(body["dependencies"]["database"]["circuit_breaker_total_failures"], 5);
}

#[tokio::test]
async fn responses_carry_request_id_and_docs_are_served() {
    let t = test_app();
    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));

    let (status, body) = send(
        &t.app,
        Request::builder()
            .uri("/api-doc/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"].get("/v1/auth/refresh").is_some());
}
