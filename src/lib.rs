// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Broker Auth Server - session tokens for the broker platform
//!
//! Issues short-lived access tokens and single-use refresh tokens, persists
//! refresh credentials in an embedded database, and keeps serving fast
//! failures when that database misbehaves.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Token issuance, verification and session lifecycle
//! - `gate` - Failure gate (circuit breaker) around token storage
//! - `storage` - Refresh credential persistence (redb)
//! - `sweeper` - Background deletion of expired credentials

pub mod api;
pub mod auth;
pub mod config;
pub mod gate;
pub mod logging;
pub mod state;
pub mod storage;
pub mod sweeper;
