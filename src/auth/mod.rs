// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Session tokens for the broker platform.
//!
//! ## Auth Flow
//!
//! 1. A caller that has already checked the user's credentials calls
//!    [`AuthService::login`] and receives a [`TokenPair`]
//! 2. Clients send `Authorization: Bearer <access token>` on every request;
//!    the [`Auth`] extractor verifies it without touching storage
//! 3. Before the access token expires, the client posts its refresh token to
//!    `/v1/auth/refresh` and gets a new pair; the old refresh value is dead
//! 4. Logout revokes one refresh token; logout-all revokes every one the
//!    user holds
//!
//! ## Security
//!
//! - Access tokens: HS256 only, issuer `broker-platform`, no clock skew
//! - Refresh tokens: 256 bits from the system CSPRNG, single use
//! - Every verification failure renders the same 401 body

pub mod claims;
pub mod error;
pub mod extractor;
pub mod service;
pub mod tokens;

pub use claims::{AccessClaims, AuthenticatedUser};
pub use error::AuthError;
pub use extractor::Auth;
pub use service::{AuthHealth, AuthService};
pub use tokens::{TokenPair, TokenService, ACCESS_TOKEN_TTL, REFRESH_TOKEN_TTL, TOKEN_ISSUER};
