// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Token Storage Module
//!
//! Persistent storage for refresh credentials.
//!
//! ## Layers
//!
//! - `token_database` - the storage engine (redb) behind the
//!   [`RefreshTokenBackend`] trait
//! - `credentials` - [`CredentialStore`], the only entry point for callers,
//!   which routes every engine call through the shared failure gate
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   refresh_tokens.redb   # refresh_tokens + user and expiry indexes
//! ```

pub mod credentials;
pub mod token_database;

pub use credentials::{CredentialStore, StoreError, StoreResult};
pub use token_database::{
    RefreshCredential, RefreshTokenBackend, TokenDatabase, TokenDbError, TokenDbResult,
};
