// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::AuthService;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    /// Deployment label reported by `/health`.
    pub environment: String,
}

impl AppState {
    pub fn new(auth: AuthService, environment: impl Into<String>) -> Self {
        Self {
            auth: Arc::new(auth),
            environment: environment.into(),
        }
    }
}
