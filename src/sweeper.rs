// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Expiry Sweeper
//!
//! Background task that deletes expired refresh credentials.
//!
//! ## Strategy
//!
//! Sweeps once immediately at startup, then every `interval` (default 24 h).
//! A failed sweep is logged and the loop keeps going; expired records are
//! rejected by validation anyway, so a missed sweep only costs disk space.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown. The
//! loop exits at the next wait point after cancellation.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::storage::CredentialStore;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Periodic expired-credential cleanup.
pub struct ExpirySweeper {
    store: CredentialStore,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(store: CredentialStore) -> Self {
        Self {
            store,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// let handle = tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Expiry sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Expiry sweeper shutting down");
                return;
            }

            self.sweep_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Expiry sweeper shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one sweep. Returns the number of deleted records, if any.
    async fn sweep_step(&self) -> Option<usize> {
        match self.store.delete_expired().await {
            Ok(0) => {
                debug!("Expiry sweeper: nothing to delete");
                Some(0)
            }
            Ok(deleted) => {
                info!(deleted, "Expiry sweeper: deleted expired refresh tokens");
                Some(deleted)
            }
            Err(e) => {
                warn!(error = %e, "Expiry sweeper: sweep failed");
                None
            }
        }
    }
}
