// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Failure Gate
//!
//! Circuit breaker wrapped around every call into the token storage engine.
//! A struggling engine trips the gate after a run of consecutive failures;
//! while open, calls are rejected before the operation is ever invoked, so
//! request handlers fail fast instead of piling up behind a dead dependency.
//!
//! ## State Machine
//!
//! ```text
//! ┌────────┐  5 consecutive failures  ┌──────┐  30 s cool-down  ┌──────────┐
//! │ Closed │ ───────────────────────→ │ Open │ ───────────────→ │ HalfOpen │
//! └────────┘                          └──────┘ ←─ probe fails ── └──────────┘
//!      ↑                                                              │
//!      └────────────────────── probe succeeds ─────────────────────────┘
//! ```
//!
//! The open → half-open transition is lazy: the first call after the
//! cool-down becomes the probe. Only one probe is admitted at a time, and
//! only the probe settles the half-open phase: a call admitted before the
//! latest transition still counts toward `total_failures` but never moves
//! the phase.
//!
//! ## Sharing
//!
//! One gate must guard every call site of the same engine. `FailureGate` is a
//! cheap handle (`Clone` shares the state), constructed once in `main` and
//! handed to the credential store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use utoipa::ToSchema;

/// Consecutive failures that trip the gate.
pub const DEFAULT_TRIP_THRESHOLD: u32 = 5;

/// How long the gate stays open before admitting a probe.
pub const DEFAULT_COOL_DOWN: Duration = Duration::from_secs(30);

/// Upper bound on a single guarded storage call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffered events per subscriber before slow receivers start lagging.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Tunables for a [`FailureGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    pub trip_threshold: u32,
    pub cool_down: Duration,
    pub call_timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            trip_threshold: DEFAULT_TRIP_THRESHOLD,
            cool_down: DEFAULT_COOL_DOWN,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Externally visible phase. Half-open is reported as `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatePhase {
    Closed,
    Open,
}

impl GatePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatePhase::Closed => "CLOSED",
            GatePhase::Open => "OPEN",
        }
    }
}

impl std::fmt::Display for GatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events published to monitoring subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    /// The gate opened (from closed, or after a failed probe).
    Tripped,
    /// The gate closed again after a successful probe or manual reset.
    Reset,
    /// A guarded call failed or timed out.
    Failed,
    /// The cool-down elapsed and a probe call was admitted.
    Ready,
}

/// Error returned by [`FailureGate::execute`].
#[derive(Debug, thiserror::Error)]
pub enum GateError<E> {
    /// Rejected without invoking the operation.
    #[error("storage gate is open")]
    Open,

    #[error("storage call timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error(transparent)]
    Operation(E),
}

/// Point-in-time view of the gate for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct GateSnapshot {
    pub phase: GatePhase,
    pub consecutive_failures: u32,
    /// Failures recorded since process start.
    pub total_failures: u64,
    /// Calls rejected while open.
    pub rejected_calls: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Closed,
    Open { since: Instant },
    /// A probe is in flight; everything else is rejected until it settles.
    HalfOpen,
}

#[derive(Debug)]
struct GateState {
    phase: Phase,
    /// Bumped on every phase change. An outcome only moves the phase if the
    /// call was admitted in the current generation.
    generation: u64,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    total_failures: u64,
    rejected_calls: u64,
}

impl GateState {
    fn transition(&mut self, phase: Phase) {
        self.phase = phase;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Outcome of the admission step, decided under the lock. `Pass` and
/// `Probe` carry the generation the call was admitted in.
enum Admission {
    Pass(u64),
    Probe(u64),
    Reject,
}

/// Re-opens the gate if a probe call is dropped before it settles, so a
/// cancelled caller cannot leave the gate half-open forever.
struct ProbeGuard<'a> {
    gate: &'a FailureGate,
    generation: u64,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        let reopened = {
            let mut state = self.gate.state.lock();
            if state.phase == Phase::HalfOpen && state.generation == self.generation {
                state.consecutive_failures = 0;
                state.transition(Phase::Open {
                    since: Instant::now(),
                });
                true
            } else {
                false
            }
        };
        if reopened {
            tracing::error!(
                cool_down_secs = self.gate.config.cool_down.as_secs(),
                "Storage failure gate OPENED - recovery probe abandoned"
            );
            self.gate.publish(GateEvent::Tripped);
        }
    }
}

/// Shared circuit breaker guarding the storage engine.
#[derive(Debug, Clone)]
pub struct FailureGate {
    config: GateConfig,
    state: Arc<Mutex<GateState>>,
    events: broadcast::Sender<GateEvent>,
}

impl FailureGate {
    pub fn new(config: GateConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        tracing::info!(
            trip_threshold = config.trip_threshold,
            cool_down_secs = config.cool_down.as_secs(),
            "Storage failure gate initialized"
        );
        Self {
            config,
            state: Arc::new(Mutex::new(GateState {
                phase: Phase::Closed,
                generation: 0,
                consecutive_failures: 0,
                last_failure: None,
                total_failures: 0,
                rejected_calls: 0,
            })),
            events,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Subscribe to gate events. Slow subscribers lag; they never block calls.
    pub fn subscribe(&self) -> broadcast::Receiver<GateEvent> {
        self.events.subscribe()
    }

    /// Run `operation` through the gate with the configured call timeout.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, GateError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute(operation, self.config.call_timeout).await
    }

    /// Run `operation` through the gate, bounded by `timeout`.
    ///
    /// When the gate is open and still cooling down the operation is never
    /// invoked and [`GateError::Open`] is returned immediately. A timeout
    /// counts as a failure, exactly like an error from the operation.
    pub async fn execute<F, Fut, T, E>(
        &self,
        operation: F,
        timeout: Duration,
    ) -> Result<T, GateError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let (generation, probe) = match self.admit() {
            Admission::Reject => {
                tracing::warn!("Storage call blocked - failure gate is OPEN");
                return Err(GateError::Open);
            }
            Admission::Probe(generation) => {
                self.publish(GateEvent::Ready);
                (generation, Some(ProbeGuard { gate: self, generation }))
            }
            Admission::Pass(generation) => (generation, None),
        };

        let outcome = tokio::time::timeout(timeout, operation()).await;
        // Settled: the outcome below decides the next phase.
        std::mem::forget(probe);

        match outcome {
            Ok(Ok(value)) => {
                self.record_success(generation);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record_failure(generation);
                Err(GateError::Operation(e))
            }
            Err(_) => {
                self.record_failure(generation);
                Err(GateError::TimedOut { after: timeout })
            }
        }
    }

    /// Current phase as seen by health checks.
    pub fn phase(&self) -> GatePhase {
        match self.state.lock().phase {
            Phase::Closed => GatePhase::Closed,
            Phase::Open { .. } | Phase::HalfOpen => GatePhase::Open,
        }
    }

    /// Current consecutive failure count.
    pub fn failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    /// Instant of the most recent recorded failure, if any.
    pub fn last_failure(&self) -> Option<Instant> {
        self.state.lock().last_failure
    }

    pub fn snapshot(&self) -> GateSnapshot {
        let state = self.state.lock();
        GateSnapshot {
            phase: match state.phase {
                Phase::Closed => GatePhase::Closed,
                _ => GatePhase::Open,
            },
            consecutive_failures: state.consecutive_failures,
            total_failures: state.total_failures,
            rejected_calls: state.rejected_calls,
        }
    }

    /// Force the gate closed and clear the failure counter.
    pub fn reset(&self) {
        let was_closed = {
            let mut state = self.state.lock();
            let was_closed = state.phase == Phase::Closed;
            // Outcomes of calls admitted before the reset no longer count.
            state.transition(Phase::Closed);
            state.consecutive_failures = 0;
            was_closed
        };
        tracing::info!("Storage failure gate manually reset");
        if !was_closed {
            self.publish(GateEvent::Reset);
        }
    }

    fn admit(&self) -> Admission {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Closed => Admission::Pass(state.generation),
            Phase::Open { since } => {
                if since.elapsed() >= self.config.cool_down {
                    state.transition(Phase::HalfOpen);
                    tracing::info!("Storage failure gate ready to test recovery");
                    Admission::Probe(state.generation)
                } else {
                    state.rejected_calls += 1;
                    Admission::Reject
                }
            }
            Phase::HalfOpen => {
                state.rejected_calls += 1;
                Admission::Reject
            }
        }
    }

    fn record_success(&self, generation: u64) {
        let closed = {
            let mut state = self.state.lock();
            if state.generation != generation {
                // Admitted before the last transition; the current phase
                // belongs to someone else.
                return;
            }
            state.consecutive_failures = 0;
            if state.phase == Phase::HalfOpen {
                state.transition(Phase::Closed);
                true
            } else {
                false
            }
        };
        if closed {
            tracing::info!("Storage failure gate CLOSED - service recovered");
            self.publish(GateEvent::Reset);
        }
    }

    fn record_failure(&self, generation: u64) {
        let tripped = {
            let mut state = self.state.lock();
            let now = Instant::now();
            state.total_failures += 1;
            state.last_failure = Some(now);
            if state.generation != generation {
                None
            } else {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                match state.phase {
                    Phase::Closed if state.consecutive_failures >= self.config.trip_threshold => {
                        let consecutive_failures = state.consecutive_failures;
                        state.transition(Phase::Open { since: now });
                        Some(consecutive_failures)
                    }
                    Phase::HalfOpen => {
                        state.consecutive_failures = 0;
                        state.transition(Phase::Open { since: now });
                        Some(1)
                    }
                    Phase::Closed | Phase::Open { .. } => None,
                }
            }
        };

        tracing::warn!("Storage operation failed - failure recorded");
        self.publish(GateEvent::Failed);

        if let Some(consecutive_failures) = tripped {
            tracing::error!(
                consecutive_failures,
                cool_down_secs = self.config.cool_down.as_secs(),
                "Storage failure gate OPENED due to failures"
            );
            self.publish(GateEvent::Tripped);
        }
    }

    fn publish(&self, event: GateEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}
