// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight session token refresh.
//!
//! At most one refresh call is outstanding at a time. Callers arriving while a
//! cycle is in flight are queued as waiters and receive that cycle's outcome.

use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::Method;
use tokio::sync::{broadcast, oneshot};

use crate::credential::{paths, RefreshTokenResponse};
use crate::events::{self, SessionEvent};
use crate::state::SessionState;
use crate::transport::{ApiRequest, Transport};

/// How a refresh cycle settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new token was installed.
    Refreshed,
    /// The backend answered without a usable token.
    Rejected,
    /// No envelope was obtained.
    Unreachable,
    /// The session changed (logout, re-login) while the call was in flight;
    /// the result was not applied.
    Discarded,
    /// There was no session to refresh; no call was made.
    NoSession,
}

impl RefreshOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Refreshed)
    }
}

enum RefreshCycle {
    Idle,
    Refreshing { waiters: Vec<oneshot::Sender<RefreshOutcome>> },
}

/// Owns the refresh lock and waiter queue for one session.
pub struct RefreshCoordinator {
    session: Arc<SessionState>,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<SessionEvent>,
    cycle: Mutex<RefreshCycle>,
}

impl RefreshCoordinator {
    pub fn new(
        session: Arc<SessionState>,
        transport: Arc<dyn Transport>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Arc<Self> {
        Arc::new(Self { session, transport, events, cycle: Mutex::new(RefreshCycle::Idle) })
    }

    /// Refresh the session token. Resolves `true` iff a new token was installed.
    pub async fn request_refresh(self: &Arc<Self>) -> bool {
        self.refresh().await.is_success()
    }

    /// Refresh the session token, reporting how the cycle settled.
    pub async fn refresh(self: &Arc<Self>) -> RefreshOutcome {
        let Some(token) = self.session.token() else {
            return RefreshOutcome::NoSession;
        };

        let (tx, rx) = oneshot::channel();
        let leader = {
            let mut cycle = self.cycle.lock();
            match &mut *cycle {
                RefreshCycle::Refreshing { waiters } => {
                    waiters.push(tx);
                    false
                }
                RefreshCycle::Idle => {
                    *cycle = RefreshCycle::Refreshing { waiters: vec![tx] };
                    true
                }
            }
        };

        if leader {
            // The call runs detached so a dropped caller cannot strand the
            // cycle in `Refreshing`.
            let coordinator = Arc::clone(self);
            tokio::spawn(async move { coordinator.run_cycle(token).await });
        } else {
            tracing::debug!("refresh in flight, waiting for its outcome");
        }

        rx.await.unwrap_or(RefreshOutcome::Unreachable)
    }

    /// Whether a refresh call is currently outstanding.
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.cycle.lock(), RefreshCycle::Refreshing { .. })
    }

    /// Number of callers suspended on the current cycle.
    pub fn waiter_count(&self) -> usize {
        match &*self.cycle.lock() {
            RefreshCycle::Refreshing { waiters } => waiters.len(),
            RefreshCycle::Idle => 0,
        }
    }

    async fn run_cycle(&self, token: String) {
        let outcome = self.call_refresh(&token).await;

        let waiters = match std::mem::replace(&mut *self.cycle.lock(), RefreshCycle::Idle) {
            RefreshCycle::Refreshing { waiters } => waiters,
            RefreshCycle::Idle => Vec::new(),
        };
        tracing::debug!(waiters = waiters.len(), ?outcome, "refresh cycle settled");
        for waiter in waiters {
            let _ = waiter.send(outcome);
        }
    }

    /// Issue the refresh call and apply its result to the session.
    ///
    /// Failure never clears the session: whether to log out is decided by the
    /// caller that saw the session rejected.
    async fn call_refresh(&self, token: &str) -> RefreshOutcome {
        let request =
            ApiRequest::new(Method::POST, paths::REFRESH_TOKEN).with_bearer(Some(token.to_owned()));

        let envelope = match self.transport.execute(request).await {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(err = %e, "token refresh request failed");
                events::emit(
                    &self.events,
                    SessionEvent::RefreshFailed { reason: e.to_string() },
                );
                return RefreshOutcome::Unreachable;
            }
        };

        let envelope = envelope.decode::<RefreshTokenResponse>();
        let refreshed = match envelope.data {
            Some(data) if envelope.code == 0 && !data.token.is_empty() => data,
            _ => {
                tracing::warn!(code = envelope.code, msg = %envelope.message, "token refresh rejected");
                let reason = if envelope.message.is_empty() {
                    format!("refresh rejected with code {}", envelope.code)
                } else {
                    envelope.message
                };
                events::emit(&self.events, SessionEvent::RefreshFailed { reason });
                return RefreshOutcome::Rejected;
            }
        };

        if self.session.replace_token_if(token, refreshed.into()) {
            tracing::info!("session token refreshed");
            events::emit(&self.events, SessionEvent::Refreshed);
            RefreshOutcome::Refreshed
        } else {
            tracing::info!("session changed during refresh, discarding new token");
            RefreshOutcome::Discarded
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
