// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proactive background refresh while a session is active.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::credential::refresh::RefreshCoordinator;
use crate::state::{epoch_secs, SessionState};

/// Shortest wait between proactive refreshes once expiry is imminent.
const MIN_PROACTIVE_DELAY: Duration = Duration::from_secs(5);

/// When the scheduler fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Every `interval`, regardless of token lifetime.
    Fixed { interval: Duration },
    /// `margin` before the session's advisory expiry; every `fallback` while
    /// expiry is unknown.
    BeforeExpiry { margin: Duration, fallback: Duration },
}

impl RefreshPolicy {
    /// Delay until the next tick, given the session expiry and the current
    /// epoch second.
    pub fn next_delay(&self, expires_at: Option<u64>, now: u64) -> Duration {
        match *self {
            Self::Fixed { interval } => interval,
            Self::BeforeExpiry { margin, fallback } => match expires_at {
                Some(expires_at) => {
                    let refresh_at = expires_at.saturating_sub(margin.as_secs());
                    Duration::from_secs(refresh_at.saturating_sub(now)).max(MIN_PROACTIVE_DELAY)
                }
                None => fallback,
            },
        }
    }
}

/// Recurring refresh timer. At most one timer runs at a time.
pub struct BackgroundScheduler {
    coordinator: Arc<RefreshCoordinator>,
    session: Arc<SessionState>,
    policy: RefreshPolicy,
    timer: Mutex<Option<CancellationToken>>,
}

impl BackgroundScheduler {
    pub fn new(
        coordinator: Arc<RefreshCoordinator>,
        session: Arc<SessionState>,
        policy: RefreshPolicy,
    ) -> Arc<Self> {
        Arc::new(Self { coordinator, session, policy, timer: Mutex::new(None) })
    }

    /// Start the timer, replacing any running one.
    pub fn start(&self) {
        let cancel = CancellationToken::new();
        if let Some(prev) = self.timer.lock().replace(cancel.clone()) {
            prev.cancel();
        }
        tracing::debug!(policy = ?self.policy, "refresh timer started");
        tokio::spawn(run_timer(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.session),
            self.policy,
            cancel,
        ));
    }

    /// Cancel the timer. No-op when not running.
    pub fn stop(&self) {
        if let Some(cancel) = self.timer.lock().take() {
            cancel.cancel();
            tracing::debug!("refresh timer stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.lock().as_ref().is_some_and(|c| !c.is_cancelled())
    }

    /// Spawn the lifecycle task: `start()` whenever a token is set, `stop()`
    /// when the session is cleared. Runs until `shutdown`.
    pub fn watch_session(self: &Arc<Self>, shutdown: CancellationToken) {
        let scheduler = Arc::clone(self);
        let mut rx = self.session.subscribe();
        tokio::spawn(async move {
            if rx.borrow_and_update().is_some() {
                scheduler.start();
            }
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                if rx.borrow_and_update().is_some() {
                    scheduler.start();
                } else {
                    scheduler.stop();
                }
            }
            scheduler.stop();
        });
    }
}

async fn run_timer(
    coordinator: Arc<RefreshCoordinator>,
    session: Arc<SessionState>,
    policy: RefreshPolicy,
    cancel: CancellationToken,
) {
    loop {
        let delay = policy.next_delay(session.expires_at(), epoch_secs());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        if !session.is_logged_in() {
            tracing::debug!("no session, refresh timer exiting");
            cancel.cancel();
            break;
        }

        // A failed proactive refresh is not fatal; the next rejected request
        // recovers reactively.
        tokio::select! {
            _ = cancel.cancelled() => break,
            refreshed = coordinator.request_refresh() => {
                tracing::debug!(refreshed, "proactive refresh tick");
            }
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
