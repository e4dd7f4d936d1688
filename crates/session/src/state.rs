// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-held session: the current token and the identity it belongs to.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// An authenticated session.
///
/// Logged-out is represented by the absence of a `Session`, so a missing token
/// can never carry an expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub is_temporary: bool,
    /// Advisory expiry as epoch seconds. `None` means unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

/// Identity of the current user. Blank when logged out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub user_id: String,
    pub display_name: String,
}

/// Fields a refresh response may carry alongside the new token.
#[derive(Debug, Clone, Default)]
pub struct RefreshedToken {
    pub token: String,
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub expires_at: Option<u64>,
}

/// Shared session container.
///
/// Every mutation is a single replacement of the whole value, so readers never
/// see a half-updated session. Transitions are observable via [`subscribe`].
///
/// The epoch counts identity changes: it advances on every login and logout
/// but not when a refresh rotates the token of the same session.
///
/// [`subscribe`]: SessionState::subscribe
pub struct SessionState {
    tx: watch::Sender<Option<Session>>,
    // Advanced and read under the watch lock.
    epoch: AtomicU64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::restore(None)
    }

    /// Build state seeded with a previously persisted session.
    pub fn restore(session: Option<Session>) -> Self {
        let (tx, _) = watch::channel(session);
        Self { tx, epoch: AtomicU64::new(0) }
    }

    /// Replace the whole session (login, registration, guest identity).
    pub fn set(&self, session: Session) {
        self.tx.send_modify(|current| {
            self.epoch.fetch_add(1, Ordering::Relaxed);
            *current = Some(session);
        });
    }

    /// Log out. Returns whether a session was present.
    pub fn clear(&self) -> bool {
        let mut cleared = false;
        self.tx.send_modify(|current| {
            if current.take().is_some() {
                self.epoch.fetch_add(1, Ordering::Relaxed);
                cleared = true;
            }
        });
        cleared
    }

    pub fn is_logged_in(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn current_user(&self) -> CurrentUser {
        match self.tx.borrow().as_ref() {
            Some(s) => CurrentUser { user_id: s.user_id.clone(), display_name: s.display_name.clone() },
            None => CurrentUser::default(),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|s| s.token.clone())
    }

    /// Identity epoch of the current session.
    pub fn epoch(&self) -> u64 {
        let _guard = self.tx.borrow();
        self.epoch.load(Ordering::Relaxed)
    }

    /// The current token together with the epoch it belongs to.
    pub fn token_with_epoch(&self) -> (Option<String>, u64) {
        let current = self.tx.borrow();
        (current.as_ref().map(|s| s.token.clone()), self.epoch.load(Ordering::Relaxed))
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.tx.borrow().as_ref().and_then(|s| s.expires_at)
    }

    pub fn snapshot(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    /// Observe every set/clear.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }

    /// Install a refreshed token, but only if the session still holds
    /// `expected`. Identity fields are kept unless the refresh overrides them.
    pub(crate) fn replace_token_if(&self, expected: &str, refreshed: RefreshedToken) -> bool {
        self.tx.send_if_modified(|current| match current {
            Some(s) if s.token == expected => {
                s.token = refreshed.token;
                if let Some(user_id) = refreshed.user_id {
                    s.user_id = user_id;
                }
                if let Some(display_name) = refreshed.display_name {
                    s.display_name = display_name;
                }
                s.expires_at = refreshed.expires_at;
                true
            }
            _ => false,
        })
    }

    /// Clear the session only if it still holds `expected`.
    pub(crate) fn clear_if_token(&self, expected: &str) -> bool {
        self.tx.send_if_modified(|current| match current {
            Some(s) if s.token == expected => {
                *current = None;
                self.epoch.fetch_add(1, Ordering::Relaxed);
                true
            }
            _ => false,
        })
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Return current epoch seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
