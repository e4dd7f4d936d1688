// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle events for presentation layers.
//!
//! Collaborating code subscribes to these instead of polling session state:
//! `SessionInvalid` is the signal to drop UI-level identity and prompt for
//! re-authentication.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted by the session client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    LoggedIn { user_id: String, is_temporary: bool },
    LoggedOut,
    /// A refresh cycle installed a new token.
    Refreshed,
    /// A refresh cycle settled without a new token.
    RefreshFailed { reason: String },
    /// The backend rejected the session and recovery failed; the user must
    /// re-authenticate.
    SessionInvalid { message: String },
    PermissionDenied { path: String, message: String },
}

/// Create the event channel shared by all session components.
pub fn channel() -> broadcast::Sender<SessionEvent> {
    let (tx, _) = broadcast::channel(64);
    tx
}

/// Send an event, ignoring the no-subscriber case.
pub(crate) fn emit(tx: &broadcast::Sender<SessionEvent>, event: SessionEvent) {
    let _ = tx.send(event);
}
