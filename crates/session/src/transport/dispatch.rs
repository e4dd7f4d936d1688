// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request dispatch with transparent recovery from expired sessions.
//!
//! Every outbound call goes through [`RequestDispatcher::dispatch`], which
//! attaches credentials, normalizes transport failures into envelopes, and on
//! `AUTH_FAILED` refreshes the session and replays the call once.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::credential::refresh::RefreshCoordinator;
use crate::credential::PublicPaths;
use crate::envelope::Envelope;
use crate::error::Classification;
use crate::events::{self, SessionEvent};
use crate::state::SessionState;
use crate::transport::{ApiRequest, Transport};

/// Message surfaced with `SessionInvalid` when the backend sent none.
const SESSION_EXPIRED_MSG: &str = "session expired, please log in again";

/// Per-call options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Never attach credentials or attempt recovery, whatever the path.
    pub is_public: bool,
}

impl RequestOptions {
    pub fn public() -> Self {
        Self { is_public: true }
    }
}

/// Wraps every backend call for one session.
#[derive(Clone)]
pub struct RequestDispatcher {
    session: Arc<SessionState>,
    coordinator: Arc<RefreshCoordinator>,
    transport: Arc<dyn Transport>,
    public_paths: PublicPaths,
    events: broadcast::Sender<SessionEvent>,
}

impl RequestDispatcher {
    pub fn new(
        session: Arc<SessionState>,
        coordinator: Arc<RefreshCoordinator>,
        transport: Arc<dyn Transport>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self { session, coordinator, transport, public_paths: PublicPaths::default(), events }
    }

    /// Replace the credential-free allow-list.
    pub fn with_public_paths(mut self, public_paths: PublicPaths) -> Self {
        self.public_paths = public_paths;
        self
    }

    /// Execute one logical call.
    ///
    /// Always returns a well-formed envelope. A single call triggers at most
    /// one refresh and at most one retry.
    pub async fn dispatch<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Envelope<T> {
        let public = options.is_public || self.public_paths.is_public(path);
        let (sent_token, epoch) = match self.session.token_with_epoch() {
            (_, epoch) if public => (None, epoch),
            current => current,
        };

        let envelope = match self.send(&method, path, &body, sent_token.clone()).await {
            Ok(envelope) => envelope,
            Err(envelope) => return envelope.without_data(),
        };

        match envelope.classify() {
            Classification::AuthFailed if !public => {}
            Classification::PermissionDenied => {
                tracing::warn!(path, msg = %envelope.message, "permission denied");
                events::emit(
                    &self.events,
                    SessionEvent::PermissionDenied {
                        path: path.to_owned(),
                        message: envelope.message.clone(),
                    },
                );
                return envelope.decode();
            }
            _ => return envelope.decode(),
        }

        // A request is never replayed under a different identity.
        if self.session.epoch() != epoch {
            tracing::debug!(path, "session replaced since request was sent, not replaying");
            return envelope.decode();
        }

        tracing::debug!(path, "session rejected, attempting recovery");
        if !self.recover(sent_token.as_deref()).await {
            self.invalidate(path, sent_token.as_deref(), epoch, &envelope.message);
            return envelope.decode();
        }

        // Replay once with the now-current token; its outcome is final.
        let (retry_token, current_epoch) = self.session.token_with_epoch();
        if current_epoch != epoch {
            tracing::debug!(path, "session replaced during recovery, not replaying");
            return envelope.decode();
        }
        match self.send(&method, path, &body, retry_token).await {
            Ok(envelope) => {
                if envelope.classify() == Classification::AuthFailed {
                    tracing::warn!(path, "session rejected again after refresh, not retrying");
                }
                envelope.decode()
            }
            Err(envelope) => envelope.without_data(),
        }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Option<&impl Serialize>,
    ) -> Envelope<T> {
        self.with_body(Method::GET, path, params, RequestOptions::default()).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Envelope<T> {
        self.with_body(Method::POST, path, body, RequestOptions::default()).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Envelope<T> {
        self.with_body(Method::PUT, path, body, RequestOptions::default()).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Envelope<T> {
        self.with_body(Method::DELETE, path, body, RequestOptions::default()).await
    }

    /// Serialize `body` and dispatch.
    pub async fn with_body<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
        options: RequestOptions,
    ) -> Envelope<T> {
        let body = match body.map(serde_json::to_value).transpose() {
            Ok(body) => body,
            Err(e) => return Envelope::internal_error(format!("invalid request body: {e}")),
        };
        self.dispatch(method, path, body, options).await
    }

    /// Execute one attempt. `Err` carries the normalized `INTERNAL_ERROR`
    /// envelope for a transport failure.
    async fn send(
        &self,
        method: &Method,
        path: &str,
        body: &Option<serde_json::Value>,
        bearer: Option<String>,
    ) -> Result<Envelope<serde_json::Value>, Envelope<serde_json::Value>> {
        let request =
            ApiRequest::new(method.clone(), path).with_body(body.clone()).with_bearer(bearer);
        self.transport.execute(request).await.map_err(|e| {
            tracing::warn!(%method, path, err = %e, "request failed");
            Envelope::internal_error(e.to_string())
        })
    }

    /// Get a usable token for the replay.
    ///
    /// Called only while the session epoch is unchanged, so a token differing
    /// from `sent_token` was rotated by a refresh of this same session and the
    /// replay uses it without a new refresh.
    async fn recover(&self, sent_token: Option<&str>) -> bool {
        let current = self.session.token();
        if current.is_some() && current.as_deref() != sent_token {
            tracing::debug!("token changed since request was sent, replaying");
            return true;
        }
        self.coordinator.request_refresh().await
    }

    /// Recovery failed: end the session the request was made with.
    fn invalidate(&self, path: &str, sent_token: Option<&str>, epoch: u64, message: &str) {
        let cleared = match sent_token {
            Some(token) => self.session.clear_if_token(token),
            None => self.session.epoch() == epoch,
        };
        if !cleared {
            // A concurrent call already ended this session, or a new one began.
            return;
        }
        tracing::warn!(path, "session invalid, re-authentication required");
        let message = if message.is_empty() { SESSION_EXPIRED_MSG } else { message };
        events::emit(&self.events, SessionEvent::SessionInvalid { message: message.to_owned() });
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
