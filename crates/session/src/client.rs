// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session client: one instance of every session component, wired together.

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::credential::persist;
use crate::credential::refresh::RefreshCoordinator;
use crate::credential::scheduler::BackgroundScheduler;
use crate::credential::{
    paths, AuthResponse, LoginRequest, RegisterRequest, TemporaryUserRequest,
};
use crate::envelope::Envelope;
use crate::events::{self, SessionEvent};
use crate::state::{CurrentUser, SessionState};
use crate::transport::dispatch::{RequestDispatcher, RequestOptions};
use crate::transport::http::HttpTransport;
use crate::transport::Transport;

/// Owns the session, its refresh machinery, and its background tasks.
///
/// Must be created inside a tokio runtime.
pub struct SessionClient {
    session: Arc<SessionState>,
    coordinator: Arc<RefreshCoordinator>,
    dispatcher: RequestDispatcher,
    scheduler: Arc<BackgroundScheduler>,
    events: broadcast::Sender<SessionEvent>,
    session_path: Option<PathBuf>,
    shutdown: CancellationToken,
}

impl SessionClient {
    /// Build a client talking HTTP to `config.api_base_url`.
    pub fn connect(config: &SessionConfig) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(&config.api_base_url, config.request_timeout())?;
        Self::new(config, Arc::new(transport))
    }

    /// Build a client over `transport`, restoring any persisted session.
    pub fn new(config: &SessionConfig, transport: Arc<dyn Transport>) -> anyhow::Result<Self> {
        config.validate()?;
        let policy = config.refresh_policy()?;
        let session_path = config.session_path();

        let restored = match session_path.as_deref() {
            Some(path) => match persist::load(path) {
                Ok(restored) => restored,
                Err(e) => {
                    tracing::warn!(path = %path.display(), err = %e, "ignoring unreadable session file");
                    None
                }
            },
            None => None,
        };
        if let Some(ref s) = restored {
            tracing::info!(user_id = %s.user_id, is_temporary = s.is_temporary, "restored session");
        }

        let session = Arc::new(SessionState::restore(restored));
        let events = events::channel();
        let shutdown = CancellationToken::new();

        let coordinator =
            RefreshCoordinator::new(Arc::clone(&session), transport.clone(), events.clone());
        let dispatcher = RequestDispatcher::new(
            Arc::clone(&session),
            Arc::clone(&coordinator),
            transport,
            events.clone(),
        );
        let scheduler =
            BackgroundScheduler::new(Arc::clone(&coordinator), Arc::clone(&session), policy);

        scheduler.watch_session(shutdown.clone());
        if let Some(ref path) = session_path {
            persist::spawn_persister(Arc::clone(&session), path.clone(), shutdown.clone());
        }

        Ok(Self { session, coordinator, dispatcher, scheduler, events, session_path, shutdown })
    }

    /// `POST /users/login`; installs the session on success.
    pub async fn login(&self, user_id: &str, password: &str) -> Envelope<AuthResponse> {
        let body = LoginRequest { user_id: user_id.to_owned(), password: password.to_owned() };
        self.authenticate(paths::LOGIN, &body, false).await
    }

    /// `POST /users/register`; installs the session on success.
    pub async fn register(
        &self,
        user_id: &str,
        password: &str,
        nickname: &str,
    ) -> Envelope<AuthResponse> {
        let body = RegisterRequest {
            user_id: user_id.to_owned(),
            password: password.to_owned(),
            nickname: nickname.to_owned(),
        };
        self.authenticate(paths::REGISTER, &body, false).await
    }

    /// `POST /users/temporary`; installs a guest session on success.
    pub async fn create_temporary(&self, nickname: Option<&str>) -> Envelope<AuthResponse> {
        let body = TemporaryUserRequest { nickname: nickname.map(str::to_owned) };
        self.authenticate(paths::TEMPORARY, &body, true).await
    }

    async fn authenticate(
        &self,
        path: &str,
        body: &impl Serialize,
        is_temporary: bool,
    ) -> Envelope<AuthResponse> {
        let envelope: Envelope<AuthResponse> =
            self.dispatcher.with_body(Method::POST, path, Some(body), RequestOptions::public()).await;
        if !envelope.is_success() {
            tracing::debug!(path, code = envelope.code, "authentication rejected");
            return envelope;
        }
        let Some(auth) = envelope.data.clone().filter(|a| !a.token.is_empty()) else {
            tracing::warn!(path, "authentication response carried no token");
            return Envelope::internal_error("authentication response carried no token");
        };

        let session = auth.into_session(is_temporary);
        let user_id = session.user_id.clone();
        tracing::info!(%user_id, is_temporary, "logged in");
        self.session.set(session);
        events::emit(&self.events, SessionEvent::LoggedIn { user_id, is_temporary });
        envelope
    }

    /// End the session locally. Returns whether one was active.
    ///
    /// A refresh still in flight is discarded when it settles.
    pub fn logout(&self) -> bool {
        let cleared = self.session.clear();
        if cleared {
            tracing::info!("logged out");
            events::emit(&self.events, SessionEvent::LoggedOut);
        }
        cleared
    }

    /// Dispatch a call through the session (see [`RequestDispatcher::dispatch`]).
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Envelope<T> {
        self.dispatcher.dispatch(method, path, body, RequestOptions::default()).await
    }

    /// Stop background tasks and write the final session state to disk.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.scheduler.stop();
        if let Err(e) = self.flush() {
            tracing::warn!(err = %e, "failed to persist session on shutdown");
        }
    }

    /// Synchronously mirror the current session to disk.
    pub fn flush(&self) -> anyhow::Result<()> {
        let Some(ref path) = self.session_path else {
            return Ok(());
        };
        match self.session.snapshot() {
            Some(s) => persist::save(path, &s),
            None => persist::remove(path),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_logged_in()
    }

    pub fn current_user(&self) -> CurrentUser {
        self.session.current_user()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn scheduler(&self) -> &Arc<BackgroundScheduler> {
        &self.scheduler
    }

    pub fn session_path(&self) -> Option<&std::path::Path> {
        self.session_path.as_deref()
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.scheduler.stop();
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
