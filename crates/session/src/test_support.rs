// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted backend and fixtures shared by unit and integration tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use crate::credential::paths;
use crate::envelope::Envelope;
use crate::error::ErrorCode;
use crate::state::Session;
use crate::transport::{ApiRequest, Transport, TransportFuture};

/// What a [`MockTransport`] answers for one request.
#[derive(Debug, Clone)]
pub enum MockReply {
    Envelope(Envelope<serde_json::Value>),
    /// Connectivity failure: no envelope.
    Unreachable(String),
}

type Handler = Box<dyn Fn(&ApiRequest) -> MockReply + Send + Sync>;

/// In-memory [`Transport`] driven by a handler closure.
///
/// Every request is recorded before the optional delay, and the handler runs
/// after it, so handlers observe state at response time.
pub struct MockTransport {
    handler: Handler,
    delay: Duration,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new(handler: impl Fn(&ApiRequest) -> MockReply + Send + Sync + 'static) -> Arc<Self> {
        Self::with_delay(Duration::ZERO, handler)
    }

    pub fn with_delay(
        delay: Duration,
        handler: impl Fn(&ApiRequest) -> MockReply + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self { handler: Box::new(handler), delay, requests: Mutex::new(Vec::new()) })
    }

    /// All requests seen so far.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests sent to `path`.
    pub fn count(&self, path: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.path == path).count()
    }

    pub fn refresh_calls(&self) -> usize {
        self.count(paths::REFRESH_TOKEN)
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            self.requests.lock().push(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match (self.handler)(&request) {
                MockReply::Envelope(envelope) => Ok(envelope),
                MockReply::Unreachable(msg) => Err(anyhow::anyhow!(msg)),
            }
        })
    }
}

pub fn ok(data: serde_json::Value) -> MockReply {
    MockReply::Envelope(Envelope::ok(data))
}

pub fn fail(code: ErrorCode, message: &str) -> MockReply {
    MockReply::Envelope(Envelope::failure(code, message))
}

pub fn auth_failed() -> MockReply {
    fail(ErrorCode::AuthFailed, "session expired")
}

pub fn unreachable(msg: &str) -> MockReply {
    MockReply::Unreachable(msg.to_owned())
}

/// Successful refresh answer carrying `token`.
pub fn refreshed(token: &str) -> MockReply {
    ok(json!({ "token": token }))
}

/// A registered-user session holding `token`.
pub fn session(token: &str) -> Session {
    Session {
        token: token.to_owned(),
        user_id: "u1".to_owned(),
        display_name: "Ada".to_owned(),
        is_temporary: false,
        expires_at: None,
    }
}

/// Assert that a `Result` is `Err` and its message contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
