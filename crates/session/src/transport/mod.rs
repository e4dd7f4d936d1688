// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound request seam between the session components and the backend.

pub mod dispatch;
pub mod http;

use std::future::Future;
use std::pin::Pin;

use reqwest::Method;

use crate::envelope::Envelope;

/// Boxed future returned by [`Transport::execute`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = anyhow::Result<Envelope<serde_json::Value>>> + Send + 'a>>;

/// Executes one backend call.
///
/// `Err` means no envelope could be obtained (connectivity failure, or a
/// response body that is not an envelope). Envelopes with a non-zero code are
/// `Ok`. Object-safe for use as `Arc<dyn Transport>`.
pub trait Transport: Send + Sync + 'static {
    fn execute(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// A single outbound call, fully resolved: credentials are already decided.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    /// Bearer credential, sent as `Authorization: Bearer <token>`.
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, bearer: None }
    }

    pub fn with_body(mut self, body: Option<serde_json::Value>) -> Self {
        self.body = body;
        self
    }

    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }
}
