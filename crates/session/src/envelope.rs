// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The uniform `{code, message, data}` response envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Classification, ErrorCode};

/// Result shape returned by every backend endpoint and by the dispatcher.
///
/// The backend historically spells the fields `msg` and `resp_data`; both
/// spellings are accepted when decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default, alias = "msg")]
    pub message: String,
    #[serde(alias = "resp_data")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self { code: ErrorCode::Success.code(), message: String::new(), data: Some(data) }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code: code.code(), message: message.into(), data: None }
    }

    /// Normalized shape for failures that produced no envelope.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::failure(ErrorCode::InternalError, message)
    }

    pub fn is_success(&self) -> bool {
        self.code == ErrorCode::Success.code()
    }

    /// The known code, if any.
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }

    pub fn classify(&self) -> Classification {
        Classification::of(self.code)
    }

    /// Drop the payload, keeping code and message.
    pub fn without_data<U>(&self) -> Envelope<U> {
        Envelope { code: self.code, message: self.message.clone(), data: None }
    }
}

impl Envelope<serde_json::Value> {
    /// Decode the raw payload into `T`.
    ///
    /// A payload that does not match `T` yields an `INTERNAL_ERROR` envelope.
    pub fn decode<T: DeserializeOwned>(self) -> Envelope<T> {
        let data = match self.data {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => match serde_json::from_value(value) {
                Ok(data) => Some(data),
                Err(e) => {
                    tracing::warn!(code = self.code, err = %e, "response data did not decode");
                    return Envelope::internal_error(format!("malformed response data: {e}"));
                }
            },
        };
        Envelope { code: self.code, message: self.message, data }
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
