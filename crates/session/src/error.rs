// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Application codes carried in the `code` field of every response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    Success,
    /// The session token is invalid or expired.
    AuthFailed,
    /// Authenticated, but not allowed to perform the operation.
    PermissionDenied,
    InvalidParam,
    ResourceNotFound,
    DuplicateResource,
    /// Uncategorized failure; also the normalized shape of transport errors.
    InternalError,
    NetworkError,
}

impl ErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            Self::Success => 0,
            Self::AuthFailed => 1001,
            Self::PermissionDenied => 1002,
            Self::InvalidParam => 2001,
            Self::ResourceNotFound => 2002,
            Self::DuplicateResource => 2003,
            Self::InternalError => 5001,
            Self::NetworkError => 5002,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1001 => Some(Self::AuthFailed),
            1002 => Some(Self::PermissionDenied),
            2001 => Some(Self::InvalidParam),
            2002 => Some(Self::ResourceNotFound),
            2003 => Some(Self::DuplicateResource),
            5001 => Some(Self::InternalError),
            5002 => Some(Self::NetworkError),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::AuthFailed => "AUTH_FAILED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::InvalidParam => "INVALID_PARAM",
            Self::ResourceNotFound => "RESOURCE_NOT_FOUND",
            Self::DuplicateResource => "DUPLICATE_RESOURCE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the dispatcher treats a settled envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    /// Session invalid: eligible for one refresh + retry.
    AuthFailed,
    /// Surfaced to the caller, never refreshed.
    PermissionDenied,
    /// Any other non-zero code, surfaced unchanged.
    Domain(i64),
}

impl Classification {
    pub fn of(code: i64) -> Self {
        match ErrorCode::from_code(code) {
            Some(ErrorCode::Success) => Self::Success,
            Some(ErrorCode::AuthFailed) => Self::AuthFailed,
            Some(ErrorCode::PermissionDenied) => Self::PermissionDenied,
            _ => Self::Domain(code),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
