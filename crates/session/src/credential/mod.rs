// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session credentials: single-flight refresh, proactive refresh scheduling,
//! and on-disk persistence.
//!
//! Also holds the auth endpoint paths and their wire types.

pub mod persist;
pub mod refresh;
pub mod scheduler;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::state::{RefreshedToken, Session};

/// Auth endpoint paths.
pub mod paths {
    pub const REGISTER: &str = "/users/register";
    pub const LOGIN: &str = "/users/login";
    pub const TEMPORARY: &str = "/users/temporary";
    pub const REFRESH_TOKEN: &str = "/users/refresh-token";
}

/// Paths that never carry credentials.
#[derive(Debug, Clone)]
pub struct PublicPaths {
    paths: Vec<String>,
}

impl PublicPaths {
    pub fn new(paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { paths: paths.into_iter().map(Into::into).collect() }
    }

    /// Whether `path` is an allow-listed endpoint.
    ///
    /// An entry matches the exact path, or the path followed by a query
    /// string or a further segment.
    pub fn is_public(&self, path: &str) -> bool {
        self.paths.iter().any(|p| match path.strip_prefix(p.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('?') || rest.starts_with('/'),
            None => false,
        })
    }
}

impl Default for PublicPaths {
    fn default() -> Self {
        Self::new([paths::REGISTER, paths::LOGIN, paths::TEMPORARY, paths::REFRESH_TOKEN])
    }
}

/// Request body for `POST /users/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
}

/// Request body for `POST /users/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub user_id: String,
    pub password: String,
    pub nickname: String,
}

/// Request body for `POST /users/temporary`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemporaryUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

/// Response data of login, registration, and guest creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub nickname: String,
    /// Epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl AuthResponse {
    pub fn into_session(self, is_temporary: bool) -> Session {
        Session {
            token: self.token,
            user_id: self.user_id,
            display_name: self.nickname,
            is_temporary,
            // Zero is the backend's "no expiry".
            expires_at: self.expires_at.filter(|&t| t > 0),
        }
    }
}

/// Response data of `POST /users/refresh-token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenResponse {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl From<RefreshTokenResponse> for RefreshedToken {
    fn from(resp: RefreshTokenResponse) -> Self {
        Self {
            token: resp.token,
            user_id: resp.user_id,
            display_name: resp.nickname,
            expires_at: resp.expires_at.filter(|&t| t > 0),
        }
    }
}

/// Resolve the state directory for session data.
///
/// Checks `TETHER_STATE_DIR`, then `$XDG_STATE_HOME/tether`,
/// then `$HOME/.local/state/tether`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TETHER_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("tether");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/tether");
    }
    PathBuf::from(".tether")
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
