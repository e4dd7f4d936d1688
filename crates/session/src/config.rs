// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use crate::credential::persist::SESSION_FILE;
use crate::credential::scheduler::RefreshPolicy;

/// How the background scheduler picks its next tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// Refresh on a fixed interval.
    #[default]
    Fixed,
    /// Refresh shortly before the token's known expiry.
    Expiry,
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed => f.write_str("fixed"),
            Self::Expiry => f.write_str("expiry"),
        }
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "expiry" => Ok(Self::Expiry),
            other => anyhow::bail!("invalid refresh policy: {other}"),
        }
    }
}

/// Configuration for a session client.
#[derive(Debug, Clone, clap::Args)]
pub struct SessionConfig {
    /// Backend API base URL (e.g. `https://api.example.com/v1`).
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "TETHER_API_BASE_URL")]
    pub api_base_url: String,

    /// Proactive refresh policy (fixed, expiry).
    #[arg(long, default_value = "fixed", env = "TETHER_REFRESH_POLICY")]
    pub refresh_policy: String,

    /// Fixed refresh interval in milliseconds. Also the fallback for the
    /// expiry policy when the token's expiry is unknown.
    #[arg(long, default_value_t = 900_000, env = "TETHER_REFRESH_INTERVAL_MS")]
    pub refresh_interval_ms: u64,

    /// How long before expiry to refresh, in milliseconds (expiry policy).
    #[arg(long, default_value_t = 60_000, env = "TETHER_REFRESH_MARGIN_MS")]
    pub refresh_margin_ms: u64,

    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "TETHER_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Directory for the persisted session (default: XDG state dir).
    #[arg(long, env = "TETHER_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Keep the session in memory only.
    #[arg(long, env = "TETHER_NO_PERSIST")]
    pub no_persist: bool,
}

impl SessionConfig {
    /// Config pointing at `api_base_url` with defaults elsewhere and
    /// persistence disabled.
    pub fn in_memory(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            refresh_policy: PolicyKind::Fixed.to_string(),
            refresh_interval_ms: 900_000,
            refresh_margin_ms: 60_000,
            request_timeout_ms: 30_000,
            state_dir: None,
            no_persist: true,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            anyhow::bail!("--api-base-url must be an http(s) URL: {}", self.api_base_url);
        }
        self.policy_kind()?;
        if self.refresh_interval_ms == 0 {
            anyhow::bail!("--refresh-interval-ms must be greater than zero");
        }
        if self.request_timeout_ms == 0 {
            anyhow::bail!("--request-timeout-ms must be greater than zero");
        }
        Ok(())
    }

    /// Parse the refresh policy string into an enum.
    pub fn policy_kind(&self) -> anyhow::Result<PolicyKind> {
        self.refresh_policy.parse()
    }

    pub fn refresh_policy(&self) -> anyhow::Result<RefreshPolicy> {
        Ok(match self.policy_kind()? {
            PolicyKind::Fixed => RefreshPolicy::Fixed { interval: self.refresh_interval() },
            PolicyKind::Expiry => RefreshPolicy::BeforeExpiry {
                margin: self.refresh_margin(),
                fallback: self.refresh_interval(),
            },
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_millis(self.refresh_margin_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Where the session file lives, or `None` when persistence is off.
    pub fn session_path(&self) -> Option<PathBuf> {
        if self.no_persist {
            return None;
        }
        let dir = self.state_dir.clone().unwrap_or_else(crate::credential::state_dir);
        Some(dir.join(SESSION_FILE))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
