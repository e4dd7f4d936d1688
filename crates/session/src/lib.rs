// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tether: authenticated session client with transparent token refresh.
//!
//! Requests go through a [`transport::dispatch::RequestDispatcher`] that
//! attaches the session token, and on `AUTH_FAILED` refreshes it through a
//! single-flight [`credential::refresh::RefreshCoordinator`] and replays the
//! call once. A [`credential::scheduler::BackgroundScheduler`] refreshes
//! proactively while a session is active.

pub mod client;
pub mod command;
pub mod config;
pub mod credential;
pub mod envelope;
pub mod error;
pub mod events;
pub mod state;
pub mod test_support;
pub mod transport;

pub use command::run;
