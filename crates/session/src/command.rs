// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tether` command-line surface.

use std::str::FromStr;

use clap::{Parser, Subcommand};
use reqwest::Method;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::SessionClient;
use crate::config::SessionConfig;
use crate::envelope::Envelope;
use crate::state::Session;

/// Session client for the backend API.
#[derive(Debug, Parser)]
#[command(name = "tether", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub config: SessionConfig,

    /// Log filter (e.g. `info`, `tether=debug`).
    #[arg(long, env = "TETHER_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Log format (text, json).
    #[arg(long, env = "TETHER_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in with a registered account.
    Login {
        #[arg(long)]
        user_id: String,
        #[arg(long, env = "TETHER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and log in.
    Register {
        #[arg(long)]
        user_id: String,
        #[arg(long, env = "TETHER_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        nickname: String,
    },
    /// Continue as a temporary guest user.
    Guest {
        #[arg(long)]
        nickname: Option<String>,
    },
    /// Drop the stored session.
    Logout,
    /// Show the current user.
    Status,
    /// Send one request through the session.
    Request {
        /// HTTP method (GET, POST, PUT, DELETE, ...).
        method: String,
        /// API path, e.g. `/groups/nearby`.
        path: String,
        /// JSON body (query parameters for GET).
        #[arg(long)]
        body: Option<String>,
    },
    /// Keep the session fresh until interrupted, printing session events.
    Keepalive,
}

#[derive(Debug, Default, Serialize)]
struct Status {
    logged_in: bool,
    user_id: String,
    display_name: String,
    is_temporary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<u64>,
}

impl From<Option<Session>> for Status {
    fn from(session: Option<Session>) -> Self {
        match session {
            Some(s) => Self {
                logged_in: true,
                user_id: s.user_id,
                display_name: s.display_name,
                is_temporary: s.is_temporary,
                expires_at: s.expires_at,
            },
            None => Self::default(),
        }
    }
}

/// Run one command. Returns the process exit code.
pub async fn run(cli: Cli) -> anyhow::Result<i32> {
    let client = SessionClient::connect(&cli.config)?;
    let code = execute(&client, cli.command).await;
    client.shutdown();
    code
}

async fn execute(client: &SessionClient, command: Command) -> anyhow::Result<i32> {
    match command {
        Command::Login { user_id, password } => print_envelope(&client.login(&user_id, &password).await),
        Command::Register { user_id, password, nickname } => {
            print_envelope(&client.register(&user_id, &password, &nickname).await)
        }
        Command::Guest { nickname } => print_envelope(&client.create_temporary(nickname.as_deref()).await),
        Command::Logout => {
            if !client.logout() {
                info!("no active session");
            }
            Ok(0)
        }
        Command::Status => {
            let status = Status::from(client.session().snapshot());
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(0)
        }
        Command::Request { method, path, body } => {
            let method = Method::from_str(&method.to_uppercase())?;
            let body = body.map(|b| serde_json::from_str(&b)).transpose()?;
            let envelope: Envelope<serde_json::Value> = client.request(method, &path, body).await;
            print_envelope(&envelope)
        }
        Command::Keepalive => keepalive(client).await,
    }
}

fn print_envelope<T: Serialize>(envelope: &Envelope<T>) -> anyhow::Result<i32> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(if envelope.is_success() { 0 } else { 1 })
}

async fn keepalive(client: &SessionClient) -> anyhow::Result<i32> {
    if !client.is_logged_in() {
        anyhow::bail!("no active session; log in first");
    }
    let shutdown = CancellationToken::new();
    {
        let sd = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received SIGINT");
            }
            sd.cancel();
        });
    }

    info!(user_id = %client.current_user().user_id, "keeping session alive");
    let mut events = client.subscribe();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            },
        }
        if !client.is_logged_in() {
            tracing::warn!("session ended");
            return Ok(1);
        }
    }
    Ok(0)
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
