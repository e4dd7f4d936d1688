// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session persistence: load/save to JSON file with atomic writes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::state::{Session, SessionState};

/// File name of the persisted session inside the state directory.
pub const SESSION_FILE: &str = "session.json";

/// Persisted session fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub is_temporary: bool,
    /// Expiry as epoch seconds. 0 means unknown.
    #[serde(default)]
    pub expires_at: u64,
}

impl From<&Session> for PersistedSession {
    fn from(s: &Session) -> Self {
        Self {
            token: s.token.clone(),
            user_id: s.user_id.clone(),
            nickname: s.display_name.clone(),
            is_temporary: s.is_temporary,
            expires_at: s.expires_at.unwrap_or(0),
        }
    }
}

impl From<PersistedSession> for Session {
    fn from(p: PersistedSession) -> Self {
        Self {
            token: p.token,
            user_id: p.user_id,
            display_name: p.nickname,
            is_temporary: p.is_temporary,
            expires_at: (p.expires_at > 0).then_some(p.expires_at),
        }
    }
}

/// Load a persisted session. A missing file means no session.
pub fn load(path: &Path) -> anyhow::Result<Option<Session>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let persisted: PersistedSession = serde_json::from_str(&contents)?;
    if persisted.token.is_empty() {
        return Ok(None);
    }
    Ok(Some(persisted.into()))
}

/// Save a session to a JSON file atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves never
/// share a `.tmp` file.
pub fn save(path: &Path, session: &Session) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(&PersistedSession::from(session))?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Remove the persisted session. A missing file is not an error.
pub fn remove(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Spawn a task mirroring every session transition to `path`.
pub fn spawn_persister(session: Arc<SessionState>, path: PathBuf, shutdown: CancellationToken) {
    let mut rx = session.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            let current = rx.borrow_and_update().clone();
            let result = match current {
                Some(ref s) => save(&path, s),
                None => remove(&path),
            };
            if let Err(e) = result {
                tracing::warn!(path = %path.display(), err = %e, "failed to persist session");
            }
        }
    });
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
