use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use client_core::SessionSnapshot;
use serde::{Deserialize, Serialize};
use shared::{domain::UserId, protocol::SessionUser};

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server_url: String,
    pub session_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000/api".into(),
            session_file: PathBuf::from("mentormesh-session.toml"),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("mentormesh.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("server_url") {
                settings.server_url = v.clone();
            }
            if let Some(v) = file_cfg.get("session_file") {
                settings.session_file = PathBuf::from(v);
            }
        }
    }

    if let Ok(v) = std::env::var("MENTORMESH_SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("MENTORMESH_SESSION_FILE") {
        settings.session_file = PathBuf::from(v);
    }

    settings
}

/// Session credentials persisted between invocations.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub csrf_token: Option<String>,
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
}

impl StoredSession {
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        Self {
            token: snapshot.token.clone(),
            csrf_token: snapshot.csrf_token.clone(),
            user_id: snapshot.user.id.0,
            username: snapshot.user.username.clone(),
            email: snapshot.user.email.clone(),
            name: snapshot.user.name.clone(),
        }
    }

    pub fn into_snapshot(self) -> SessionSnapshot {
        SessionSnapshot {
            token: self.token,
            csrf_token: self.csrf_token,
            user: SessionUser {
                id: UserId(self.user_id),
                username: self.username,
                email: self.email,
                name: self.name,
            },
        }
    }
}

pub fn load_session(path: &Path) -> anyhow::Result<Option<StoredSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read session file '{}'", path.display()))?;
    let session = toml::from_str(&raw)
        .with_context(|| format!("session file '{}' is not valid", path.display()))?;
    Ok(Some(session))
}

pub fn save_session(path: &Path, session: &StoredSession) -> anyhow::Result<()> {
    let raw = toml::to_string_pretty(session).context("failed to encode session")?;
    fs::write(path, raw)
        .with_context(|| format!("failed to write session file '{}'", path.display()))
}

pub fn clear_session(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("failed to remove session file '{}'", path.display()))?;
    }
    Ok(())
}
