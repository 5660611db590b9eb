use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use serde::Deserialize;
use shared::domain::{AuthMode, SessionIdStyle};
use voting::{VotingConfig, DEFAULT_MAX_IMAGE_BYTES};

pub const DEFAULT_CONFIG_PATH: &str = "picvote.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub database_url: String,
    pub auth_mode: AuthMode,
    pub session_id_style: SessionIdStyle,
    pub max_image_bytes: usize,
    pub max_connections: u32,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/picvote.db".into(),
            auth_mode: AuthMode::Credentialed,
            session_id_style: SessionIdStyle::ShortCode,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            max_connections: storage::DEFAULT_MAX_CONNECTIONS,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn voting_config(&self) -> VotingConfig {
        VotingConfig {
            auth_mode: self.auth_mode,
            session_id_style: self.session_id_style,
            max_image_bytes: self.max_image_bytes,
        }
    }
}

/// Reads `config_path` (or `picvote.toml` in the working directory, if
/// present) and applies `PICVOTE_*` environment overrides.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let (path, required) = match config_path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };

    let raw = match fs::read_to_string(&path) {
        Ok(raw) => Some(raw),
        Err(err) if !required && err.kind() == io::ErrorKind::NotFound => None,
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    };

    load_settings_from(raw.as_deref(), |key| std::env::var(key).ok())
        .with_context(|| format!("invalid settings (config file '{}')", path.display()))
}

pub fn load_settings_from(
    file_contents: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = match file_contents {
        Some(raw) => toml::from_str::<Settings>(raw).context("failed to parse config file")?,
        None => Settings::default(),
    };

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("PICVOTE_DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("PICVOTE_AUTH_MODE") {
        settings.auth_mode = parse_auth_mode(&v)?;
    }
    if let Some(v) = env("PICVOTE_SESSION_ID_STYLE") {
        settings.session_id_style = parse_session_id_style(&v)?;
    }
    if let Some(v) = env("PICVOTE_MAX_IMAGE_BYTES") {
        settings.max_image_bytes = v
            .trim()
            .parse()
            .with_context(|| format!("PICVOTE_MAX_IMAGE_BYTES is not a byte count: '{v}'"))?;
    }
    if let Some(v) = env("PICVOTE_MAX_CONNECTIONS") {
        settings.max_connections = v
            .trim()
            .parse()
            .with_context(|| format!("PICVOTE_MAX_CONNECTIONS is not a number: '{v}'"))?;
    }
    if let Some(v) = env("PICVOTE_LOG") {
        settings.log_filter = v;
    }

    if settings.max_connections == 0 {
        bail!("max_connections must be at least 1");
    }
    Ok(settings)
}

fn parse_auth_mode(raw: &str) -> anyhow::Result<AuthMode> {
    match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "credentialed" => Ok(AuthMode::Credentialed),
        "name_only" => Ok(AuthMode::NameOnly),
        other => bail!("unknown auth mode '{other}' (expected credentialed or name_only)"),
    }
}

fn parse_session_id_style(raw: &str) -> anyhow::Result<SessionIdStyle> {
    match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "short_code" => Ok(SessionIdStyle::ShortCode),
        "uuid" => Ok(SessionIdStyle::Uuid),
        other => bail!("unknown session id style '{other}' (expected short_code or uuid)"),
    }
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }
    if raw_database_url.starts_with("sqlite::memory:") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url
        .strip_prefix("sqlite://")
        .or_else(|| raw_database_url.strip_prefix("sqlite:"))
    {
        return sqlite_url_for_path(path);
    }
    if raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    sqlite_url_for_path(raw_database_url)
}

fn sqlite_url_for_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    // `sqlite://C:/...` would read the drive letter as a host.
    if has_drive_prefix(&path) {
        format!("sqlite:{path}")
    } else {
        format!("sqlite://{path}")
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
