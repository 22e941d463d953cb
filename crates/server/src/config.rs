use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use ::config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(alias = "bind_addr")]
    pub server_bind: String,
    pub database_url: String,
    pub media_dir: PathBuf,
    /// Seconds before an unfinished capture cycle is force-closed. 0 disables.
    pub capture_timeout_secs: u64,
    pub seed_filters: bool,
    pub cors_origins: Vec<String>,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:3002".into(),
            database_url: "sqlite://./data/photozone.db".into(),
            media_dir: PathBuf::from("./uploads"),
            capture_timeout_secs: 30,
            seed_filters: true,
            cors_origins: vec![
                "http://localhost:3000".into(),
                "http://localhost:3001".into(),
            ],
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn capture_timeout(&self) -> Option<Duration> {
        (self.capture_timeout_secs > 0).then(|| Duration::from_secs(self.capture_timeout_secs))
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let mut settings = load_settings_from(Path::new("server.toml"))?;

    if let Ok(v) = std::env::var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Ok(v) = std::env::var("PORT") {
        settings.server_bind = with_port(&settings.server_bind, &v);
    }
    if let Ok(v) = std::env::var("DATABASE_URL") {
        settings.database_url = v;
    }

    Ok(settings)
}

/// Layers the optional TOML file and `APP__*` environment variables over the defaults.
pub fn load_settings_from(path: &Path) -> anyhow::Result<Settings> {
    Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("cors_origins")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("failed to read configuration from '{}'", path.display()))?
        .try_deserialize()
        .context("invalid server configuration")
}

fn with_port(bind: &str, port: &str) -> String {
    let host = bind.rsplit_once(':').map(|(host, _)| host).unwrap_or("0.0.0.0");
    format!("{host}:{}", port.trim())
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
