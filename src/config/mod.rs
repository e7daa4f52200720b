mod types;

pub use types::*;

use crate::error::{BackupError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_PATH_VAR: &str = "PG_BACKUP_CONFIG";

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".pg_drive_backup"))
        .unwrap_or_else(|| PathBuf::from(".pg_drive_backup"))
}

pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir().join("config.toml"))
}

/// Loads the config file (if any) and applies the process environment on top.
/// Also returns the file that was read, since logging is not up yet.
pub fn load() -> Result<(AppConfig, Option<PathBuf>)> {
    load_with(&config_path(), |key| std::env::var(key).ok())
}

pub fn load_with<F>(path: &Path, lookup: F) -> Result<(AppConfig, Option<PathBuf>)>
where
    F: Fn(&str) -> Option<String>,
{
    let source = path.exists().then(|| path.to_path_buf());
    let mut config = load_from(path)?;
    apply_env(&mut config, lookup)?;
    Ok((config, source))
}

pub fn load_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        debug!("Config file not found at {:?}, using defaults", path);
        return Ok(AppConfig::default());
    }

    debug!("Loading configuration from {:?}", path);
    let contents = fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&contents)?;
    Ok(config)
}

pub fn apply_env<F>(config: &mut AppConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("PG_HOST") {
        config.database.host = host;
    }
    if let Some(port) = lookup("PG_PORT") {
        config.database.port = port
            .trim()
            .parse()
            .map_err(|_| BackupError::Config(format!("PG_PORT is not a valid port: {:?}", port)))?;
    }
    if let Some(user) = lookup("PG_USER") {
        config.database.username = user;
    }
    if let Some(password) = lookup("PG_PASSWORD") {
        config.database.password = password;
    }
    if let Some(mode) = lookup("PG_SSLMODE") {
        config.database.ssl_mode = mode
            .parse()
            .map_err(|e| BackupError::Config(format!("PG_SSLMODE: {}", e)))?;
    }
    if let Some(bin) = lookup("PG_DUMP_BIN") {
        config.database.pg_dump_path = PathBuf::from(bin);
    }
    if let Some(dir) = lookup("DUMP_DIR") {
        config.dump_dir = PathBuf::from(dir);
    }
    if let Some(dir) = lookup("LOG_DIR") {
        config.log_dir = PathBuf::from(dir);
    }
    if let Some(file) = lookup("CREDENTIALS_FILE") {
        config.drive.credentials_file = PathBuf::from(file);
    }
    if let Some(folder) = lookup("PG_DRIVE_FOLDER_ID") {
        let folder = folder.trim();
        config.drive.folder_id = (!folder.is_empty()).then(|| folder.to_string());
    }
    if let Some(value) = lookup("DRIVE_SESSION_FOLDER") {
        config.drive.session_folder = parse_bool("DRIVE_SESSION_FOLDER", &value)?;
    }
    if let Some(value) = lookup("KEEP_LOCAL_DUMPS") {
        config.keep_local_dumps = parse_bool("KEEP_LOCAL_DUMPS", &value)?;
    }
    if let Some(base) = lookup("DRIVE_API_BASE") {
        config.drive.api_base = base.trim_end_matches('/').to_string();
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BackupError::Config(format!(
            "{} must be a boolean, got {:?}",
            key, value
        ))),
    }
}
