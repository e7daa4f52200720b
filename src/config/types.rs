use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_DRIVE_API_BASE: &str = "https://www.googleapis.com";

/// libpq `sslmode` subset. `prefer` and `require` do not verify the server
/// certificate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
        }
    }
}

impl std::str::FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            other => Err(format!("unsupported sslmode {:?}", other)),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Database used for the catalog query and skipped during backup.
    pub maintenance_db: String,
    pub pg_dump_path: PathBuf,
    pub ssl_mode: SslMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: String::new(),
            maintenance_db: "postgres".to_string(),
            pg_dump_path: PathBuf::from("pg_dump"),
            ssl_mode: SslMode::Prefer,
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("maintenance_db", &self.maintenance_db)
            .field("pg_dump_path", &self.pg_dump_path)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Authorized-user token file, rewritten in place when refreshed.
    pub credentials_file: PathBuf,
    /// Parent folder for uploads; Drive root when unset.
    pub folder_id: Option<String>,
    pub session_folder: bool,
    pub api_base: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            credentials_file: super::config_dir().join("creds_token.json"),
            folder_id: None,
            session_folder: true,
            api_base: DEFAULT_DRIVE_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub drive: DriveConfig,
    pub dump_dir: PathBuf,
    pub log_dir: PathBuf,
    pub keep_local_dumps: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            drive: DriveConfig::default(),
            dump_dir: PathBuf::from("/tmp/pg_backups"),
            log_dir: PathBuf::from("logs"),
            keep_local_dumps: false,
        }
    }
}
