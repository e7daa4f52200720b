use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum BackupError {
    Config(String),
    Database(String),
    Dump {
        database: String,
        status: Option<i32>,
        stderr: String,
    },
    Auth(String),
    Upload(String),
    FileNotFound(PathBuf),
    NothingDumped,
    Io(io::Error),
    Serialization(String),
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupError::Config(msg) => write!(f, "Configuration error: {}", msg),
            BackupError::Database(msg) => write!(f, "Database error: {}", msg),
            BackupError::Dump {
                database,
                status,
                stderr,
            } => {
                match status {
                    Some(code) => write!(f, "pg_dump of {} exited with status {}", database, code)?,
                    None => write!(f, "pg_dump of {} was terminated by a signal", database)?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr)?;
                }
                Ok(())
            }
            BackupError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            BackupError::Upload(msg) => write!(f, "Upload error: {}", msg),
            BackupError::FileNotFound(path) => write!(f, "File not found: {}", path.display()),
            BackupError::NothingDumped => write!(f, "No dump files were created"),
            BackupError::Io(err) => write!(f, "IO error: {}", err),
            BackupError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for BackupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackupError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for BackupError {
    fn from(err: io::Error) -> Self {
        BackupError::Io(err)
    }
}

impl From<toml::de::Error> for BackupError {
    fn from(err: toml::de::Error) -> Self {
        BackupError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        BackupError::Serialization(err.to_string())
    }
}

impl From<tokio_postgres::Error> for BackupError {
    fn from(err: tokio_postgres::Error) -> Self {
        BackupError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for BackupError {
    fn from(err: reqwest::Error) -> Self {
        BackupError::Upload(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
