use crate::database::DatabaseDriver;
use crate::error::{BackupError, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, warn};

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, PartialEq)]
pub struct DumpArtifact {
    pub database: String,
    pub path: PathBuf,
    pub created_at: DateTime<Local>,
}

#[derive(Debug, Default)]
pub struct DumpReport {
    pub artifacts: Vec<DumpArtifact>,
    pub failures: Vec<(String, BackupError)>,
}

impl DumpReport {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.artifacts.iter().map(|a| a.path.clone()).collect()
    }
}

pub fn artifact_file_name(database: &str, timestamp: &DateTime<Local>) -> String {
    format!("{}_{}.sql", database, timestamp.format(TIMESTAMP_FORMAT))
}

pub struct Dumper<'a> {
    driver: &'a dyn DatabaseDriver,
    dump_dir: PathBuf,
}

impl<'a> Dumper<'a> {
    /// Resolves `dump_dir` against the working directory so artifact paths
    /// stay valid for later stages.
    pub fn new(driver: &'a dyn DatabaseDriver, dump_dir: &Path) -> Result<Self> {
        Ok(Self {
            driver,
            dump_dir: std::path::absolute(dump_dir)?,
        })
    }

    pub async fn list_databases(&self) -> Result<Vec<String>> {
        self.driver.list_databases().await
    }

    pub async fn dump_one(&self, database: &str) -> Result<DumpArtifact> {
        self.dump_one_at(database, Local::now()).await
    }

    async fn dump_one_at(&self, database: &str, created_at: DateTime<Local>) -> Result<DumpArtifact> {
        let path = self.dump_dir.join(artifact_file_name(database, &created_at));

        if let Err(e) = self.driver.dump_database(database, &path).await {
            error!("Error dumping {}: {}", database, e);
            if fs::remove_file(&path).await.is_ok() {
                warn!("Removed incomplete dump: {}", path.display());
            }
            return Err(e);
        }

        info!("Successfully created dump: {}", path.display());
        Ok(DumpArtifact {
            database: database.to_string(),
            path,
            created_at,
        })
    }

    /// Dumps every database the driver lists. A failed listing yields an
    /// empty report; a failed database is recorded and skipped.
    pub async fn dump_all(&self) -> Result<DumpReport> {
        fs::create_dir_all(&self.dump_dir).await?;

        let mut report = DumpReport::default();
        let databases = match self.list_databases().await {
            Ok(databases) => databases,
            Err(e) => {
                error!("Error getting databases from {}: {}", self.driver.engine_name(), e);
                return Ok(report);
            }
        };

        for database in databases {
            match self.dump_one(&database).await {
                Ok(artifact) => report.artifacts.push(artifact),
                Err(e) => report.failures.push((database, e)),
            }
        }

        info!(
            "Dumped {} database(s), {} failed",
            report.artifacts.len(),
            report.failures.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// In-memory driver: writes a small file for every database not listed
    /// in `failing`.
    pub(crate) struct FakeDriver {
        pub databases: Option<Vec<String>>,
        pub failing: Vec<String>,
        pub dumped: Mutex<Vec<String>>,
    }

    impl FakeDriver {
        pub(crate) fn new(databases: &[&str], failing: &[&str]) -> Self {
            Self {
                databases: Some(databases.iter().map(|d| d.to_string()).collect()),
                failing: failing.iter().map(|d| d.to_string()).collect(),
                dumped: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn unreachable() -> Self {
            Self {
                databases: None,
                failing: Vec::new(),
                dumped: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DatabaseDriver for FakeDriver {
        async fn list_databases(&self) -> Result<Vec<String>> {
            self.databases
                .clone()
                .ok_or_else(|| BackupError::Database("connection refused".to_string()))
        }

        async fn dump_database(&self, db_name: &str, output: &Path) -> Result<()> {
            self.dumped.lock().unwrap().push(db_name.to_string());
            // Leave a partial file behind, the way a crashing pg_dump would.
            std::fs::write(output, format!("-- dump of {}\n", db_name))?;
            if self.failing.iter().any(|d| d == db_name) {
                return Err(BackupError::Dump {
                    database: db_name.to_string(),
                    status: Some(1),
                    stderr: "permission denied".to_string(),
                });
            }
            Ok(())
        }

        fn engine_name(&self) -> &'static str {
            "Fake"
        }
    }

    #[test]
    fn test_artifact_file_name_format() {
        let ts = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(artifact_file_name("shop", &ts), "shop_20240309_070501.sql");
    }

    #[tokio::test]
    async fn test_same_database_distinct_seconds_never_collide() {
        let dir = tempdir().unwrap();
        let driver = FakeDriver::new(&["shop"], &[]);
        let dumper = Dumper::new(&driver, dir.path()).unwrap();

        let first = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let second = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap();
        let a = dumper.dump_one_at("shop", first).await.unwrap();
        let b = dumper.dump_one_at("shop", second).await.unwrap();

        assert_ne!(a.path, b.path);
        assert!(a.path.exists());
        assert!(b.path.exists());
    }

    #[tokio::test]
    async fn test_dump_all_skips_failed_database() {
        let dir = tempdir().unwrap();
        let driver = FakeDriver::new(&["shop", "crm", "analytics"], &["crm"]);
        let dumper = Dumper::new(&driver, dir.path()).unwrap();

        let report = dumper.dump_all().await.unwrap();

        let dumped: Vec<&str> = report.artifacts.iter().map(|a| a.database.as_str()).collect();
        assert_eq!(dumped, vec!["shop", "analytics"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "crm");
        assert_eq!(driver.dumped.lock().unwrap().len(), 3);
        for artifact in &report.artifacts {
            assert!(artifact.path.starts_with(dir.path()));
            assert!(artifact.path.exists());
        }
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 2);
    }

    #[tokio::test]
    async fn test_dump_all_unreachable_server_is_empty() {
        let dir = tempdir().unwrap();
        let driver = FakeDriver::unreachable();
        let dumper = Dumper::new(&driver, dir.path()).unwrap();

        let report = dumper.dump_all().await.unwrap();
        assert!(report.artifacts.is_empty());
        assert!(report.failures.is_empty());
        assert!(driver.dumped.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dump_all_creates_missing_dump_dir() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("dumps");
        let driver = FakeDriver::new(&["shop"], &[]);
        let dumper = Dumper::new(&driver, &nested).unwrap();

        let report = dumper.dump_all().await.unwrap();
        assert_eq!(report.paths().len(), 1);
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_relative_dump_dir_yields_absolute_paths() {
        let dir = tempfile::tempdir_in(".").unwrap();
        let relative = dir.path().strip_prefix(".").unwrap_or(dir.path()).to_path_buf();
        assert!(relative.is_relative());

        let driver = FakeDriver::new(&["shop"], &[]);
        let dumper = Dumper::new(&driver, &relative).unwrap();
        let report = dumper.dump_all().await.unwrap();

        let artifact = &report.artifacts[0];
        assert!(artifact.path.is_absolute());
        assert!(artifact.path.exists());
        assert_eq!(
            artifact.path.parent().unwrap().canonicalize().unwrap(),
            relative.canonicalize().unwrap()
        );
    }
}
