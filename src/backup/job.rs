use crate::backup::dump::Dumper;
use crate::config::AppConfig;
use crate::database::DatabaseDriver;
use crate::error::{BackupError, Result};
use crate::upload::{RemoteStorage, UploadOutcome, Uploader};
use chrono::Local;
use std::future::Future;
use tokio::fs;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub dumped: usize,
    pub failed_dumps: usize,
    pub uploaded: usize,
    pub removed: usize,
    pub removal_failures: usize,
}

/// Runs one backup: dump every database, authenticate via `connect`, upload
/// the dumps and remove the local copies that made it to the remote side.
///
/// `connect` is only called once there is something to upload.
pub async fn execute_backup<F, Fut, S>(
    config: &AppConfig,
    driver: &dyn DatabaseDriver,
    connect: F,
) -> Result<RunSummary>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<S>>,
    S: RemoteStorage,
{
    let started_at = Local::now();

    info!("Dumping all databases...");
    let report = Dumper::new(driver, &config.dump_dir)?.dump_all().await?;
    if report.artifacts.is_empty() {
        warn!("No dump files were created");
        return Err(BackupError::NothingDumped);
    }
    info!("Created {} dump file(s)", report.artifacts.len());
    for artifact in &report.artifacts {
        debug!(
            "{} -> {} ({})",
            artifact.database,
            artifact.path.display(),
            artifact.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    for (database, e) in &report.failures {
        warn!("Skipping {}: {}", database, e);
    }

    info!("Initializing remote storage...");
    let storage = connect().await?;

    let uploader = if config.drive.session_folder {
        Uploader::with_session_folder(&storage, config.drive.folder_id.as_deref(), started_at).await
    } else {
        Uploader::new(&storage, config.drive.folder_id.clone())
    };

    match uploader.folder_id() {
        Some(folder) => info!("Uploading dump files to {} folder {}...", storage.name(), folder),
        None => info!("Uploading dump files to {} root...", storage.name()),
    }
    let outcome = uploader.upload_many(&report.paths()).await;
    info!(
        "Successfully uploaded {}/{} files",
        outcome.succeeded(),
        outcome.entries().len()
    );
    for (path, result) in outcome.entries() {
        if let Err(e) = result {
            warn!("Not uploaded, keeping {}: {}", path.display(), e);
        }
    }

    let (removed, removal_failures) = if config.keep_local_dumps {
        info!("Keeping local dump files in {}", config.dump_dir.display());
        (0, 0)
    } else {
        remove_uploaded(&outcome).await
    };

    Ok(RunSummary {
        dumped: report.artifacts.len(),
        failed_dumps: report.failures.len(),
        uploaded: outcome.succeeded(),
        removed,
        removal_failures,
    })
}

/// Deletes the local file of every successful upload. Failures are logged
/// and counted, never returned.
pub async fn remove_uploaded(outcome: &UploadOutcome) -> (usize, usize) {
    let mut removed = 0;
    let mut failed = 0;

    for (path, _) in outcome.uploaded() {
        match fs::remove_file(path).await {
            Ok(()) => {
                info!("Cleaned up local file: {}", path.display());
                removed += 1;
            }
            Err(e) => {
                warn!("Could not remove {}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    (removed, failed)
}
