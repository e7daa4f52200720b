mod backup;
mod config;
mod database;
mod error;
mod log;
mod upload;

use database::create_driver;
use std::error::Error;
use std::process::ExitCode;
use tracing::{error, info};
use upload::DriveClient;

#[tokio::main]
async fn main() -> ExitCode {
    let (config, config_source) = match config::load() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_file = match log::init(&config.log_dir) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("{}", "=".repeat(50));
    info!("Starting PostgreSQL backup process");
    info!("{}", "=".repeat(50));
    info!("Logging to {}", log_file.display());
    match &config_source {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!(
            "No config file at {}, using defaults and environment",
            config::config_path().display()
        ),
    }
    info!(
        "Server {}:{} as {}, dumps in {}",
        config.database.host,
        config.database.port,
        config.database.username,
        config.dump_dir.display()
    );

    let driver = create_driver(&config.database);
    let result =
        backup::execute_backup(&config, driver.as_ref(), || DriveClient::connect(&config.drive))
            .await;

    match result {
        Ok(summary) => {
            info!(
                "Dumped {} database(s) ({} failed), uploaded {}, removed {} local file(s)",
                summary.dumped, summary.failed_dumps, summary.uploaded, summary.removed
            );
            if summary.removal_failures > 0 {
                info!("{} local file(s) could not be removed", summary.removal_failures);
            }
            info!("{}", "=".repeat(50));
            info!("Backup process completed successfully");
            info!("{}", "=".repeat(50));
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Backup process failed: {}", e);
            let mut source = e.source();
            while let Some(cause) = source {
                error!("  caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
