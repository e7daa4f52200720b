use super::driver::DatabaseDriver;
use crate::config::{DatabaseConfig, SslMode};
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio_postgres::config::SslMode as PgSslMode;
use tracing::{debug, info};

const LIST_DATABASES_QUERY: &str =
    "SELECT datname FROM pg_database WHERE datistemplate = false AND datname <> $1";

pub struct PostgresDriver {
    config: DatabaseConfig,
}

impl PostgresDriver {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn connect_config(&self) -> tokio_postgres::Config {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.config.host)
            .port(self.config.port)
            .user(&self.config.username)
            .dbname(&self.config.maintenance_db)
            .application_name("pg-drive-backup")
            .ssl_mode(match self.config.ssl_mode {
                SslMode::Disable => PgSslMode::Disable,
                SslMode::Prefer => PgSslMode::Prefer,
                SslMode::Require => PgSslMode::Require,
            });
        if !self.config.password.is_empty() {
            pg.password(&self.config.password);
        }
        pg
    }

    /// Same trust model as libpq `prefer`/`require`: encrypt, don't verify.
    fn tls_connector(&self) -> Result<MakeTlsConnector> {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| BackupError::Database(format!("TLS setup failed: {}", e)))?;
        Ok(MakeTlsConnector::new(connector))
    }

    /// Catalog query and its single parameter, the maintenance database to skip.
    fn catalog_query(&self) -> (&'static str, &str) {
        (LIST_DATABASES_QUERY, &self.config.maintenance_db)
    }

    fn dump_command(&self, db_name: &str, output: &Path) -> Command {
        let mut command = Command::new(&self.config.pg_dump_path);
        command
            .arg("-h")
            .arg(&self.config.host)
            .arg("-p")
            .arg(self.config.port.to_string())
            .arg("-U")
            .arg(&self.config.username)
            .args(["-F", "p"])
            .arg("-f")
            .arg(output)
            .arg(db_name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .env("PGSSLMODE", self.config.ssl_mode.as_str());

        // Only the child sees the password; it never reaches argv.
        if !self.config.password.is_empty() {
            command.env("PGPASSWORD", &self.config.password);
        }
        command
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    async fn list_databases(&self) -> Result<Vec<String>> {
        debug!(
            "Connecting to {}:{}/{} (sslmode={})",
            self.config.host,
            self.config.port,
            self.config.maintenance_db,
            self.config.ssl_mode.as_str()
        );
        let tls = self.tls_connector()?;
        let (client, connection) = self.connect_config().connect(tls).await?;
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("PostgreSQL connection closed with error: {}", e);
            }
        });

        let (query, skip) = self.catalog_query();
        let rows = client.query(query, &[&skip]).await?;
        let databases: Vec<String> = rows.iter().map(|row| row.get(0)).collect();

        drop(client);
        let _ = connection.await;

        info!("Found {} databases: {:?}", databases.len(), databases);
        Ok(databases)
    }

    async fn dump_database(&self, db_name: &str, output: &Path) -> Result<()> {
        info!("Creating dump for database: {}", db_name);
        let result = self.dump_command(db_name, output).output().await?;

        if result.status.success() {
            return Ok(());
        }

        Err(BackupError::Dump {
            database: db_name.to_string(),
            status: result.status.code(),
            stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
        })
    }

    fn engine_name(&self) -> &'static str {
        "PostgreSQL"
    }
}
