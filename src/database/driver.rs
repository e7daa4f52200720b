use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// User databases on the server, in catalog order.
    async fn list_databases(&self) -> Result<Vec<String>>;
    /// Writes a plain-text dump of `db_name` to `output`.
    async fn dump_database(&self, db_name: &str, output: &Path) -> Result<()>;
    fn engine_name(&self) -> &'static str;
}
