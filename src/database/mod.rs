mod driver;
mod postgres;

pub use driver::DatabaseDriver;
pub use postgres::PostgresDriver;

use crate::config::DatabaseConfig;

pub fn create_driver(config: &DatabaseConfig) -> Box<dyn DatabaseDriver> {
    Box::new(PostgresDriver::new(config))
}
