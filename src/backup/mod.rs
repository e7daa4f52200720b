mod dump;
mod job;

pub use job::{execute_backup, RunSummary};
