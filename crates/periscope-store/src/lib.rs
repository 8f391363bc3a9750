//! SQLite persistence for Periscope
//!
//! [`SqliteStore`] is the narrow adapter the proxy writes through; the
//! retention worker in [`retention`] periodically prunes and redacts old
//! records through the same store.

pub mod retention;
mod sqlite;

pub use retention::{RetentionPolicy, run_retention_pass, spawn_retention_worker};
pub use sqlite::{SENSITIVE_HEADERS, SqliteStore};
