//! Versioned migrations for SQLite databases.
//!
//! A [`Registry`] holds migration units ordered by version, a
//! [`VersionTracker`] records which versions a database has applied, and the
//! [`migrations::executor`] applies pending units one transaction at a time.

pub mod config;
pub mod database;
pub mod errors;
pub mod migrations;
pub mod types;

pub use config::MigrunConfig;
pub use database::Database;
pub use errors::{MigrationError, Result};
pub use migrations::{
    MigrateOptions, Migration, Migrator, Registry, SqlMigration, VersionTracker, run_migrations,
};
pub use types::{AppliedVersionRecord, MigrationInfo, MigrationState};
