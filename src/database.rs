use std::fs;

use rusqlite::Connection;
use tracing::info;

use crate::config::{DatabaseSettings, MigrunConfig};
use crate::errors::Result;
use crate::migrations::{Migrator, Registry, VersionTracker};

/// An open target database.
pub struct Database {
    connection: Connection,
}

impl Database {
    pub fn open(settings: &DatabaseSettings) -> Result<Self> {
        if let Some(parent) = settings.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        info!("opening database at {}", settings.path.display());
        let connection = Connection::open(&settings.path)?;
        Self::configure(connection, settings.foreign_keys)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory()?, true)
    }

    fn configure(connection: Connection, foreign_keys: bool) -> Result<Self> {
        connection.pragma_update(None, "foreign_keys", foreign_keys)?;
        Ok(Self { connection })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }
}

/// Builds a migrator over the built-in migrations using the configured history table.
pub fn migrator(config: &MigrunConfig, target: Option<u32>) -> Result<Migrator> {
    let tracker = VersionTracker::new(config.migrations.table.clone())?;
    Ok(Migrator::new(Registry::builtin()?, tracker).with_options(config.migrate_options(target)))
}
