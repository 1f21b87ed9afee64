use std::collections::BTreeMap;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{MigrationError, Result};
use crate::types::{MigrationInfo, MigrationState};

pub mod executor;
pub mod tracker;
pub mod versions;

pub use tracker::VersionTracker;
pub use versions::{Migration, SqlMigration};

/// Migration units ordered by ascending version.
pub struct Registry {
    migrations: Vec<Box<dyn Migration>>,
}

impl Registry {
    pub fn new(mut migrations: Vec<Box<dyn Migration>>) -> Result<Self> {
        migrations.sort_by_key(|m| m.version());

        if let Some(pair) = migrations
            .windows(2)
            .find(|pair| pair[0].version() == pair[1].version())
        {
            return Err(MigrationError::DuplicateVersion(pair[0].version()));
        }

        Ok(Self { migrations })
    }

    /// The migrations shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::new(versions::all())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Migration> {
        self.migrations.iter().map(|m| &**m)
    }

    pub fn get(&self, version: u32) -> Option<&dyn Migration> {
        self.migrations
            .binary_search_by_key(&version, |m| m.version())
            .ok()
            .map(|index| &*self.migrations[index])
    }

    pub fn latest_version(&self) -> Option<u32> {
        self.migrations.last().map(|m| m.version())
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrateOptions {
    /// Apply nothing newer than this version.
    pub target: Option<u32>,
    pub validate: bool,
    /// Allow pending versions lower than the latest applied one.
    pub out_of_order: bool,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            target: None,
            validate: true,
            out_of_order: false,
        }
    }
}

pub struct Migrator {
    registry: Registry,
    tracker: VersionTracker,
    options: MigrateOptions,
}

impl Migrator {
    pub fn new(registry: Registry, tracker: VersionTracker) -> Self {
        Self {
            registry,
            tracker,
            options: MigrateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MigrateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn tracker(&self) -> &VersionTracker {
        &self.tracker
    }

    /// Applies every pending unit and returns how many were applied.
    pub fn migrate(&self, conn: &mut Connection) -> Result<usize> {
        self.tracker.ensure_table(conn)?;

        if self.options.validate {
            self.validate(conn)?;
        }

        if let Some(target) = self.options.target
            && self.registry.get(target).is_none()
        {
            return Err(MigrationError::UnknownVersion(target));
        }

        let applied = self.tracker.applied_versions(conn)?;
        let pending: Vec<&dyn Migration> = self
            .registry
            .iter()
            .filter(|m| !applied.contains(&m.version()))
            .filter(|m| self.options.target.is_none_or(|target| m.version() <= target))
            .collect();

        if !self.options.out_of_order
            && let (Some(&latest), Some(first)) = (applied.last(), pending.first())
            && first.version() < latest
        {
            return Err(MigrationError::OutOfOrder {
                version: first.version(),
                latest,
            });
        }

        if pending.is_empty() {
            debug!(table = self.tracker.table(), "database is up to date");
            return Ok(0);
        }

        info!(count = pending.len(), "applying pending migrations");
        executor::run(conn, &self.tracker, &pending)
    }

    /// Every known and every applied version, ordered by version.
    pub fn info(&self, conn: &Connection) -> Result<Vec<MigrationInfo>> {
        let mut rows: BTreeMap<u32, MigrationInfo> = self
            .registry
            .iter()
            .map(|m| {
                (
                    m.version(),
                    MigrationInfo {
                        version: m.version(),
                        description: m.description().to_string(),
                        state: MigrationState::Pending,
                        applied_at: None,
                    },
                )
            })
            .collect();

        for record in self.tracker.applied(conn)? {
            let row = rows.entry(record.version).or_insert_with(|| MigrationInfo {
                version: record.version,
                description: record.description.clone(),
                state: MigrationState::Missing,
                applied_at: None,
            });
            if row.state == MigrationState::Pending {
                row.state = MigrationState::Applied;
            }
            row.applied_at = Some(record.applied_at);
        }

        Ok(rows.into_values().collect())
    }

    /// Checks applied records against the registry.
    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for record in self.tracker.applied(conn)? {
            let Some(migration) = self.registry.get(record.version) else {
                return Err(MigrationError::MissingMigration(record.version));
            };

            let resolved = migration.checksum();
            if resolved != record.checksum {
                return Err(MigrationError::ChecksumMismatch {
                    version: record.version,
                    applied: record.checksum,
                    resolved,
                });
            }
        }
        Ok(())
    }

    /// Reverts every applied version newer than `target`, newest first.
    /// A target of 0 reverts everything.
    pub fn rollback_to(&self, conn: &mut Connection, target: u32) -> Result<usize> {
        let applied = self.tracker.applied_versions(conn)?;

        if target != 0 && self.registry.get(target).is_none() && !applied.contains(&target) {
            return Err(MigrationError::UnknownVersion(target));
        }

        let versions: Vec<u32> = applied.into_iter().rev().filter(|v| *v > target).collect();
        self.revert_versions(conn, &versions)
    }

    /// Reverts the `count` most recently applied versions, newest first.
    pub fn rollback_n(&self, conn: &mut Connection, count: usize) -> Result<usize> {
        let versions = self.tracker.most_recent(conn, count)?;
        self.revert_versions(conn, &versions)
    }

    fn revert_versions(&self, conn: &mut Connection, versions: &[u32]) -> Result<usize> {
        let units = versions
            .iter()
            .map(|version| {
                self.registry
                    .get(*version)
                    .ok_or(MigrationError::MissingMigration(*version))
            })
            .collect::<Result<Vec<_>>>()?;

        if units.is_empty() {
            debug!("nothing to roll back");
            return Ok(0);
        }

        executor::revert(conn, &self.tracker, &units)
    }
}

/// Applies the built-in migrations with the default history table.
pub fn run_migrations(conn: &mut Connection) -> Result<usize> {
    Migrator::new(Registry::builtin()?, VersionTracker::default()).migrate(conn)
}

pub fn rollback_to(conn: &mut Connection, target: u32) -> Result<usize> {
    Migrator::new(Registry::builtin()?, VersionTracker::default()).rollback_to(conn, target)
}

pub fn rollback_n(conn: &mut Connection, count: usize) -> Result<usize> {
    Migrator::new(Registry::builtin()?, VersionTracker::default()).rollback_n(conn, count)
}
