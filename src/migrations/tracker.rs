use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::{MigrationError, Result};
use crate::migrations::versions::Migration;
use crate::types::AppliedVersionRecord;

pub const DEFAULT_TABLE: &str = "__migrations";

/// Reads and writes the history table that records applied versions.
#[derive(Debug, Clone)]
pub struct VersionTracker {
    table: String,
}

impl Default for VersionTracker {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl VersionTracker {
    pub fn new(table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        if !is_valid_identifier(&table) {
            return Err(MigrationError::InvalidTableName(table));
        }
        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn ensure_table(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (
                version INTEGER PRIMARY KEY,
                installed_rank INTEGER NOT NULL,
                description TEXT NOT NULL,
                checksum TEXT,
                applied_at INTEGER NOT NULL
            )",
                self.table
            ),
            [],
        )?;
        Ok(())
    }

    pub fn exists(&self, conn: &Connection) -> Result<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                [&self.table],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Applied records ordered by version. Empty when the table does not exist yet.
    pub fn applied(&self, conn: &Connection) -> Result<Vec<AppliedVersionRecord>> {
        if !self.exists(conn)? {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT version, description, checksum, applied_at FROM \"{}\" ORDER BY version",
            self.table
        ))?;

        let records = stmt
            .query_map([], |row| {
                let seconds: i64 = row.get(3)?;
                let applied_at = DateTime::<Utc>::from_timestamp(seconds, 0).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        Type::Integer,
                        format!("applied_at out of range: {seconds}").into(),
                    )
                })?;
                Ok(AppliedVersionRecord {
                    version: row.get(0)?,
                    description: row.get(1)?,
                    checksum: row.get(2)?,
                    applied_at,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    pub fn applied_versions(&self, conn: &Connection) -> Result<BTreeSet<u32>> {
        Ok(self
            .applied(conn)?
            .into_iter()
            .map(|record| record.version)
            .collect())
    }

    /// The `count` most recently applied versions, newest first.
    pub fn most_recent(&self, conn: &Connection, count: usize) -> Result<Vec<u32>> {
        if !self.exists(conn)? {
            return Ok(Vec::new());
        }

        let limit: i64 = count as i64;
        let mut stmt = conn.prepare(&format!(
            "SELECT version FROM \"{}\" ORDER BY installed_rank DESC LIMIT ?1",
            self.table
        ))?;

        let versions = stmt
            .query_map([limit], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<u32>>>()?;

        Ok(versions)
    }

    pub fn record(&self, conn: &Connection, migration: &dyn Migration) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO \"{0}\" (version, installed_rank, description, checksum, applied_at)
                 SELECT ?1, COALESCE(MAX(installed_rank), 0) + 1, ?2, ?3, ?4 FROM \"{0}\"",
                self.table
            ),
            params![
                migration.version(),
                migration.description(),
                migration.checksum(),
                Utc::now().timestamp(),
            ],
        )?;
        Ok(())
    }

    pub fn remove(&self, conn: &Connection, version: u32) -> Result<()> {
        conn.execute(
            &format!("DELETE FROM \"{}\" WHERE version = ?1", self.table),
            [version],
        )?;
        Ok(())
    }
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::versions::SqlMigration;

    #[test]
    fn rejects_unsafe_table_names() {
        assert!(VersionTracker::new("schema_history").is_ok());
        assert!(VersionTracker::new("_h1").is_ok());
        assert!(VersionTracker::new("").is_err());
        assert!(VersionTracker::new("1history").is_err());
        assert!(VersionTracker::new("history\"; DROP TABLE user; --").is_err());
    }

    #[test]
    fn applied_is_empty_before_table_exists() {
        let conn = Connection::open_in_memory().unwrap();
        let tracker = VersionTracker::default();
        assert!(!tracker.exists(&conn).unwrap());
        assert!(tracker.applied(&conn).unwrap().is_empty());
        assert!(tracker.most_recent(&conn, 5).unwrap().is_empty());
    }

    #[test]
    fn records_in_installation_order() {
        let conn = Connection::open_in_memory().unwrap();
        let tracker = VersionTracker::new("history").unwrap();
        tracker.ensure_table(&conn).unwrap();

        tracker
            .record(&conn, &SqlMigration::new(5, "five", "SELECT 1"))
            .unwrap();
        tracker
            .record(&conn, &SqlMigration::new(3, "three", "SELECT 1"))
            .unwrap();

        let applied = tracker.applied(&conn).unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].version, 3);
        assert_eq!(applied[0].description, "three");
        assert!(applied[0].checksum.is_some());

        assert_eq!(tracker.most_recent(&conn, 1).unwrap(), vec![3]);
        assert_eq!(tracker.most_recent(&conn, 10).unwrap(), vec![3, 5]);

        tracker.remove(&conn, 3).unwrap();
        assert_eq!(
            tracker.applied_versions(&conn).unwrap().into_iter().collect::<Vec<_>>(),
            vec![5]
        );
    }

    #[test]
    fn duplicate_record_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let tracker = VersionTracker::default();
        tracker.ensure_table(&conn).unwrap();

        let m = SqlMigration::new(1, "one", "SELECT 1");
        tracker.record(&conn, &m).unwrap();
        assert!(tracker.record(&conn, &m).is_err());
    }

    #[test]
    fn table_lookup_ignores_case() {
        let conn = Connection::open_in_memory().unwrap();
        let lower = VersionTracker::new("history").unwrap();
        lower.ensure_table(&conn).unwrap();
        lower
            .record(&conn, &SqlMigration::new(1, "one", "SELECT 1"))
            .unwrap();

        let mixed = VersionTracker::new("History").unwrap();
        mixed.ensure_table(&conn).unwrap();
        assert!(mixed.exists(&conn).unwrap());
        assert_eq!(mixed.applied(&conn).unwrap().len(), 1);
        assert_eq!(mixed.most_recent(&conn, 3).unwrap(), vec![1]);
    }

    #[test]
    fn corrupt_timestamp_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        let tracker = VersionTracker::default();
        tracker.ensure_table(&conn).unwrap();
        conn.execute(
            "INSERT INTO __migrations (version, installed_rank, description, checksum, applied_at)
             VALUES (1, 1, 'one', NULL, ?1)",
            [i64::MAX],
        )
        .unwrap();

        assert!(matches!(
            tracker.applied(&conn),
            Err(MigrationError::Database(rusqlite::Error::FromSqlConversionFailure(3, ..)))
        ));
    }
}
