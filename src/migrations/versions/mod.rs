use crate::errors::{MigrationError, Result};
use rusqlite::Transaction;

pub mod v1_create_user_table;
pub mod v2_trim_first_name;

pub trait Migration {
    fn version(&self) -> u32;

    fn description(&self) -> &str;

    fn up(&self, tx: &Transaction) -> Result<()>;

    fn down(&self, _tx: &Transaction) -> Result<()> {
        Err(MigrationError::Irreversible(self.version()))
    }

    /// Recorded alongside the version and compared on validation.
    /// Code migrations have no checksum.
    fn checksum(&self) -> Option<String> {
        None
    }
}

/// The migrations shipped with the crate.
pub fn all() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(v1_create_user_table::CreateUserTable),
        Box::new(v2_trim_first_name::TrimFirstName),
    ]
}

/// A migration defined entirely by SQL batches.
#[derive(Debug, Clone)]
pub struct SqlMigration {
    version: u32,
    description: String,
    up_sql: String,
    down_sql: Option<String>,
}

impl SqlMigration {
    pub fn new(version: u32, description: impl Into<String>, up_sql: impl Into<String>) -> Self {
        Self {
            version,
            description: description.into(),
            up_sql: up_sql.into(),
            down_sql: None,
        }
    }

    pub fn with_down(mut self, down_sql: impl Into<String>) -> Self {
        self.down_sql = Some(down_sql.into());
        self
    }
}

impl Migration for SqlMigration {
    fn version(&self) -> u32 {
        self.version
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn up(&self, tx: &Transaction) -> Result<()> {
        tx.execute_batch(&self.up_sql)?;
        Ok(())
    }

    fn down(&self, tx: &Transaction) -> Result<()> {
        match &self.down_sql {
            Some(sql) => {
                tx.execute_batch(sql)?;
                Ok(())
            }
            None => Err(MigrationError::Irreversible(self.version)),
        }
    }

    fn checksum(&self) -> Option<String> {
        Some(format!("{:x}", md5::compute(self.up_sql.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_versions_are_ascending() {
        let versions: Vec<u32> = all().iter().map(|m| m.version()).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[test]
    fn sql_checksum_follows_up_sql() {
        let a = SqlMigration::new(3, "a", "CREATE TABLE a (id INTEGER)");
        let b = SqlMigration::new(3, "b", "CREATE TABLE a (id INTEGER)");
        let c = SqlMigration::new(3, "a", "CREATE TABLE c (id INTEGER)");
        assert_eq!(a.checksum(), b.checksum());
        assert_ne!(a.checksum(), c.checksum());
        assert_eq!(a.checksum().map(|s| s.len()), Some(32));
    }
}
