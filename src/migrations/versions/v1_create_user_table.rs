use crate::errors::Result;
use crate::migrations::versions::Migration;
use rusqlite::Transaction;

pub struct CreateUserTable;

impl Migration for CreateUserTable {
    fn version(&self) -> u32 {
        1
    }

    fn description(&self) -> &str {
        "Create user table"
    }

    fn up(&self, transaction: &Transaction) -> Result<()> {
        transaction.execute(
            "CREATE TABLE IF NOT EXISTS user (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            last_name TEXT
        )",
            [],
        )?;
        Ok(())
    }

    fn down(&self, transaction: &Transaction) -> Result<()> {
        transaction.execute("DROP TABLE IF EXISTS user", [])?;
        Ok(())
    }
}
