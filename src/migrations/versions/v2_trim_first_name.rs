use crate::errors::Result;
use crate::migrations::versions::Migration;
use rusqlite::Transaction;

/// Strips leading and trailing whitespace from every `user.first_name`.
/// The original values are not kept, so this cannot be rolled back.
pub struct TrimFirstName;

impl Migration for TrimFirstName {
    fn version(&self) -> u32 {
        2
    }

    fn description(&self) -> &str {
        "Trim first name"
    }

    fn up(&self, transaction: &Transaction) -> Result<()> {
        transaction.execute("UPDATE user SET first_name = TRIM(first_name)", [])?;
        Ok(())
    }
}
