//! Applies and reverts migration units, one transaction per unit.

use rusqlite::Connection;
use tracing::{info, warn};

use crate::errors::{MigrationError, Result};
use crate::migrations::tracker::VersionTracker;
use crate::migrations::versions::Migration;

/// Applies `pending` in ascending version order and returns how many were applied.
///
/// Stops at the first failing unit. Its transaction is rolled back, so no
/// record is written for it, and later units are not attempted. Units applied
/// before the failure stay committed.
pub fn run(
    conn: &mut Connection,
    tracker: &VersionTracker,
    pending: &[&dyn Migration],
) -> Result<usize> {
    let mut ordered = pending.to_vec();
    ordered.sort_by_key(|m| m.version());

    let mut applied = 0;
    for migration in ordered {
        apply(conn, tracker, migration)?;
        applied += 1;
    }
    Ok(applied)
}

fn apply(conn: &mut Connection, tracker: &VersionTracker, migration: &dyn Migration) -> Result<()> {
    let tx = conn.transaction()?;

    // Deferred constraints are only checked at commit, so commit belongs to the unit.
    let outcome = match migration.up(&tx).and_then(|()| tracker.record(&tx, migration)) {
        Ok(()) => tx.commit().map_err(MigrationError::from),
        Err(err) => Err(err),
    };

    if let Err(source) = outcome {
        warn!(
            version = migration.version(),
            description = migration.description(),
            error = %source,
            "migration failed, rolling back"
        );
        return Err(MigrationError::Failed {
            version: migration.version(),
            description: migration.description().to_string(),
            source: Box::new(source),
        });
    }

    info!(
        version = migration.version(),
        description = migration.description(),
        "applied migration"
    );
    Ok(())
}

/// Reverts `units` in the order given, removing each one's record.
pub fn revert(
    conn: &mut Connection,
    tracker: &VersionTracker,
    units: &[&dyn Migration],
) -> Result<usize> {
    let mut reverted = 0;
    for migration in units {
        revert_one(conn, tracker, *migration)?;
        reverted += 1;
    }
    Ok(reverted)
}

fn revert_one(conn: &mut Connection, tracker: &VersionTracker, migration: &dyn Migration) -> Result<()> {
    let tx = conn.transaction()?;

    let outcome = match migration
        .down(&tx)
        .and_then(|()| tracker.remove(&tx, migration.version()))
    {
        Ok(()) => tx.commit().map_err(MigrationError::from),
        Err(err) => Err(err),
    };

    match outcome {
        Ok(()) => {}
        Err(err @ MigrationError::Irreversible(_)) => return Err(err),
        Err(source) => {
            warn!(
                version = migration.version(),
                error = %source,
                "rollback failed"
            );
            return Err(MigrationError::Failed {
                version: migration.version(),
                description: migration.description().to_string(),
                source: Box::new(source),
            });
        }
    }

    info!(
        version = migration.version(),
        description = migration.description(),
        "rolled back migration"
    );
    Ok(())
}
