use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use migrun::{Database, MigrationInfo, MigrunConfig, database};

#[derive(Parser)]
#[command(name = "migrun")]
#[command(version)]
#[command(about = "Apply versioned migrations to a SQLite database")]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// Path to a migrun.toml config file
    #[arg(long, global = true, env = "MIGRUN_CONFIG")]
    config: Option<PathBuf>,

    /// Database file, overriding the config file
    #[arg(long, global = true, env = "MIGRUN_DATABASE")]
    database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending migrations
    Migrate {
        /// Stop after applying this version
        #[arg(long)]
        target: Option<u32>,
    },
    /// Show applied, pending and missing migrations
    Info,
    /// Check applied migrations against the known ones
    Validate,
    /// Revert applied migrations
    Rollback(RollbackArgs),
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct RollbackArgs {
    /// Revert everything newer than this version (0 reverts all)
    #[arg(long)]
    to: Option<u32>,

    /// Revert this many of the most recently applied migrations
    #[arg(long)]
    count: Option<usize>,
}

enum RollbackTarget {
    Version(u32),
    Count(usize),
}

impl RollbackArgs {
    /// The arg group guarantees exactly one of `--to` and `--count`.
    fn target(&self) -> RollbackTarget {
        match self.count {
            Some(count) => RollbackTarget::Count(count),
            None => RollbackTarget::Version(self.to.unwrap_or_default()),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    let mut config =
        MigrunConfig::load_or_default(cli.config.as_deref()).context("failed to load config")?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }

    let mut db = Database::open(&config.database).context("failed to open database")?;

    match cli.command {
        Commands::Migrate { target } => {
            let migrator = database::migrator(&config, target)?;
            let applied = migrator.migrate(db.connection_mut())?;
            println!("Applied {applied} migration(s)");
        }
        Commands::Info => {
            let migrator = database::migrator(&config, None)?;
            print_info(&migrator.info(db.connection())?);
        }
        Commands::Validate => {
            let migrator = database::migrator(&config, None)?;
            migrator.validate(db.connection())?;
            println!("Validated {} migration(s)", migrator.registry().len());
        }
        Commands::Rollback(args) => {
            let migrator = database::migrator(&config, None)?;
            let reverted = match args.target() {
                RollbackTarget::Version(target) => {
                    migrator.rollback_to(db.connection_mut(), target)?
                }
                RollbackTarget::Count(count) => migrator.rollback_n(db.connection_mut(), count)?,
            };
            println!("Rolled back {reverted} migration(s)");
        }
    }

    Ok(())
}

fn print_info(rows: &[MigrationInfo]) {
    if rows.is_empty() {
        println!("No migrations found");
        return;
    }

    let width = rows
        .iter()
        .map(|row| row.description.len())
        .max()
        .unwrap_or(0)
        .max("Description".len());

    println!(
        "{:<8} {:<width$} {:<8} {}",
        "Version", "Description", "State", "Applied at"
    );
    for row in rows {
        println!(
            "{:<8} {:<width$} {:<8} {}",
            row.version,
            row.description,
            row.state.to_string(),
            row.format_applied_at()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("migrun").chain(args.iter().copied())).unwrap()
    }

    fn write_config(dir: &TempDir, db_path: &Path) -> PathBuf {
        let config_path = dir.path().join("migrun.toml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "[database]\npath = {:?}", db_path.display().to_string()).unwrap();
        config_path
    }

    fn applied_versions(db_path: &Path) -> Vec<u32> {
        let conn = rusqlite::Connection::open(db_path).unwrap();
        let mut stmt = conn
            .prepare("SELECT version FROM __migrations ORDER BY version")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<u32>>>()
            .unwrap()
    }

    #[test]
    fn database_flag_overrides_config_path() {
        let dir = tempfile::tempdir().unwrap();
        let configured = dir.path().join("configured.db");
        let overridden = dir.path().join("overridden.db");
        let config = write_config(&dir, &configured);

        let cli = parse(&[
            "--config",
            config.to_str().unwrap(),
            "--database",
            overridden.to_str().unwrap(),
            "migrate",
        ]);
        execute(cli).unwrap();

        assert!(overridden.exists());
        assert!(!configured.exists());
        assert_eq!(applied_versions(&overridden), vec![1, 2]);
    }

    #[test]
    fn config_file_selects_database() {
        let dir = tempfile::tempdir().unwrap();
        let configured = dir.path().join("configured.db");
        let config = write_config(&dir, &configured);

        execute(parse(&["--config", config.to_str().unwrap(), "migrate", "--target", "1"])).unwrap();

        assert_eq!(applied_versions(&configured), vec![1]);
    }

    #[test]
    fn failing_migrate_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("app.db");
        let config = write_config(&dir, &db_path);
        rusqlite::Connection::open(&db_path)
            .unwrap()
            .execute("CREATE TABLE user (id INTEGER PRIMARY KEY)", [])
            .unwrap();

        let err = execute(parse(&["--config", config.to_str().unwrap(), "migrate"])).unwrap_err();

        let migration_err = err.downcast_ref::<migrun::MigrationError>().unwrap();
        assert_eq!(migration_err.version(), Some(2));
        assert_eq!(applied_versions(&db_path), vec![1]);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(execute(parse(&["--config", missing.to_str().unwrap(), "info"])).is_err());
    }

    #[test]
    fn rollback_dispatches_on_to_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("app.db");
        let config = write_config(&dir, &db_path);
        let config = config.to_str().unwrap();

        execute(parse(&["--config", config, "migrate", "--target", "1"])).unwrap();
        execute(parse(&["--config", config, "rollback", "--to", "0"])).unwrap();
        assert!(applied_versions(&db_path).is_empty());

        execute(parse(&["--config", config, "migrate"])).unwrap();
        let err = execute(parse(&["--config", config, "rollback", "--count", "1"])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<migrun::MigrationError>(),
            Some(migrun::MigrationError::Irreversible(2))
        ));
        assert_eq!(applied_versions(&db_path), vec![1, 2]);
    }

    #[test]
    fn rollback_needs_exactly_one_selector() {
        let parse_err = |args: &[&str]| {
            Cli::try_parse_from(std::iter::once("migrun").chain(args.iter().copied())).is_err()
        };
        assert!(parse_err(&["rollback"]));
        assert!(parse_err(&["rollback", "--to", "1", "--count", "2"]));
        assert!(!parse_err(&["rollback", "--count", "2"]));
    }

    #[test]
    fn rollback_target_prefers_the_given_selector() {
        let to = RollbackArgs { to: Some(3), count: None };
        let count = RollbackArgs { to: None, count: Some(2) };
        assert!(matches!(to.target(), RollbackTarget::Version(3)));
        assert!(matches!(count.target(), RollbackTarget::Count(2)));
    }
}
