use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{MigrationError, Result};
use crate::migrations::{MigrateOptions, tracker::DEFAULT_TABLE};

/// Configuration stored in `migrun.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrunConfig {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub migrations: MigrationSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub foreign_keys: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            foreign_keys: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationSettings {
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_true")]
    pub validate_on_migrate: bool,
    #[serde(default)]
    pub out_of_order: bool,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            table: default_table(),
            validate_on_migrate: true,
            out_of_order: false,
        }
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("migrun")
        .join("migrun.db")
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_true() -> bool {
    true
}

impl MigrunConfig {
    /// `<config dir>/migrun/migrun.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("migrun").join("migrun.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| MigrationError::config(format!("{}: {e}", path.display())))
    }

    /// Loads `path` when given. Otherwise loads the default file if it exists,
    /// falling back to built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn migrate_options(&self, target: Option<u32>) -> MigrateOptions {
        MigrateOptions {
            target,
            validate: self.migrations.validate_on_migrate,
            out_of_order: self.migrations.out_of_order,
        }
    }
}
