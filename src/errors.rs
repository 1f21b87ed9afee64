use thiserror::Error;

pub type Result<T> = std::result::Result<T, MigrationError>;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("migration V{version} ({description}) failed: {source}")]
    Failed {
        version: u32,
        description: String,
        #[source]
        source: Box<MigrationError>,
    },

    #[error("duplicate migration version: V{0}")]
    DuplicateVersion(u32),

    #[error("unknown migration version: V{0}")]
    UnknownVersion(u32),

    #[error("migration V{0} cannot be rolled back")]
    Irreversible(u32),

    #[error("checksum mismatch for V{version}: applied {applied:?}, resolved {resolved:?}")]
    ChecksumMismatch {
        version: u32,
        applied: Option<String>,
        resolved: Option<String>,
    },

    #[error("applied migration V{0} is not known to the registry")]
    MissingMigration(u32),

    #[error("pending migration V{version} is older than the latest applied V{latest}")]
    OutOfOrder { version: u32, latest: u32 },

    #[error("invalid history table name: {0:?}")]
    InvalidTableName(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Version of the unit this error is about, if any.
    pub fn version(&self) -> Option<u32> {
        match self {
            Self::Failed { version, .. }
            | Self::ChecksumMismatch { version, .. }
            | Self::OutOfOrder { version, .. } => Some(*version),
            Self::DuplicateVersion(v)
            | Self::UnknownVersion(v)
            | Self::Irreversible(v)
            | Self::MissingMigration(v) => Some(*v),
            _ => None,
        }
    }
}
