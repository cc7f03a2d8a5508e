// ABOUTME: Error taxonomy for the migration engine
// ABOUTME: Separates fatal configuration, topology, drift, and execution failures

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the migration engine
///
/// Every variant is fatal for the current run. Malformed migration filenames
/// are not represented here: they are logged and skipped.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// Connection string, TLS material, or config file is unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Replication was requested but no single cluster could be chosen
    #[error("{message}")]
    ClusterResolution {
        message: String,
        available: Vec<String>,
    },

    /// An applied migration no longer matches its recorded checksum
    #[error(
        "Migration {version}_{name} has been modified. \
         Expected checksum: {expected}. Actual checksum: {actual}."
    )]
    ChecksumDrift {
        version: String,
        name: String,
        expected: String,
        actual: String,
    },

    /// The server rejected one of a migration's statements
    #[error("Statement {} of migration {migration} failed: {message}", .statement_index + 1)]
    StatementExecution {
        migration: String,
        statement_index: usize,
        message: String,
    },

    /// The server rejected an engine-issued request
    #[error("ClickHouse error: {message}")]
    ClickHouse { message: String },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Failed to render migration {migration}: {message}")]
    Template { migration: String, message: String },

    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration file {} is not valid UTF-8", .path.display())]
    InvalidUtf8 { path: PathBuf },

    /// A row returned by the server did not have the expected shape
    #[error("Unexpected response from ClickHouse: {0}")]
    Decode(String),

    #[error("Migration repository not initialized")]
    NotInitialized,
}

impl MigrationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrationError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias used across the engine
pub type Result<T> = std::result::Result<T, MigrationError>;
