// ABOUTME: Migration file discovery and filename parsing
// ABOUTME: Reads <digits>_<name>.sql files from the migrations directory in version order

use crate::error::{MigrationError, Result};
use crate::migration::checksum::calculate_checksum;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// A migration file found on disk
///
/// The raw bytes are kept undecoded; only files that are about to be applied
/// need to be valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: String,
    pub name: String,
    pub file_name: String,
    pub path: PathBuf,
    pub checksum: String,
    bytes: Vec<u8>,
}

impl MigrationFile {
    /// `<version>_<name>`, as used in log lines and error messages
    pub fn label(&self) -> String {
        format!("{}_{}", self.version, self.name)
    }

    /// File contents as text
    pub fn content(&self) -> Result<&str> {
        std::str::from_utf8(&self.bytes).map_err(|_| MigrationError::InvalidUtf8 {
            path: self.path.clone(),
        })
    }
}

/// Result of listing a migrations directory
#[derive(Debug, Default)]
pub struct DirectoryListing {
    /// `.sql` entries sorted by full filename
    pub candidates: Vec<String>,
    /// Entries ending in `.sql` that do not follow `<digits>_<name>.sql`
    pub skipped: Vec<String>,
}

fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)_(.+)\.sql$").expect("valid migration regex"))
}

/// Split a migration filename into `(version, name)`
///
/// # Examples
///
/// ```
/// # use clickhouse_migrator::migration::parse_migration_filename;
/// assert_eq!(
///     parse_migration_filename("20240101120000_create_events.sql"),
///     Some(("20240101120000".to_string(), "create_events".to_string()))
/// );
/// assert_eq!(parse_migration_filename("readme.sql"), None);
/// ```
pub fn parse_migration_filename(file_name: &str) -> Option<(String, String)> {
    let captures = filename_pattern().captures(file_name)?;
    Some((captures[1].to_string(), captures[2].to_string()))
}

/// List `.sql` files in `dir`, sorted lexicographically by filename
///
/// Entries that end in `.sql` but do not match the naming pattern are
/// returned in `skipped` so the caller can warn about them.
pub async fn list_migration_files(dir: &Path) -> Result<DirectoryListing> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| MigrationError::io(dir, e))?;

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| MigrationError::io(dir, e))?
    {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name.ends_with(".sql") {
            names.push(file_name);
        }
    }
    names.sort();

    let (candidates, skipped): (Vec<String>, Vec<String>) = names
        .into_iter()
        .partition(|name| parse_migration_filename(name).is_some());

    Ok(DirectoryListing {
        candidates,
        skipped,
    })
}

/// Load one migration file, checksumming its raw bytes
pub async fn load_migration_file(dir: &Path, file_name: &str) -> Result<MigrationFile> {
    let (version, name) = parse_migration_filename(file_name).ok_or_else(|| {
        MigrationError::Configuration(format!("Invalid migration filename: {}", file_name))
    })?;

    let path: PathBuf = dir.join(file_name);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| MigrationError::io(&path, e))?;
    let checksum = calculate_checksum(&bytes);

    Ok(MigrationFile {
        version,
        name,
        file_name: file_name.to_string(),
        path,
        checksum,
        bytes,
    })
}
