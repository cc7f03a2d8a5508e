// ABOUTME: Content checksums for migration drift detection
// ABOUTME: Computes sha-256 hex digests of raw migration file bytes

use crate::error::{MigrationError, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Compute the lowercase sha-256 hex digest of raw bytes
///
/// # Examples
///
/// ```
/// # use clickhouse_migrator::migration::calculate_checksum;
/// assert_eq!(
///     calculate_checksum(b"hello"),
///     "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
/// );
/// ```
pub fn calculate_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Read a file and checksum its bytes exactly as stored on disk
///
/// Used by both the pending-migration diff and the standalone `checksum`
/// command so the two always agree.
pub async fn checksum_file(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| MigrationError::io(path, e))?;
    Ok(calculate_checksum(&bytes))
}
