// ABOUTME: Checksum command implementation - Print a migration file's checksum
// ABOUTME: Uses the same digest the runner stores in the tracking table

use crate::migration::checksum_file;
use anyhow::{Context, Result};
use std::path::Path;

/// Compute and print the SHA-256 checksum of a migration file
///
/// Useful for comparing a file on disk with the `checksum` column of the
/// tracking table after a drift error.
pub async fn checksum(path: &Path) -> Result<String> {
    let digest = checksum_file(path)
        .await
        .with_context(|| format!("Failed to checksum {}", path.display()))?;

    tracing::info!("File: {}", path.display());
    tracing::info!("Checksum: {}", digest);
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::calculate_checksum;

    #[tokio::test]
    async fn test_checksum_matches_runner_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("001_init.sql");
        std::fs::write(&path, "CREATE TABLE t (id UInt64) ENGINE = Memory;\n").unwrap();

        let digest = checksum(&path).await.unwrap();
        assert_eq!(
            digest,
            calculate_checksum(b"CREATE TABLE t (id UInt64) ENGINE = Memory;\n")
        );
    }

    #[tokio::test]
    async fn test_checksum_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = checksum(&dir.path().join("missing.sql")).await;
        assert!(result.is_err());
    }
}
