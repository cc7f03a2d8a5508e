// ABOUTME: Run command implementation - Apply pending migrations
// ABOUTME: Shows a spinner per migration file while statements execute

use crate::config::MigratorConfig;
use crate::migration::{
    run_migrations_with_progress, ApplyReport, MigrationCommand, MigrationState,
};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn migration_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Apply all pending migrations
///
/// This command:
/// 1. Connects to ClickHouse (retrying transient failures)
/// 2. Resolves the cluster topology and creates the tracking table if needed
/// 3. Aborts if any applied migration changed on disk
/// 4. Applies pending migrations one statement at a time, in version order
///
/// The connection is released whether the run succeeds or fails.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use clickhouse_migrator::{commands, config::MigratorConfig};
/// # async fn example() -> Result<()> {
/// let config = MigratorConfig::new("http://default:@localhost:8123/app", "migrations")?;
/// let report = commands::run(&config).await?;
/// println!("Applied {} migration(s)", report.applied.len());
/// # Ok(())
/// # }
/// ```
pub async fn run(config: &MigratorConfig) -> Result<ApplyReport> {
    tracing::info!("Connecting to ClickHouse...");

    let mut spinner: Option<ProgressBar> = None;
    let outcome = run_migrations_with_progress(config, MigrationCommand::Run, |migration, state| {
        match state {
            MigrationState::Pending => {
                spinner = Some(migration_spinner(format!("Applying {}", migration.label())));
            }
            MigrationState::Executing { statement_index } => {
                if let Some(pb) = &spinner {
                    pb.set_message(format!(
                        "Applying {} (statement {})",
                        migration.label(),
                        statement_index + 1
                    ));
                }
            }
            MigrationState::Applied => {
                if let Some(pb) = spinner.take() {
                    pb.finish_and_clear();
                }
            }
            MigrationState::Failed { .. } => {
                if let Some(pb) = spinner.take() {
                    pb.abandon();
                }
            }
        }
    })
    .await;

    // Rendering errors fail a file before any state transition clears it
    if let Some(pb) = spinner.take() {
        pb.abandon();
    }

    let report = outcome
        .context("Migration run failed")?
        .into_applied()
        .context("Run pass did not produce an apply report")?;

    if !report.applied.is_empty() {
        tracing::info!(
            "Applied {} migration(s), {} statement(s)",
            report.applied.len(),
            report.statements_executed
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsMaterial;
    use crate::MigrationError;

    #[tokio::test]
    async fn test_run_with_unusable_tls_fails_before_contact() {
        let config = MigratorConfig::new("https://default:@127.0.0.1:1/app", "migrations")
            .unwrap()
            .with_tls(TlsMaterial {
                ca_cert: b"not a certificate".to_vec(),
                client: None,
            });

        let err = run(&config).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigrationError>(),
            Some(MigrationError::Tls(_))
        ));
    }

    #[tokio::test]
    #[ignore]
    async fn test_run_command() {
        let url = std::env::var("TEST_CLICKHOUSE_URL").unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("001_create.sql"),
            "CREATE TABLE IF NOT EXISTS run_cmd_test (id UInt64) ENGINE = MergeTree ORDER BY id;",
        )
        .unwrap();

        let config = MigratorConfig::new(&url, dir.path()).unwrap();
        let result = run(&config).await;
        assert!(result.is_ok(), "Run command failed: {:?}", result);
    }
}
