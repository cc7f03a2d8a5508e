// ABOUTME: Status command implementation - Show applied and pending migrations
// ABOUTME: Read-only pass that still verifies checksums of applied migrations

use crate::config::MigratorConfig;
use crate::migration::{run_migrations, MigrationCommand, StatusReport};
use anyhow::{Context, Result};

/// Log a status report in human-readable form
fn print_report(report: &StatusReport) {
    tracing::info!("");
    tracing::info!("Migration Status");
    tracing::info!("================");
    tracing::info!("Applied: {}", report.applied_count());
    tracing::info!("Pending: {}", report.pending_count());

    if !report.applied.is_empty() {
        tracing::info!("");
        tracing::info!("Applied migrations:");
        for record in &report.applied {
            if record.applied_at.is_empty() {
                tracing::info!("  ✓ {}_{}", record.version, record.name);
            } else {
                tracing::info!(
                    "  ✓ {}_{} ({})",
                    record.version,
                    record.name,
                    record.applied_at
                );
            }
        }
    }

    if !report.pending.is_empty() {
        tracing::info!("");
        tracing::info!("Pending migrations:");
        for migration in &report.pending {
            tracing::info!("  ⏳ {}", migration.label());
        }
    }
}

/// Show which migrations are applied and which are pending
///
/// This command:
/// 1. Connects to ClickHouse and creates the tracking table if needed
/// 2. Verifies checksums of applied migrations (drift is an error)
/// 3. Lists applied and pending migrations without executing anything
pub async fn status(config: &MigratorConfig) -> Result<StatusReport> {
    tracing::info!("Checking migration status...");
    let report = run_migrations(config, MigrationCommand::Status)
        .await
        .context("Migration status failed")?
        .into_status()
        .context("Status pass did not produce a status report")?;

    print_report(&report);
    Ok(report)
}
