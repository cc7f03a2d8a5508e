// ABOUTME: Tracking table lifecycle, cluster topology resolution, and pending diff
// ABOUTME: Compares on-disk migrations with applied records and detects checksum drift

use crate::clickhouse::ClickHouseConnection;
use crate::error::{MigrationError, Result};
use crate::migration::files::{list_migration_files, load_migration_file, MigrationFile};
use crate::utils::sanitize_identifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Cluster named `default` is only chosen when nothing more specific exists
const DEFAULT_CLUSTER: &str = "default";

/// How the tracking table (and templated DDL) address the server topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterContext {
    NonReplicated,
    Replicated { cluster: String },
}

impl ClusterContext {
    pub fn is_replicated(&self) -> bool {
        matches!(self, ClusterContext::Replicated { .. })
    }

    pub fn cluster_name(&self) -> Option<&str> {
        match self {
            ClusterContext::Replicated { cluster } => Some(cluster),
            ClusterContext::NonReplicated => None,
        }
    }

    /// `ON CLUSTER "<name>"` for replicated setups, empty otherwise
    ///
    /// # Examples
    ///
    /// ```
    /// # use clickhouse_migrator::migration::ClusterContext;
    /// let ctx = ClusterContext::Replicated { cluster: "my\"cluster".to_string() };
    /// assert_eq!(ctx.on_cluster_clause(), r#"ON CLUSTER "my\"cluster""#);
    /// assert_eq!(ClusterContext::NonReplicated.on_cluster_clause(), "");
    /// ```
    pub fn on_cluster_clause(&self) -> String {
        match self {
            ClusterContext::Replicated { cluster } => {
                format!("ON CLUSTER \"{}\"", cluster.replace('"', "\\\""))
            }
            ClusterContext::NonReplicated => String::new(),
        }
    }
}

/// Topology is looked up once per repository and never changes afterwards
#[derive(Debug, Clone, Default)]
enum ClusterState {
    #[default]
    Unresolved,
    Resolved(ClusterContext),
}

/// One row of the tracking table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version: String,
    pub name: String,
    pub checksum: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub applied_by: String,
    #[serde(default)]
    pub cli_version: String,
    #[serde(default)]
    pub applied_at: String,
}

/// Who applied a migration, from where, with which tool version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub hostname: String,
    pub applied_by: String,
    pub cli_version: String,
}

impl Provenance {
    /// Provenance of the current process
    pub fn current() -> Self {
        Self {
            hostname: crate::utils::hostname(),
            applied_by: crate::utils::current_user(),
            cli_version: crate::utils::tool_version().to_string(),
        }
    }
}

/// Row written after a migration's statements all succeed
///
/// `applied_at` is left to the column default so the server clock is used.
#[derive(Debug, Serialize)]
struct NewMigrationRecord<'a> {
    version: &'a str,
    name: &'a str,
    checksum: &'a str,
    hostname: &'a str,
    applied_by: &'a str,
    cli_version: &'a str,
}

/// Outcome of diffing the migrations directory against applied records
#[derive(Debug, Default)]
pub struct PendingMigrationsResult {
    /// Unapplied migrations in application order
    pub pending: Vec<MigrationFile>,
    /// Set when an applied migration changed on disk; `pending` is then empty
    pub drift_error: Option<MigrationError>,
    /// `.sql` files skipped because their names do not match `<digits>_<name>.sql`
    pub skipped: Vec<String>,
}

impl PendingMigrationsResult {
    /// Pending migrations, or the drift error if one was found
    pub fn into_pending(self) -> Result<Vec<MigrationFile>> {
        match self.drift_error {
            Some(err) => Err(err),
            None => Ok(self.pending),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClusterRow {
    cluster: String,
}

/// Choose the cluster for a replicated tracking table
///
/// `clusters` may contain duplicates (one row per replica in
/// `system.clusters`). Selection order: the hint if given (must exist), the
/// single non-default cluster, then `default`.
pub fn select_cluster(clusters: &[String], hint: Option<&str>) -> Result<String> {
    let mut names: Vec<String> = Vec::new();
    for cluster in clusters {
        if !names.contains(cluster) {
            names.push(cluster.clone());
        }
    }

    let resolution_error = |message: String| MigrationError::ClusterResolution {
        message,
        available: names.clone(),
    };

    if let Some(hint) = hint.filter(|h| !h.is_empty()) {
        if names.iter().any(|name| name == hint) {
            return Ok(hint.to_string());
        }
        return Err(resolution_error(format!(
            "Cluster \"{}\" not found. Available clusters: {}",
            hint,
            names.join(", ")
        )));
    }

    let non_default: Vec<&String> = names.iter().filter(|n| *n != DEFAULT_CLUSTER).collect();
    match non_default.as_slice() {
        [only] => Ok((*only).clone()),
        [] if names.iter().any(|n| n == DEFAULT_CLUSTER) => Ok(DEFAULT_CLUSTER.to_string()),
        [] => Err(resolution_error(
            "Replicated migrations table requested, but no cluster found in system.clusters."
                .to_string(),
        )),
        many => Err(resolution_error(format!(
            "Multiple non-default clusters found: {}. \
             Set the cluster name in the migrations table config to choose one.",
            many.iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Owns the tracking table and the view of which migrations are applied
pub struct MigrationRepository<C> {
    connection: C,
    migrations_dir: PathBuf,
    table_name: String,
    replication_path: Option<String>,
    state: ClusterState,
}

impl<C: ClickHouseConnection> MigrationRepository<C> {
    pub fn new(
        connection: C,
        migrations_dir: impl Into<PathBuf>,
        table_name: &str,
        replication_path: Option<String>,
    ) -> Self {
        Self {
            connection,
            migrations_dir: migrations_dir.into(),
            table_name: table_name.to_string(),
            replication_path,
            state: ClusterState::Unresolved,
        }
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Give back the connection so it can be closed
    pub fn into_connection(self) -> C {
        self.connection
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Resolved topology; fails before `initialize` has run
    pub fn context(&self) -> Result<&ClusterContext> {
        match &self.state {
            ClusterState::Resolved(ctx) => Ok(ctx),
            ClusterState::Unresolved => Err(MigrationError::NotInitialized),
        }
    }

    /// Resolve the cluster topology once
    ///
    /// Returns the selected cluster name in replicated mode. Repeated calls
    /// return the cached result without querying the server.
    pub async fn initialize(
        &mut self,
        is_replicated: bool,
        cluster_name: Option<&str>,
    ) -> Result<Option<String>> {
        if let ClusterState::Resolved(ctx) = &self.state {
            return Ok(ctx.cluster_name().map(str::to_string));
        }

        let ctx = if is_replicated {
            let clusters = self.list_clusters().await?;
            let cluster = select_cluster(&clusters, cluster_name)?;
            ClusterContext::Replicated { cluster }
        } else {
            ClusterContext::NonReplicated
        };

        let selected = ctx.cluster_name().map(str::to_string);
        self.state = ClusterState::Resolved(ctx);
        Ok(selected)
    }

    /// DDL for the tracking table under the resolved topology
    pub fn tracking_table_ddl(&self) -> Result<String> {
        let ctx = self.context()?;

        let engine = if ctx.is_replicated() {
            let path = self.replication_path.clone().unwrap_or_else(|| {
                format!(
                    "/clickhouse/tables/cluster-{{cluster}}/shard-{{shard}}/{{database}}/{}",
                    self.table_name
                )
            });
            format!(
                "ReplicatedReplacingMergeTree({}, '{{replica}}')",
                quote_string(&path)
            )
        } else {
            "ReplacingMergeTree()".to_string()
        };

        let on_cluster = ctx.on_cluster_clause();
        let target = if on_cluster.is_empty() {
            self.table_name.clone()
        } else {
            format!("{} {}", self.table_name, on_cluster)
        };

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} (
    version String,
    name String,
    checksum String,
    hostname String DEFAULT '',
    applied_by String DEFAULT '',
    cli_version String DEFAULT '',
    applied_at DateTime DEFAULT now()
) ENGINE = {}
ORDER BY version",
            target, engine
        ))
    }

    /// Create the tracking table if it does not exist yet
    pub async fn ensure_tracking_table(&self) -> Result<()> {
        let ddl = self.tracking_table_ddl()?;
        let existed_before = self.migrations_table_exists().await?;

        self.connection.command(&ddl).await?;

        if !existed_before {
            let mode = if self.context()?.is_replicated() {
                "replicated"
            } else {
                "non-replicated"
            };
            tracing::info!(
                "✓ Created migrations table {} in {} mode",
                self.table_name,
                mode
            );
        }

        Ok(())
    }

    /// Applied migrations keyed by version, deduplicated by the server
    pub async fn get_applied_migrations(&self) -> Result<BTreeMap<String, MigrationRecord>> {
        let query = format!(
            "SELECT version, name, checksum, hostname, applied_by, cli_version, applied_at
             FROM {} FINAL
             ORDER BY version",
            self.table_name
        );

        let rows = self.connection.query_rows(&query).await?;
        let mut applied = BTreeMap::new();
        for row in rows {
            let record: MigrationRecord = serde_json::from_value(row)
                .map_err(|e| MigrationError::Decode(format!("migration record: {}", e)))?;
            applied.insert(record.version.clone(), record);
        }

        Ok(applied)
    }

    /// Diff the migrations directory against `applied`
    ///
    /// Stops at the first applied migration whose checksum changed and
    /// reports it as `drift_error` with no pending migrations.
    pub async fn get_pending_migrations(
        &self,
        applied: &BTreeMap<String, MigrationRecord>,
    ) -> Result<PendingMigrationsResult> {
        let listing = list_migration_files(&self.migrations_dir).await?;

        for skipped in &listing.skipped {
            tracing::warn!(
                "⚠ Skipping invalid filename: {}",
                sanitize_identifier(skipped)
            );
        }

        let mut pending = Vec::new();
        for file_name in &listing.candidates {
            let migration = load_migration_file(&self.migrations_dir, file_name).await?;

            match applied.get(&migration.version) {
                None => pending.push(migration),
                Some(record) if record.checksum == migration.checksum => {}
                Some(record) => {
                    return Ok(PendingMigrationsResult {
                        pending: Vec::new(),
                        drift_error: Some(MigrationError::ChecksumDrift {
                            version: migration.version,
                            name: migration.name,
                            expected: record.checksum.clone(),
                            actual: migration.checksum,
                        }),
                        skipped: listing.skipped,
                    });
                }
            }
        }

        Ok(PendingMigrationsResult {
            pending,
            drift_error: None,
            skipped: listing.skipped,
        })
    }

    /// Append the tracking record for a fully applied migration
    pub async fn record_applied(
        &self,
        migration: &MigrationFile,
        provenance: &Provenance,
    ) -> Result<()> {
        let record = NewMigrationRecord {
            version: &migration.version,
            name: &migration.name,
            checksum: &migration.checksum,
            hostname: &provenance.hostname,
            applied_by: &provenance.applied_by,
            cli_version: &provenance.cli_version,
        };
        let row = serde_json::to_value(&record)
            .map_err(|e| MigrationError::Decode(format!("migration record: {}", e)))?;

        self.connection.insert_rows(&self.table_name, &[row]).await
    }

    async fn list_clusters(&self) -> Result<Vec<String>> {
        let rows = self
            .connection
            .query_rows("SELECT cluster, shard_num, replica_num FROM system.clusters")
            .await?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value::<ClusterRow>(row)
                    .map(|r| r.cluster)
                    .map_err(|e| MigrationError::Decode(format!("system.clusters row: {}", e)))
            })
            .collect()
    }

    async fn migrations_table_exists(&self) -> Result<bool> {
        let (database, table) = match self.table_name.split_once('.') {
            Some((db, table)) => (quote_string(db), table),
            None => ("currentDatabase()".to_string(), self.table_name.as_str()),
        };
        let query = format!(
            "SELECT name FROM system.tables WHERE database = {} AND name = {}",
            database,
            quote_string(table)
        );

        Ok(!self.connection.query_rows(&query).await?.is_empty())
    }
}
