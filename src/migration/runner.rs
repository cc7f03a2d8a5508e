// ABOUTME: Migration runner orchestrating repository, renderer, and splitter
// ABOUTME: Applies pending migrations sequentially and reports migration status

use crate::clickhouse::{connect_with_retry, ClickHouseConnection, HttpConnection};
use crate::config::{MigratorConfig, ReplicationConfig};
use crate::error::{MigrationError, Result};
use crate::migration::files::MigrationFile;
use crate::migration::repository::{
    ClusterContext, MigrationRecord, MigrationRepository, Provenance,
};
use crate::migration::sql::split_statements;
use crate::migration::template::{TemplateRenderer, TemplateVars};
use std::collections::BTreeMap;

/// Which pass to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationCommand {
    Run,
    Status,
}

/// Progress of a single migration file during an apply pass
///
/// `Pending -> Executing(i) -> Applied | Failed(i)`. There is no retry and a
/// failed file is never recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Pending,
    Executing { statement_index: usize },
    Applied,
    Failed { statement_index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub version: String,
    pub name: String,
    pub statements: usize,
}

/// Result of an apply pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: Vec<AppliedMigration>,
    pub statements_executed: usize,
}

/// Result of a status pass
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    /// Applied records ordered by version
    pub applied: Vec<MigrationRecord>,
    pub pending: Vec<MigrationFile>,
}

impl StatusReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Debug)]
pub enum MigrationOutcome {
    Applied(ApplyReport),
    Status(StatusReport),
}

impl MigrationOutcome {
    pub fn into_applied(self) -> Option<ApplyReport> {
        match self {
            MigrationOutcome::Applied(report) => Some(report),
            MigrationOutcome::Status(_) => None,
        }
    }

    pub fn into_status(self) -> Option<StatusReport> {
        match self {
            MigrationOutcome::Status(report) => Some(report),
            MigrationOutcome::Applied(_) => None,
        }
    }
}

/// Applies migrations over one shared connection
pub struct MigrationRunner<C> {
    repository: MigrationRepository<C>,
    renderer: TemplateRenderer,
    replication: ReplicationConfig,
    template_vars: TemplateVars,
    provenance: Provenance,
}

impl MigrationRunner<HttpConnection> {
    /// Connect to the configured server and build a runner around it
    pub async fn connect(config: &MigratorConfig) -> Result<Self> {
        let connection = connect_with_retry(config).await?;
        Ok(Self::with_connection(config, connection))
    }
}

impl<C: ClickHouseConnection> MigrationRunner<C> {
    /// Build a runner over an already-open connection
    pub fn with_connection(config: &MigratorConfig, connection: C) -> Self {
        let repository = MigrationRepository::new(
            connection,
            config.migrations_dir(),
            config.table_name(),
            config.replication().replication_path.clone(),
        );

        Self {
            repository,
            renderer: TemplateRenderer::new(),
            replication: config.replication().clone(),
            template_vars: config.template_vars().clone(),
            provenance: Provenance::current(),
        }
    }

    /// Override the provenance written to tracking records
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    async fn initialize(&mut self) -> Result<()> {
        if self.repository.context().is_ok() {
            return Ok(());
        }

        tracing::info!("Detecting cluster configuration...");
        let cluster = self
            .repository
            .initialize(
                self.replication.is_replicated,
                self.replication.cluster_name.as_deref(),
            )
            .await
            .inspect_err(|e| tracing::error!("Failed to detect cluster configuration: {}", e))?;

        match cluster {
            Some(name) => tracing::info!("✓ Replicated mode enabled on cluster: {}", name),
            None => tracing::info!("Using non-replicated mode"),
        }

        Ok(())
    }

    /// Shared first half of both passes: topology, table, diff
    async fn prepare(&mut self) -> Result<(BTreeMap<String, MigrationRecord>, Vec<MigrationFile>)> {
        self.initialize().await?;
        self.repository.ensure_tracking_table().await?;

        let applied = self.repository.get_applied_migrations().await?;
        let pending = self
            .repository
            .get_pending_migrations(&applied)
            .await?
            .into_pending()?;

        Ok((applied, pending))
    }

    /// Variables visible to migration templates
    ///
    /// The cluster context is exposed as `cluster`, `is_replicated` and
    /// `create_table_options`; configured variables override these.
    fn template_context(&self, ctx: &ClusterContext) -> TemplateVars {
        let mut vars = TemplateVars::new();
        vars.insert(
            "cluster".to_string(),
            ctx.cluster_name().unwrap_or_default().into(),
        );
        vars.insert("is_replicated".to_string(), ctx.is_replicated().into());
        vars.insert(
            "create_table_options".to_string(),
            ctx.on_cluster_clause().into(),
        );
        vars.extend(self.template_vars.clone());
        vars
    }

    /// Apply all pending migrations
    pub async fn run(&mut self) -> Result<ApplyReport> {
        self.run_with_progress(|_, _| {}).await
    }

    /// Apply all pending migrations, reporting each file's state transitions
    pub async fn run_with_progress<F>(&mut self, mut on_progress: F) -> Result<ApplyReport>
    where
        F: FnMut(&MigrationFile, MigrationState),
    {
        let (_, pending) = self.prepare().await?;
        let mut report = ApplyReport::default();

        if pending.is_empty() {
            tracing::info!("✓ No pending migrations");
            return Ok(report);
        }

        tracing::info!("Found {} pending migration(s):", pending.len());
        for migration in &pending {
            tracing::info!("  • {}", migration.label());
        }

        let vars = self.template_context(self.repository.context()?);

        for migration in &pending {
            on_progress(migration, MigrationState::Pending);
            let statements = self
                .apply_migration(migration, &vars, &mut on_progress)
                .await
                .inspect_err(|_| tracing::error!("✗ Failed to apply {}", migration.label()))?;

            tracing::info!("✓ Applied {}", migration.label());
            report.statements_executed += statements;
            report.applied.push(AppliedMigration {
                version: migration.version.clone(),
                name: migration.name.clone(),
                statements,
            });
        }

        tracing::info!("✓ All migrations applied successfully");
        Ok(report)
    }

    /// Execute one migration's statements in order, then record it
    async fn apply_migration<F>(
        &self,
        migration: &MigrationFile,
        vars: &TemplateVars,
        on_progress: &mut F,
    ) -> Result<usize>
    where
        F: FnMut(&MigrationFile, MigrationState),
    {
        let label = migration.label();
        let sql = self.renderer.render(&label, migration.content()?, vars)?;
        let statements = split_statements(&sql);
        tracing::debug!("{} contains {} statement(s)", label, statements.len());

        for (statement_index, statement) in statements.iter().enumerate() {
            on_progress(migration, MigrationState::Executing { statement_index });

            if let Err(err) = self.repository.connection().command(statement).await {
                on_progress(migration, MigrationState::Failed { statement_index });
                return Err(match err {
                    MigrationError::ClickHouse { message } => MigrationError::StatementExecution {
                        migration: label,
                        statement_index,
                        message,
                    },
                    other => other,
                });
            }
        }

        if let Err(err) = self.repository.record_applied(migration, &self.provenance).await {
            on_progress(
                migration,
                MigrationState::Failed {
                    statement_index: statements.len(),
                },
            );
            return Err(err);
        }

        on_progress(migration, MigrationState::Applied);
        Ok(statements.len())
    }

    /// Report applied and pending migrations without executing any
    pub async fn status(&mut self) -> Result<StatusReport> {
        let (applied, pending) = self.prepare().await?;

        Ok(StatusReport {
            applied: applied.into_values().collect(),
            pending,
        })
    }

    /// Release the connection
    pub async fn close(self) -> Result<()> {
        self.repository.into_connection().close().await
    }

    /// Close the connection and pass `result` through
    ///
    /// A close failure only surfaces when the pass itself succeeded.
    pub async fn finish<T>(self, result: Result<T>) -> Result<T> {
        let closed = self.close().await;
        match (result, closed) {
            (Err(err), Err(close_err)) => {
                tracing::warn!("Failed to close connection: {}", close_err);
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    /// Run the requested pass, then release the connection exactly once
    ///
    /// `on_progress` only sees state transitions during a `Run` pass.
    pub async fn execute<F>(
        mut self,
        command: MigrationCommand,
        on_progress: F,
    ) -> Result<MigrationOutcome>
    where
        F: FnMut(&MigrationFile, MigrationState),
    {
        let result = match command {
            MigrationCommand::Run => self
                .run_with_progress(on_progress)
                .await
                .map(MigrationOutcome::Applied),
            MigrationCommand::Status => self.status().await.map(MigrationOutcome::Status),
        };
        self.finish(result).await
    }
}

/// Connect, run one pass, and always release the connection
pub async fn run_migrations(
    config: &MigratorConfig,
    command: MigrationCommand,
) -> Result<MigrationOutcome> {
    run_migrations_with_progress(config, command, |_, _| {}).await
}

/// Like [`run_migrations`], reporting per-file state transitions
pub async fn run_migrations_with_progress<F>(
    config: &MigratorConfig,
    command: MigrationCommand,
    on_progress: F,
) -> Result<MigrationOutcome>
where
    F: FnMut(&MigrationFile, MigrationState),
{
    MigrationRunner::connect(config)
        .await?
        .execute(command, on_progress)
        .await
}
