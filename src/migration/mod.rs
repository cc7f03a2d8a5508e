// ABOUTME: Migration engine module
// ABOUTME: Statement splitting, templating, file discovery, tracking repository, and runner

pub mod checksum;
pub mod files;
pub mod repository;
pub mod runner;
pub mod sql;
pub mod template;

pub use checksum::{calculate_checksum, checksum_file};
pub use files::{list_migration_files, load_migration_file, parse_migration_filename, MigrationFile};
pub use repository::{
    select_cluster, ClusterContext, MigrationRecord, MigrationRepository, PendingMigrationsResult,
    Provenance,
};
pub use runner::{
    run_migrations, run_migrations_with_progress, AppliedMigration, ApplyReport,
    MigrationCommand, MigrationOutcome, MigrationRunner, MigrationState, StatusReport,
};
pub use sql::split_statements;
pub use template::{render_template, TemplateRenderer, TemplateVars};
