// ABOUTME: CLI entry point for clickhouse-migrator
// ABOUTME: Parses commands, loads the environment config, and routes to handlers

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use clickhouse_migrator::commands;
use clickhouse_migrator::config::{
    find_config_file, load_migrator_config, parse_var_assignments, resolve_migrations_dir,
    ConfigOverrides, MigratorConfig, CONFIG_FILE_NAME,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clickhouse-migrator")]
#[command(about = "Versioned SQL migrations for ClickHouse", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct ConfigArgs {
    /// Path to clickhouse-migrator.toml (searched upwards from the current directory by default)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Environment to use from the config file
    #[arg(long)]
    env: Option<String>,
}

#[derive(Args, Clone, Default)]
struct ConnectionArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// ClickHouse URL (http(s)://user:password@host:port/database), overrides the config file
    #[arg(long, env = "CLICKHOUSE_MIGRATOR_URL", hide_env_values = true)]
    url: Option<String>,
    /// Template variable in the form key=value (repeatable)
    #[arg(long = "var")]
    vars: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending migrations
    Run(ConnectionArgs),
    /// Show applied and pending migrations
    Status(ConnectionArgs),
    /// Create a new timestamped migration file
    Create {
        #[command(flatten)]
        config: ConfigArgs,
        /// Migration name (prompted for when omitted)
        #[arg(long)]
        name: Option<String>,
        /// Migrations directory, instead of the one in the config file
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Print the checksum of a migration file
    Checksum {
        /// Path to the migration file
        path: PathBuf,
    },
}

fn locate_config(args: &ConfigArgs) -> anyhow::Result<PathBuf> {
    if let Some(path) = &args.config {
        return Ok(path.clone());
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    find_config_file(&cwd).with_context(|| {
        format!(
            "No {} found in {} or any parent directory. Pass --config to specify one.",
            CONFIG_FILE_NAME,
            cwd.display()
        )
    })
}

async fn load_config(args: &ConnectionArgs) -> anyhow::Result<MigratorConfig> {
    let config_path = locate_config(&args.config)?;
    let overrides = ConfigOverrides {
        url: args.url.clone(),
        vars: parse_var_assignments(&args.vars)?,
    };

    let (env_name, config) =
        load_migrator_config(&config_path, args.config.env.as_deref(), &overrides).await?;

    let target = config.target();
    tracing::info!("Config: {}", config_path.display());
    tracing::info!("Environment: {}", env_name);
    tracing::info!(
        "ClickHouse: {}:{}{} (database: {})",
        target.host,
        target.port,
        if target.is_secure() { " (TLS)" } else { "" },
        target.database
    );
    tracing::info!("Migrations: {}", config.migrations_dir().display());

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config = load_config(&args).await?;
            commands::run(&config).await.map(|_| ())
        }
        Commands::Status(args) => {
            let config = load_config(&args).await?;
            commands::status(&config).await.map(|_| ())
        }
        Commands::Create { config, name, dir } => {
            let migrations_dir = match dir {
                Some(dir) => dir,
                None => {
                    let config_path = locate_config(&config)?;
                    resolve_migrations_dir(&config_path, config.env.as_deref()).await?
                }
            };
            commands::create(&migrations_dir, name).map(|_| ())
        }
        Commands::Checksum { path } => commands::checksum(&path).await.map(|_| ()),
    }
}
