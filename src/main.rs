// ABOUTME: CLI entry point for catalog-sync
// ABOUTME: Parses commands, opens connections and routes to the command handlers

use anyhow::Context;
use catalog_sync::catalog::CatalogCache;
use catalog_sync::change_detection::{self, ChangeDetectionTracker};
use catalog_sync::commands::{self, ImportOptions, SyncContext, UpdateOptions};
use catalog_sync::config::Config;
use catalog_sync::destination::PostgresDestination;
use catalog_sync::executor::RunSummary;
use catalog_sync::metadata::MetadataIndex;
use catalog_sync::source::MssqlWarehouse;
use catalog_sync::transfer::Ogr2OgrEngine;
use catalog_sync::utils::format_elapsed;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "catalog-sync")]
#[command(about = "Keep a PostGIS database in step with the SGID warehouse", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Path to the configuration file (defaults to ./catalog-sync.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Source warehouse password (falls back to SOURCE_PASSWORD env)
    #[arg(long = "source-password", env = "SOURCE_PASSWORD", global = true, hide_env_values = true)]
    source_password: Option<String>,
    /// Destination database password (falls back to DESTINATION_PASSWORD env)
    #[arg(
        long = "destination-password",
        env = "DESTINATION_PASSWORD",
        global = true,
        hide_env_values = true
    )]
    destination_password: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy source tables into the destination
    Import {
        /// Only import tables the destination does not have
        #[arg(long)]
        missing: bool,
        /// Leave tables that already exist in the destination alone
        #[arg(long)]
        skip_if_exists: bool,
        /// Restrict to these source tables (repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,
        /// Log what would happen without changing the destination
        #[arg(long)]
        dry_run: bool,
    },
    /// Drop destination tables that no longer exist in the source
    Trim {
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-import specific tables
    Update {
        /// Source table to update, qualified or not (repeatable)
        #[arg(long = "table", conflicts_with = "from_change_detection")]
        tables: Vec<String>,
        /// Update the tables the change log reports since the last run
        #[arg(long)]
        from_change_detection: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Align integer column types with the source
    UpdateSchema {
        /// Source table to align (repeatable); every published table when omitted
        #[arg(long = "table")]
        tables: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Create the configured destination indexes
    CreateIndexes {
        #[arg(long)]
        dry_run: bool,
    },
    /// Trim, import missing tables and update from change detection
    Scheduled {
        #[arg(long)]
        dry_run: bool,
    },
}

impl Commands {
    /// Whether the command can copy tables and so needs the transfer program.
    fn transfers(&self) -> bool {
        matches!(
            self,
            Commands::Import { .. } | Commands::Update { .. } | Commands::Scheduled { .. }
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let start = Instant::now();

    let config = Config::load(cli.config.as_deref())?
        .with_secrets(cli.source_password, cli.destination_password);

    let summary = run(cli.command, &config).await?;
    summary.log();

    tracing::info!("Completed in {}", format_elapsed(start.elapsed()));

    if !summary.is_success() {
        anyhow::bail!(
            "{} of the run failed: {}",
            catalog_sync::utils::pluralize(summary.failures.len(), "step", "steps"),
            summary.failures.join(" || ")
        );
    }

    Ok(())
}

async fn run(command: Commands, config: &Config) -> anyhow::Result<RunSummary> {
    let source = MssqlWarehouse::connect(&config.source, config)
        .await
        .context("Failed to connect to the source warehouse")?;
    let destination = PostgresDestination::connect(&config.destination, &config.schemas)
        .await
        .context("Failed to connect to the destination database")?;
    let transfer = if command.transfers() {
        Ogr2OgrEngine::locate(config)?
    } else {
        Ogr2OgrEngine::new(config)
    };

    let ctx = SyncContext::new(config, &source, &destination, &transfer);
    let mut cache = CatalogCache::new(&config.exclude_schemas);

    if let Commands::CreateIndexes { dry_run } = command {
        return commands::create_indexes(&ctx, dry_run).await;
    }

    let metadata = MetadataIndex::build(&source, &ctx.names).await?;

    match command {
        Commands::Import {
            missing,
            skip_if_exists,
            tables,
            dry_run,
        } => {
            let options = ImportOptions {
                missing,
                skip_if_exists,
                dry_run,
                tables,
            };
            commands::import(&ctx, &mut cache, &metadata, &options).await
        }
        Commands::Trim { dry_run } => commands::trim(&ctx, &mut cache, &metadata, dry_run).await,
        Commands::Update {
            tables,
            from_change_detection,
            dry_run,
        } => {
            let tracker = if from_change_detection {
                let store = change_detection::open_store(&config.watermark).await?;
                Some(ChangeDetectionTracker::new(store, ctx.names.clone()))
            } else {
                None
            };
            let options = UpdateOptions {
                tables,
                dry_run,
                from_change_detection,
            };
            commands::update(&ctx, &mut cache, &metadata, tracker.as_ref(), &options).await
        }
        Commands::UpdateSchema { tables, dry_run } => {
            commands::update_schema(&ctx, &mut cache, &metadata, &tables, dry_run).await
        }
        Commands::Scheduled { dry_run } => {
            let store = change_detection::open_store(&config.watermark).await?;
            let tracker = ChangeDetectionTracker::new(store, ctx.names.clone());
            commands::scheduled(&ctx, &mut cache, &metadata, &tracker, dry_run).await
        }
        Commands::CreateIndexes { dry_run } => commands::create_indexes(&ctx, dry_run).await,
    }
}
