//! Ingest CLI - Main entry point
//!
//! Task-runner surface for the seedpipe store: `ingest` runs one
//! folder-to-database ingestion and reports, `init-db` provisions the
//! store from the active schema rules.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seedpipe_common::config::{DuplicatePolicy, SeedpipeConfig, CONFIG_ENV_VAR};
use seedpipe_common::db::init_database;
use seedpipe_ingest::adapters::Adapter;
use seedpipe_ingest::orchestrator::{IngestOrchestrator, RunOptions};

/// Command-line arguments for seedpipe-ingest
#[derive(Parser, Debug)]
#[command(name = "seedpipe-ingest")]
#[command(about = "Folder-to-database JSON ingestion for seedpipe")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Database file path (overrides configuration)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest every *.json file under a folder
    Ingest {
        /// Folder to ingest
        input_folder: PathBuf,

        /// Records per write transaction
        #[arg(long)]
        batch_size: Option<usize>,

        /// Duplicate handling within the run (last-write-wins or reject)
        #[arg(long)]
        on_duplicate: Option<DuplicatePolicy>,

        /// Input document shape
        #[arg(long, value_enum)]
        adapter: Option<Adapter>,

        /// Caller-chosen run id instead of a generated one
        #[arg(long)]
        run_name: Option<String>,

        /// Parse, validate and report without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Re-process files whose content was already ingested
        #[arg(long)]
        no_resume: bool,

        /// Write the JSON run summary to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Parse worker threads
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Create the database and sync the records table to the schema rules
    InitDb,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seedpipe_ingest=info,seedpipe_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config =
        SeedpipeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = cli.database {
        config.database.path = database;
    }
    let rules = config.schema_rules();

    match cli.command {
        Commands::InitDb => {
            let pool = init_database(&config.database, &rules)
                .await
                .context("Failed to provision database")?;
            pool.close().await;
            info!("Database ready at {}", config.database.path.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Ingest {
            input_folder,
            batch_size,
            on_duplicate,
            adapter,
            run_name,
            dry_run,
            no_resume,
            report,
            workers,
        } => {
            let pool = init_database(&config.database, &rules)
                .await
                .context("Failed to open database")?;

            let mut options = RunOptions::from_config(&config.ingest);
            if let Some(batch_size) = batch_size {
                anyhow::ensure!(batch_size > 0, "--batch-size must be at least 1");
                options.batch_size = batch_size;
            }
            if let Some(on_duplicate) = on_duplicate {
                options.on_duplicate = on_duplicate;
            }
            if let Some(adapter) = adapter {
                options.adapter = adapter;
            }
            if let Some(workers) = workers {
                anyhow::ensure!(workers > 0, "--workers must be at least 1");
                options.parse_workers = workers;
            }
            options.run_name = run_name;
            options.dry_run = dry_run;
            options.resume = !no_resume;

            // Ctrl-C ends the run between batches; committed work stands.
            let cancel = CancellationToken::new();
            let ctrl_c_cancel = cancel.clone();
            tokio::spawn(async move {
                if signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Ctrl-C received, stopping after the current batch");
                    ctrl_c_cancel.cancel();
                }
            });

            let orchestrator = IngestOrchestrator::new(pool, rules, options);
            let summary = orchestrator.run(&input_folder, &cancel).await?;

            print!("{}", summary.render_text());

            if let Some(report_path) = report {
                let json = serde_json::to_string_pretty(&summary)
                    .context("Failed to serialize run summary")?;
                std::fs::write(&report_path, json).with_context(|| {
                    format!("Failed to write report to {}", report_path.display())
                })?;
                info!("Report written to {}", report_path.display());
            }

            Ok(ExitCode::from(summary.exit_code()))
        }
    }
}
