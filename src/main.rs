// src/main.rs - figure_dedupe command line: detect, dismiss, merge, history
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dedupe_lib::api::{
    handle_detect, handle_dismiss, handle_merge, DetectRequest, DismissRequest, ErrorBody,
    MergeRequest,
};
use dedupe_lib::config::{scan_timeout_from_env, DetectionConfig, ScanControl};
use dedupe_lib::errors::DedupError;
use dedupe_lib::matching::{CandidateGenerator, DismissalRegistry};
use dedupe_lib::merge::MergeOrchestrator;
use dedupe_lib::models::Confidence;
use dedupe_lib::store::{DedupStore, MemoryStore, PgDedupStore};
use dedupe_lib::utils::db_connect::{connect, get_pool_status};
use dedupe_lib::utils::env::load_env;
use dedupe_lib::utils::get_memory_usage;
use dedupe_lib::utils::progress_bars::progress_callback::{
    create_bar_callback, create_simple_callback, ProgressCallback,
};
use dedupe_lib::utils::progress_bars::progress_config::ProgressConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Run against a JSON fixture file instead of Postgres. Dismissals and
    /// merges are written back to the same file.
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan all live figures for likely duplicate pairs
    Detect {
        /// Minimum combined score, 0.0 to 1.0
        #[arg(long)]
        threshold: Option<f64>,

        /// Minimum confidence tier: low, medium or high
        #[arg(long)]
        min_confidence: Option<Confidence>,

        /// Maximum number of pairs returned (1 to 500)
        #[arg(long)]
        limit: Option<usize>,

        /// Stop the scan after this many seconds and return partial results
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Mark a pair as reviewed and not a duplicate
    Dismiss {
        entity_a: String,
        entity_b: String,

        #[arg(long)]
        note: Option<String>,

        /// Reviewer recorded with the dismissal
        #[arg(long = "by")]
        dismissed_by: Option<String>,
    },
    /// Fold the secondary figure into the primary
    Merge {
        primary: String,
        secondary: String,

        #[arg(long)]
        actor: String,

        /// Compute the merge record without changing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Merge records that involve a figure
    History { entity_id: String },
    /// Create the dedup schema in Postgres
    InitSchema,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    load_env();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            let body = match e.downcast_ref::<DedupError>() {
                Some(dedup_err) => ErrorBody::from(dedup_err),
                None => ErrorBody {
                    status: 500,
                    kind: "internal".to_string(),
                    message: format!("{:#}", e),
                },
            };
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.message.clone())
            );
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<String> {
    let progress_config = Arc::new(ProgressConfig::from_env());
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );

    if let Some(path) = &cli.fixture {
        let store = MemoryStore::from_fixture_file(path)?;
        info!("Using fixture store from {}", path.display());
        if matches!(cli.command, Command::InitSchema) {
            bail!("init-schema needs a Postgres connection, not a fixture");
        }
        let writes = matches!(cli.command, Command::Dismiss { .. } | Command::Merge { .. });
        let store = Arc::new(store);
        let output = execute(store.clone(), cli.command, &progress_config).await?;
        if writes {
            store.save_fixture_file(path).await?;
            info!("Saved changes back to {}", path.display());
        }
        return Ok(output);
    }

    let pool = connect().await.context("Failed to connect to database")?;
    info!("Successfully connected to the database");
    let store = PgDedupStore::new(pool.clone());

    let output = if matches!(cli.command, Command::InitSchema) {
        store.ensure_schema().await?;
        serde_json::to_string_pretty(&serde_json::json!({ "schema": "ready" }))?
    } else {
        execute(Arc::new(store), cli.command, &progress_config).await?
    };

    if progress_config.should_show_db_connection_stats() {
        let (size, idle, in_use) = get_pool_status(&pool);
        info!(
            "Database pool: {} total, {} idle, {} in use",
            size, idle, in_use
        );
    }
    Ok(output)
}

async fn execute<S: DedupStore + 'static>(
    store: Arc<S>,
    command: Command,
    progress_config: &ProgressConfig,
) -> Result<String> {
    match command {
        Command::Detect {
            threshold,
            min_confidence,
            limit,
            timeout_secs,
        } => {
            let timeout = timeout_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .or_else(scan_timeout_from_env);
            let control = match timeout {
                Some(t) => {
                    info!("Scan deadline set to {:.0?}", t);
                    ScanControl::with_timeout(t)
                }
                None => ScanControl::new(),
            };

            let cancel_handle = control.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, finishing current blocks and returning partial results");
                    cancel_handle.cancel();
                }
            });

            let bar = progress_config.create_scan_bar(0);
            let progress: ProgressCallback = match &bar {
                Some(pb) if progress_config.should_show_detailed() => {
                    let bar_cb = create_bar_callback(pb.clone());
                    let log_cb = create_simple_callback("detect");
                    Arc::new(move |phase: String, details: Option<String>| {
                        log_cb(phase.clone(), details.clone());
                        bar_cb(phase, details);
                    })
                }
                Some(pb) => create_bar_callback(pb.clone()),
                None => create_simple_callback("detect"),
            };
            let generator = CandidateGenerator::new(store).with_progress(progress);
            let request = DetectRequest {
                threshold,
                min_confidence,
                limit,
            };

            let started = Instant::now();
            let response =
                handle_detect(&generator, &request, DetectionConfig::from_env(), &control).await?;
            if let Some(pb) = bar {
                pb.finish_with_message(format!(
                    "{} pairs in {:.2?}",
                    response.pairs.len(),
                    started.elapsed()
                ));
            }
            if progress_config.should_show_memory() {
                info!("Memory after detection: {} MB", get_memory_usage().await);
            }
            to_json(&response)
        }
        Command::Dismiss {
            entity_a,
            entity_b,
            note,
            dismissed_by,
        } => {
            let registry = DismissalRegistry::new(store);
            let request = DismissRequest {
                entity_a_id: entity_a,
                entity_b_id: entity_b,
                note,
                dismissed_by,
            };
            to_json(&handle_dismiss(&registry, &request).await?)
        }
        Command::Merge {
            primary,
            secondary,
            actor,
            dry_run,
        } => {
            let orchestrator = MergeOrchestrator::new(store);
            let request = MergeRequest {
                primary_id: primary,
                secondary_id: secondary,
                dry_run,
                actor,
            };
            to_json(&handle_merge(&orchestrator, &request).await?)
        }
        Command::History { entity_id } => {
            let orchestrator = MergeOrchestrator::new(store);
            to_json(&orchestrator.history(&entity_id).await?)
        }
        Command::InitSchema => bail!("init-schema is handled before store dispatch"),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize output")
}
