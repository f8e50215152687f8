// src/bin/backfill_external_refs.rs - Fill missing external_ref values from Wikidata
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::time::Duration;

use dedupe_lib::enrichment::{ExternalRefSource, WikidataClient};
use dedupe_lib::store::PgDedupStore;
use dedupe_lib::utils::db_connect::connect;
use dedupe_lib::utils::env::load_env;
use dedupe_lib::utils::progress_bars::logging::DedupLogger;
use dedupe_lib::utils::progress_bars::progress_config::ProgressConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct BackfillArgs {
    /// Maximum number of figures to look up in this run
    #[arg(long, default_value_t = 200)]
    limit: usize,

    /// Minimum gap between Wikidata requests, in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Label language used for the search
    #[arg(long, default_value = "en")]
    language: String,

    /// Look up identifiers without writing them
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Default)]
struct BackfillStats {
    looked_up: usize,
    matched: usize,
    written: usize,
    skipped_concurrent: usize,
    failed: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let args = BackfillArgs::parse();
    let logger = DedupLogger::enrichment();

    let pool = connect().await.context("Failed to connect to database")?;
    let store = PgDedupStore::new(pool);
    store.ensure_schema().await?;

    let pending = store.entities_missing_external_ref(args.limit).await?;
    logger.log_phase(
        "Looking up external references",
        Some(&format!("{} figures without one", pending.len())),
    );
    if pending.is_empty() {
        return Ok(());
    }

    let mut client = WikidataClient::new(Duration::from_millis(args.interval_ms), &args.language)?;
    let bar = ProgressConfig::from_env().create_scan_bar(pending.len() as u64);
    let mut stats = BackfillStats::default();

    for (i, entity) in pending.iter().enumerate() {
        let name = entity.name_for_matching();
        stats.looked_up += 1;
        match client.lookup(name).await {
            Ok(Some(qid)) => {
                stats.matched += 1;
                if args.dry_run {
                    logger.log_debug(&format!("{} '{}' -> {} (dry run)", entity.id, name, qid));
                } else if store.set_external_ref(&entity.id, &qid).await? {
                    stats.written += 1;
                    logger.log_debug(&format!("{} '{}' -> {}", entity.id, name, qid));
                } else {
                    stats.skipped_concurrent += 1;
                    logger.log_warning(&format!(
                        "{} already has an external_ref, left unchanged",
                        entity.id
                    ));
                }
            }
            Ok(None) => {}
            Err(e) => {
                stats.failed += 1;
                logger.log_error(&format!(
                    "{} lookup on '{}' failed: {:#}",
                    client.source_name(),
                    name,
                    e
                ));
            }
        }

        if let Some(pb) = &bar {
            pb.inc(1);
        }
        if (i + 1) % 50 == 0 {
            logger.log_progress_update(i + 1, pending.len(), Some(&format!("{} matched", stats.matched)));
        }
    }

    if let Some(pb) = bar {
        pb.finish_and_clear();
    }
    info!(
        "Backfill done in {:.2?}: {} looked up, {} matched, {} written, {} already set, {} failed{}",
        logger.get_elapsed(),
        stats.looked_up,
        stats.matched,
        stats.written,
        stats.skipped_concurrent,
        stats.failed,
        if args.dry_run { " (dry run)" } else { "" }
    );
    Ok(())
}
