// src/utils/progress_bars/logging.rs - Tagged logging helpers for detection, dismissal and merge
use log::{debug, error, info, warn};
use std::time::Instant;

use crate::models::{DetectionReport, DismissedPair, HaltReason, MergeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOperation {
    Detection,
    Dismissal,
    Merge,
    Enrichment,
}

impl DedupOperation {
    fn tag(&self) -> (&'static str, &'static str) {
        match self {
            DedupOperation::Detection => ("DETECT", "🔎"),
            DedupOperation::Dismissal => ("DISMISS", "🙅"),
            DedupOperation::Merge => ("MERGE", "🔀"),
            DedupOperation::Enrichment => ("ENRICH", "🌐"),
        }
    }
}

#[derive(Clone)]
pub struct DedupLogger {
    name: &'static str,
    emoji: &'static str,
    start_time: Instant,
}

impl DedupLogger {
    pub fn new(operation: DedupOperation) -> Self {
        let (name, emoji) = operation.tag();
        Self {
            name,
            emoji,
            start_time: Instant::now(),
        }
    }

    pub fn detection() -> Self {
        Self::new(DedupOperation::Detection)
    }

    pub fn dismissal() -> Self {
        Self::new(DedupOperation::Dismissal)
    }

    pub fn merge() -> Self {
        Self::new(DedupOperation::Merge)
    }

    pub fn enrichment() -> Self {
        Self::new(DedupOperation::Enrichment)
    }

    pub fn log_detection_start(&self, run_id: &str, threshold: f64, min_confidence: &str, limit: usize) {
        info!(
            "[{}] {} 🚀 Starting duplicate detection (run ID: {})",
            self.name, self.emoji, run_id
        );
        info!(
            "[{}] {} ⚙️  Configuration: threshold {:.2}, min confidence {}, limit {}",
            self.name, self.emoji, threshold, min_confidence, limit
        );
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        let elapsed = self.start_time.elapsed();
        match details {
            Some(details) => info!(
                "[{}] {} 🔄 Phase: {} - {} [+{:.1}s]",
                self.name, self.emoji, phase, details, elapsed.as_secs_f32()
            ),
            None => info!(
                "[{}] {} 🔄 Phase: {} [+{:.1}s]",
                self.name, self.emoji, phase, elapsed.as_secs_f32()
            ),
        }
    }

    pub fn log_data_loaded(&self, count: usize, data_type: &str) {
        info!(
            "[{}] {} 📊 Found {} {} records",
            self.name, self.emoji, count, data_type
        );
    }

    pub fn log_dismissed_pairs(&self, count: usize) {
        if count > 0 {
            info!(
                "[{}] {} ⏭️  {} dismissed pairs will be skipped",
                self.name, self.emoji, count
            );
        } else {
            info!(
                "[{}] {} ✨ No dismissed pairs found - clean slate",
                self.name, self.emoji
            );
        }
    }

    pub fn log_scan_plan(&self, entities: usize, workers: usize, block_size: usize) {
        let pairs = entities.saturating_mul(entities.saturating_sub(1)) / 2;
        info!(
            "[{}] {} 📈 Scanning {} entities ({} unordered pairs) on {} workers, {} rows per block",
            self.name, self.emoji, entities, pairs, workers, block_size
        );
    }

    pub fn log_detection_report(&self, report: &DetectionReport) {
        let duration = self.start_time.elapsed();
        let considered = report.pairs_considered.max(1) as f64;
        info!(
            "[{}] {} 🎯 Pair filtering: {} considered → {} prefiltered ({:.1}%), {} cross-ref excluded, {} dismissed, {} scored",
            self.name,
            self.emoji,
            report.pairs_considered,
            report.pairs_prefiltered,
            report.pairs_prefiltered as f64 / considered * 100.0,
            report.pairs_cross_ref_excluded,
            report.pairs_dismissed,
            report.pairs_scored
        );
        match report.halt_reason {
            None => info!(
                "[{}] {} 🎉 COMPLETED: {} candidate pairs from {} entities in {:.2?}",
                self.name,
                self.emoji,
                report.pairs.len(),
                report.entities_scanned,
                duration
            ),
            Some(reason) => warn!(
                "[{}] {} ⏰ Scan halted ({}) after {:.2?}; returning {} pairs scored so far",
                self.name,
                self.emoji,
                match reason {
                    HaltReason::Cancelled => "cancelled",
                    HaltReason::DeadlineExceeded => "deadline exceeded",
                },
                duration,
                report.pairs.len()
            ),
        }
    }

    pub fn log_dismissal(&self, pair: &DismissedPair) {
        info!(
            "[{}] {} ✅ Pair {} dismissed{}",
            self.name,
            self.emoji,
            pair.key,
            pair.note
                .as_deref()
                .map(|n| format!(" (note: {})", n))
                .unwrap_or_default()
        );
    }

    pub fn log_merge_start(&self, primary_id: &str, secondary_id: &str, actor: &str, dry_run: bool) {
        info!(
            "[{}] {} 🚀 {} {} <- {} requested by {}",
            self.name,
            self.emoji,
            if dry_run { "Previewing merge" } else { "Merging" },
            primary_id,
            secondary_id,
            actor
        );
    }

    pub fn log_merge_record(&self, record: &MergeRecord) {
        info!(
            "[{}] {} ✅ {} {} <- {}: {} relationships transferred, {} dropped, {} properties filled [{:.2?}]",
            self.name,
            self.emoji,
            if record.dry_run { "Dry run" } else { "Merged" },
            record.primary_id,
            record.secondary_id,
            record.transferred_relationship_count,
            record.dropped_relationship_count,
            record.filled_properties.len(),
            self.start_time.elapsed()
        );
        for conflict in &record.property_conflicts {
            warn!(
                "[{}] {} ⚠️  Conflict on {}: kept '{}', secondary had '{}'",
                self.name, self.emoji, conflict.property, conflict.primary_value, conflict.secondary_value
            );
        }
    }

    pub fn log_warning(&self, message: &str) {
        warn!("[{}] {} ⚠️  {}", self.name, self.emoji, message);
    }

    pub fn log_error(&self, message: &str) {
        error!("[{}] {} ❌ {}", self.name, self.emoji, message);
    }

    pub fn log_debug(&self, message: &str) {
        debug!("[{}] {} {}", self.name, self.emoji, message);
    }

    pub fn log_progress_update(&self, current: usize, total: usize, additional_info: Option<&str>) {
        // Every 10% plus the final block.
        let step = (total / 10).max(1);
        if current == 0 || (current % step != 0 && current != total) {
            return;
        }
        let percent = current as f64 / total.max(1) as f64 * 100.0;
        match additional_info {
            Some(extra) => info!(
                "[{}] {} 📊 Progress: {}/{} ({:.1}%) - {}",
                self.name, self.emoji, current, total, percent, extra
            ),
            None => info!(
                "[{}] {} 📊 Progress: {}/{} ({:.1}%)",
                self.name, self.emoji, current, total, percent
            ),
        }
    }

    pub fn get_elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
