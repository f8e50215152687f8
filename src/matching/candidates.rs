// src/matching/candidates.rs - Pairwise duplicate candidate generation
//
// Every unordered pair of live entities is visited once. Cheap filters run
// before scoring: name length ratio, conflicting external refs, then the
// dismissal registry. The pair matrix is split into row blocks that worker
// threads pull from a shared cursor; each worker keeps its own results and
// the final ranking is a single sort over the merged lists.
use futures::future::join_all;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{
    DetectionConfig, ScanControl, BIRTH_YEAR_TOLERANCE, LENGTH_RATIO_FLOOR, ROW_BLOCK_SIZE,
};
use crate::errors::{DedupError, DedupResult};
use crate::matching::confidence::classify;
use crate::matching::similarity::{score_profiles, NameProfile};
use crate::models::{DetectionReport, DuplicatePair, Entity, EntitySummary, HaltReason, PairKey};
use crate::store::{DedupStore, DismissedSet};
use crate::{update_detailed_progress, update_progress};
use crate::utils::progress_bars::logging::DedupLogger;
use crate::utils::progress_bars::progress_callback::ProgressCallback;

struct Candidate {
    entity: Entity,
    profile: NameProfile,
}

#[derive(Default)]
struct WorkerTally {
    pairs: Vec<DuplicatePair>,
    considered: usize,
    prefiltered: usize,
    cross_ref_excluded: usize,
    dismissed: usize,
    scored: usize,
    halted: Option<HaltReason>,
}

struct ScanContext {
    candidates: Vec<Candidate>,
    dismissed: DismissedSet,
    config: DetectionConfig,
    control: ScanControl,
    block_size: usize,
    num_blocks: usize,
    cursor: AtomicUsize,
    blocks_done: AtomicUsize,
    progress: Option<ProgressCallback>,
}

pub struct CandidateGenerator<S: DedupStore> {
    store: Arc<S>,
    workers: usize,
    block_size: usize,
    progress: Option<ProgressCallback>,
}

impl<S: DedupStore> CandidateGenerator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            workers: num_cpus::get().max(1),
            block_size: ROW_BLOCK_SIZE,
            progress: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Loads the current entities and dismissals and runs one detection pass.
    pub async fn detect(
        &self,
        config: &DetectionConfig,
        control: &ScanControl,
    ) -> DedupResult<DetectionReport> {
        let logger = DedupLogger::detection();
        let run_id = Uuid::new_v4().to_string();
        logger.log_detection_start(
            &run_id,
            config.threshold,
            config.min_confidence.as_str(),
            config.limit,
        );

        logger.log_phase("Loading data", None);
        let entities = self.store.load_entities().await?;
        logger.log_data_loaded(entities.len(), "entity");
        let dismissed = self.store.load_dismissed().await?;
        logger.log_dismissed_pairs(dismissed.len());

        let report = self.generate(entities, dismissed, config, control).await?;
        logger.log_detection_report(&report);
        Ok(report)
    }

    /// Scores every unordered pair of live entities in `entities`.
    pub async fn generate(
        &self,
        entities: Vec<Entity>,
        dismissed: DismissedSet,
        config: &DetectionConfig,
        control: &ScanControl,
    ) -> DedupResult<DetectionReport> {
        let candidates = prepare_candidates(entities);
        let n = candidates.len();
        let num_blocks = (n + self.block_size - 1) / self.block_size;
        let workers = self.workers.min(num_blocks).max(1);
        DedupLogger::detection().log_scan_plan(n, workers, self.block_size);

        let ctx = Arc::new(ScanContext {
            candidates,
            dismissed,
            config: *config,
            control: control.clone(),
            block_size: self.block_size,
            num_blocks,
            cursor: AtomicUsize::new(0),
            blocks_done: AtomicUsize::new(0),
            progress: self.progress.clone(),
        });

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let ctx = Arc::clone(&ctx);
                tokio::task::spawn_blocking(move || scan_worker(&ctx))
            })
            .collect();

        let mut report = DetectionReport {
            entities_scanned: n,
            ..DetectionReport::default()
        };
        let mut halt_reason = None;
        for joined in join_all(handles).await {
            let tally = joined
                .map_err(|e| DedupError::integrity(format!("detection worker failed: {}", e)))?;
            report.pairs.extend(tally.pairs);
            report.pairs_considered += tally.considered;
            report.pairs_prefiltered += tally.prefiltered;
            report.pairs_cross_ref_excluded += tally.cross_ref_excluded;
            report.pairs_dismissed += tally.dismissed;
            report.pairs_scored += tally.scored;
            halt_reason = halt_reason.or(tally.halted);
        }

        update_progress!(self.progress, "Ranking pairs", format!("{} candidates", report.pairs.len()));
        report.completed = ctx.blocks_done.load(Ordering::SeqCst) >= num_blocks;
        report.halt_reason = if report.completed { None } else { halt_reason };

        report.pairs.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(CmpOrdering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        report.pairs.truncate(config.limit);
        Ok(report)
    }
}

/// Drops deleted entities and repeated ids, and orders the rest by id so a
/// scan over the same data always visits pairs the same way.
fn prepare_candidates(entities: Vec<Entity>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut live: Vec<Entity> = entities
        .into_iter()
        .filter(|e| !e.deleted)
        .filter(|e| seen.insert(e.id.clone()))
        .collect();
    live.sort_by(|a, b| a.id.cmp(&b.id));
    live.into_iter()
        .map(|entity| Candidate {
            profile: NameProfile::new(entity.name_for_matching()),
            entity,
        })
        .collect()
}

fn scan_worker(ctx: &ScanContext) -> WorkerTally {
    let mut tally = WorkerTally::default();
    let n = ctx.candidates.len();
    loop {
        if let Some(reason) = ctx.control.check() {
            tally.halted = Some(reason);
            break;
        }
        let block = ctx.cursor.fetch_add(1, Ordering::SeqCst);
        if block >= ctx.num_blocks {
            break;
        }

        let start = block * ctx.block_size;
        let end = (start + ctx.block_size).min(n);
        for i in start..end {
            for j in (i + 1)..n {
                evaluate_pair(&ctx.candidates[i], &ctx.candidates[j], ctx, &mut tally);
            }
        }

        let done = ctx.blocks_done.fetch_add(1, Ordering::SeqCst) + 1;
        update_detailed_progress!(ctx.progress, "Scoring pairs", done, ctx.num_blocks);
    }
    tally
}

fn evaluate_pair(a: &Candidate, b: &Candidate, ctx: &ScanContext, tally: &mut WorkerTally) {
    tally.considered += 1;

    let (len_a, len_b) = (a.profile.char_len, b.profile.char_len);
    let longest = len_a.max(len_b);
    if longest == 0 || (len_a.min(len_b) as f64 / longest as f64) < LENGTH_RATIO_FLOOR {
        tally.prefiltered += 1;
        return;
    }

    if let (Some(ref_a), Some(ref_b)) = (&a.entity.external_ref, &b.entity.external_ref) {
        if ref_a != ref_b {
            tally.cross_ref_excluded += 1;
            return;
        }
    }

    let key = PairKey::new(&a.entity.id, &b.entity.id);
    if ctx.dismissed.contains(&key) {
        tally.dismissed += 1;
        return;
    }

    let scores = score_profiles(&a.profile, &b.profile);
    tally.scored += 1;
    if !(scores.combined >= ctx.config.threshold) {
        return;
    }
    let confidence = classify(scores.combined);
    if confidence < ctx.config.min_confidence {
        return;
    }

    let (first, second) = if a.entity.id <= b.entity.id { (a, b) } else { (b, a) };
    tally.pairs.push(DuplicatePair {
        key,
        entity_a: EntitySummary::from(&first.entity),
        entity_b: EntitySummary::from(&second.entity),
        lexical_score: scores.lexical,
        phonetic_score: scores.phonetic,
        combined_score: scores.combined,
        confidence,
        attribute_corroboration: birth_years_agree(&first.entity, &second.entity),
    });
}

fn birth_years_agree(a: &Entity, b: &Entity) -> Option<bool> {
    match (a.properties.birth_year, b.properties.birth_year) {
        (Some(x), Some(y)) => Some(x.abs_diff(y) <= BIRTH_YEAR_TOLERANCE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::dismissal::DismissalRegistry;
    use crate::merge::MergeOrchestrator;
    use crate::models::Confidence;
    use crate::store::{MemoryStore, StoreFixture};

    fn figure(id: &str, name: &str) -> Entity {
        Entity::new(id, name)
    }

    fn store_with(entities: Vec<Entity>) -> Arc<MemoryStore> {
        Arc::new(MemoryStore::from_fixture(StoreFixture {
            entities,
            ..StoreFixture::default()
        }))
    }

    fn low_bar() -> DetectionConfig {
        DetectionConfig::new(Some(0.0), Some(Confidence::Low), Some(500))
    }

    fn people() -> Vec<Entity> {
        vec![
            figure("fig-3", "Leonardo da Vinci"),
            figure("fig-1", "Leonardo Da Vinci"),
            figure("fig-2", "Leonardo di ser Piero da Vinci"),
            figure("fig-4", "Michelangelo Buonarroti"),
            figure("fig-5", "Michelangelo"),
            figure("fig-6", "Rafael Sanzio"),
            figure("fig-7", "Raphael Sanzio"),
        ]
    }

    #[tokio::test]
    async fn test_never_returns_self_or_repeated_pairs() {
        let mut entities = people();
        entities.push(figure("fig-1", "Leonardo Da Vinci")); // repeated id
        let store = store_with(vec![]);
        let gen = CandidateGenerator::new(store).with_workers(3).with_block_size(2);

        let forward = gen
            .generate(entities.clone(), DismissedSet::new(), &low_bar(), &ScanControl::new())
            .await
            .unwrap();
        entities.reverse();
        let backward = gen
            .generate(entities, DismissedSet::new(), &low_bar(), &ScanControl::new())
            .await
            .unwrap();

        let mut keys = HashSet::new();
        for pair in &forward.pairs {
            assert_ne!(pair.entity_a.id, pair.entity_b.id);
            assert!(pair.entity_a.id < pair.entity_b.id);
            assert!(keys.insert(pair.key.clone()), "duplicate {}", pair.key);
        }
        assert_eq!(forward.pairs, backward.pairs);
        assert_eq!(forward.entities_scanned, 7);
        assert_eq!(forward.pairs_considered, 21);
        assert!(forward.completed);
    }

    #[tokio::test]
    async fn test_results_sorted_and_limited() {
        let gen = CandidateGenerator::new(store_with(vec![])).with_workers(2);
        let config = DetectionConfig::new(Some(0.0), Some(Confidence::Low), Some(3));
        let report = gen
            .generate(people(), DismissedSet::new(), &config, &ScanControl::new())
            .await
            .unwrap();
        assert_eq!(report.pairs.len(), 3);
        assert!(report
            .pairs
            .windows(2)
            .all(|w| w[0].combined_score >= w[1].combined_score));
        assert_eq!(report.pairs[0].key, PairKey::new("fig-1", "fig-3"));
        assert_eq!(report.pairs[0].confidence, Confidence::High);
    }

    #[tokio::test]
    async fn test_prefilter_and_cross_ref_exclusion() {
        let mut a = figure("a", "Alexander");
        let mut b = figure("b", "Alexander");
        a.external_ref = Some("Q8409".into());
        b.external_ref = Some("Q312".into());
        let entities = vec![a, b, figure("c", "Al"), figure("d", "")];
        let gen = CandidateGenerator::new(store_with(vec![]));
        let report = gen
            .generate(entities, DismissedSet::new(), &low_bar(), &ScanControl::new())
            .await
            .unwrap();

        // a-b differ by external ref; every pair with "Al" or the unnamed
        // entity fails the length ratio.
        assert!(report.pairs.is_empty());
        assert_eq!(report.pairs_cross_ref_excluded, 1);
        assert_eq!(report.pairs_prefiltered, 5);
        assert_eq!(report.pairs_scored, 0);
    }

    #[tokio::test]
    async fn test_deleted_entities_are_not_scanned() {
        let mut gone = figure("fig-1", "Leonardo Da Vinci");
        gone.deleted = true;
        let entities = vec![gone, figure("fig-3", "Leonardo da Vinci")];
        let gen = CandidateGenerator::new(store_with(vec![]));
        let report = gen
            .generate(entities, DismissedSet::new(), &low_bar(), &ScanControl::new())
            .await
            .unwrap();
        assert_eq!(report.entities_scanned, 1);
        assert!(report.pairs.is_empty());
    }

    #[tokio::test]
    async fn test_birth_year_corroboration() {
        let mut a = figure("a", "Galileo Galilei");
        let mut b = figure("b", "Galileo Galilei.");
        let c = figure("c", "Galileo Galileii");
        a.properties.birth_year = Some(1564);
        b.properties.birth_year = Some(1568);
        let gen = CandidateGenerator::new(store_with(vec![]));
        let report = gen
            .generate(vec![a, b, c], DismissedSet::new(), &low_bar(), &ScanControl::new())
            .await
            .unwrap();
        let ab = report.pairs.iter().find(|p| p.key == PairKey::new("a", "b")).unwrap();
        assert_eq!(ab.attribute_corroboration, Some(true));
        let ac = report.pairs.iter().find(|p| p.key == PairKey::new("a", "c")).unwrap();
        assert_eq!(ac.attribute_corroboration, None);
    }

    #[tokio::test]
    async fn test_extreme_birth_years_do_not_abort_scan() {
        let mut a = figure("a", "Galileo Galilei");
        let mut b = figure("b", "Galileo Galilei.");
        let mut c = figure("c", "Galileo Galileii");
        a.properties.birth_year = Some(i32::MAX);
        b.properties.birth_year = Some(-10);
        c.properties.birth_year = Some(i32::MIN);
        let gen = CandidateGenerator::new(store_with(vec![]));
        let report = gen
            .generate(vec![a, b, c], DismissedSet::new(), &low_bar(), &ScanControl::new())
            .await
            .unwrap();

        assert!(report.completed);
        assert_eq!(report.pairs.len(), 3);
        assert!(report
            .pairs
            .iter()
            .all(|p| p.attribute_corroboration == Some(false)));
    }

    #[tokio::test]
    async fn test_default_threshold_scenarios() {
        let store = store_with(vec![
            figure("nap-1", "Napoleon Bonaparte"),
            figure("nap-2", "Napoleon I"),
            figure("twain", "Mark Twain"),
            figure("clemens", "Samuel Clemens"),
        ]);
        let gen = CandidateGenerator::new(store);
        let report = gen
            .detect(&DetectionConfig::default(), &ScanControl::new())
            .await
            .unwrap();
        // Both score below 0.70 under the 0.7/0.3 weighting.
        assert!(report.pairs.is_empty());
        assert_eq!(report.entities_scanned, 4);
    }

    #[tokio::test]
    async fn test_dismissed_pair_never_resurfaces() {
        let store = store_with(people());
        let gen = CandidateGenerator::new(store.clone());
        let before = gen.detect(&low_bar(), &ScanControl::new()).await.unwrap();
        assert!(before.pairs.iter().any(|p| p.key == PairKey::new("fig-6", "fig-7")));

        DismissalRegistry::new(store.clone())
            .dismiss("fig-7", "fig-6", Some("different painters"), None)
            .await
            .unwrap();

        let after = gen.detect(&low_bar(), &ScanControl::new()).await.unwrap();
        assert!(after.pairs.iter().all(|p| p.key != PairKey::new("fig-6", "fig-7")));
        assert_eq!(after.pairs_dismissed, 1);
        assert_eq!(after.pairs.len() + 1, before.pairs.len());
    }

    #[tokio::test]
    async fn test_merged_secondary_is_never_offered_again() {
        let store = store_with(people());
        let gen = CandidateGenerator::new(store.clone());
        MergeOrchestrator::new(store.clone())
            .merge("fig-1", "fig-3", "reviewer", false)
            .await
            .unwrap();
        let report = gen.detect(&low_bar(), &ScanControl::new()).await.unwrap();
        assert!(report.pairs.iter().all(|p| !p.key.contains("fig-3")));
        assert_eq!(report.entities_scanned, 6);
    }

    #[tokio::test]
    async fn test_cancelled_scan_stops_before_scoring() {
        let control = ScanControl::new();
        control.cancel();
        let gen = CandidateGenerator::new(store_with(people()));
        let report = gen.detect(&low_bar(), &control).await.unwrap();
        assert!(!report.completed);
        assert_eq!(report.halt_reason, Some(HaltReason::Cancelled));
        assert_eq!(report.pairs_considered, 0);
    }

    #[tokio::test]
    async fn test_expired_deadline_halts_scan() {
        let control = ScanControl::with_deadline(std::time::Instant::now());
        let gen = CandidateGenerator::new(store_with(people()));
        let report = gen.detect(&low_bar(), &control).await.unwrap();
        assert!(!report.completed);
        assert_eq!(report.halt_reason, Some(HaltReason::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancel_mid_scan_keeps_partial_results() {
        let control = ScanControl::new();
        let cancel_handle = control.clone();
        let progress: ProgressCallback = Arc::new(move |_phase: String, _details: Option<String>| {
            cancel_handle.cancel();
        });
        let gen = CandidateGenerator::new(store_with(people()))
            .with_workers(1)
            .with_block_size(1)
            .with_progress(progress);
        let report = gen.detect(&low_bar(), &control).await.unwrap();

        // Only the first row (fig-1 against the six others) was scored.
        assert!(!report.completed);
        assert_eq!(report.halt_reason, Some(HaltReason::Cancelled));
        assert_eq!(report.pairs_considered, 6);
    }

    #[tokio::test]
    async fn test_empty_and_single_entity_sets() {
        let gen = CandidateGenerator::new(store_with(vec![]));
        let empty = gen.detect(&low_bar(), &ScanControl::new()).await.unwrap();
        assert!(empty.completed && empty.pairs.is_empty());

        let gen = CandidateGenerator::new(store_with(vec![figure("solo", "Homer")]));
        let single = gen.detect(&low_bar(), &ScanControl::new()).await.unwrap();
        assert!(single.completed);
        assert_eq!(single.pairs_considered, 0);
    }
}
