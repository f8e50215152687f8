// src/merge/orchestrator.rs - Executes or previews a merge of two entities
use chrono::Utc;
use log::{debug, warn};
use std::sync::Arc;

use crate::errors::{DedupError, DedupResult};
use crate::merge::plan::plan_merge;
use crate::models::MergeRecord;
use crate::store::DedupStore;
use crate::utils::progress_bars::logging::DedupLogger;

pub struct MergeOrchestrator<S: DedupStore> {
    store: Arc<S>,
}

impl<S: DedupStore> MergeOrchestrator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Merges `secondary_id` into `primary_id`.
    ///
    /// A real merge re-validates both entities inside the store transaction,
    /// so of two racing merges on the same secondary only one can succeed; the
    /// other sees the secondary deleted and fails with a conflict. A dry run
    /// plans against an unlocked snapshot and persists only its audit record.
    /// Nothing is retried.
    pub async fn merge(
        &self,
        primary_id: &str,
        secondary_id: &str,
        actor: &str,
        dry_run: bool,
    ) -> DedupResult<MergeRecord> {
        let logger = DedupLogger::merge();
        logger.log_merge_start(primary_id, secondary_id, actor, dry_run);

        if actor.trim().is_empty() {
            return Err(DedupError::validation("actor must be non-empty"));
        }

        let now = Utc::now();
        let result = if dry_run {
            self.preview(primary_id, secondary_id, actor, now).await
        } else {
            self.store
                .commit_merge(primary_id, secondary_id, |snapshot| {
                    plan_merge(snapshot, primary_id, secondary_id, actor, false, now)
                })
                .await
        };

        match &result {
            Ok(record) => logger.log_merge_record(record),
            Err(e @ DedupError::TransientStore { .. }) | Err(e @ DedupError::Integrity { .. }) => {
                logger.log_error(&format!(
                    "merge {} <- {} failed and was rolled back: {}",
                    primary_id, secondary_id, e
                ));
            }
            Err(e) => warn!("Merge {} <- {} rejected: {}", primary_id, secondary_id, e),
        }
        result
    }

    async fn preview(
        &self,
        primary_id: &str,
        secondary_id: &str,
        actor: &str,
        now: chrono::DateTime<Utc>,
    ) -> DedupResult<MergeRecord> {
        let snapshot = self.store.merge_snapshot(primary_id, secondary_id).await?;
        let plan = plan_merge(&snapshot, primary_id, secondary_id, actor, true, now)?;
        debug!(
            "Dry run {} <- {}: {} transfers, {} dropped",
            primary_id,
            secondary_id,
            plan.transfers.len(),
            plan.dropped.len()
        );
        self.store.record_merge(&plan.record).await?;
        Ok(plan.record)
    }

    pub async fn history(&self, entity_id: &str) -> DedupResult<Vec<MergeRecord>> {
        self.store.merge_history(entity_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::DismissalRegistry;
    use crate::models::{Entity, Relationship};
    use crate::store::{MemoryStore, StoreFixture};

    fn fixture() -> StoreFixture {
        let mut shakespeare = Entity::new("fig-a", "William Shakespeare");
        shakespeare.properties.birth_year = Some(1564);
        let mut shakspere = Entity::new("fig-b", "William Shakspere");
        shakspere.properties.birth_year = Some(1564);
        shakspere.properties.birth_place = Some("Stratford-upon-Avon".into());
        let marlowe = Entity::new("fig-c", "Christopher Marlowe");

        StoreFixture {
            entities: vec![shakespeare, shakspere, marlowe],
            relationships: vec![
                Relationship::new("r1", "film-1", "PORTRAYS", "fig-a"),
                Relationship::new("r2", "film-1", "PORTRAYS", "fig-b"),
                Relationship::new("r3", "film-2", "PORTRAYS", "fig-b"),
                Relationship::new("r4", "fig-b", "INTERACTED_WITH", "fig-c"),
                Relationship::new("r5", "fig-a", "SAME_AS", "fig-b"),
            ],
            ..StoreFixture::default()
        }
    }

    fn orchestrator() -> (Arc<MemoryStore>, MergeOrchestrator<MemoryStore>) {
        let store = Arc::new(MemoryStore::from_fixture(fixture()));
        (store.clone(), MergeOrchestrator::new(store))
    }

    #[tokio::test]
    async fn test_dry_run_matches_real_merge() {
        let (store, orch) = orchestrator();
        let preview = orch.merge("fig-a", "fig-b", "reviewer", true).await.unwrap();
        assert!(preview.dry_run);

        // Dry run leaves the data alone.
        let b = store.entity("fig-b").await.unwrap();
        assert!(!b.deleted);

        let real = orch.merge("fig-a", "fig-b", "reviewer", false).await.unwrap();
        assert!(!real.dry_run);
        assert!(preview.same_effect_as(&real));
        assert_eq!(real.transferred_relationship_count, 2);
        assert_eq!(real.dropped_relationship_count, 2);
        assert_eq!(real.filled_properties, vec!["birth_place".to_string()]);

        let history = orch.history("fig-b").await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].dry_run && !history[1].dry_run);
    }

    #[tokio::test]
    async fn test_real_merge_soft_deletes_and_leaves_no_parallel_edges() {
        let (store, orch) = orchestrator();
        orch.merge("fig-a", "fig-b", "reviewer", false).await.unwrap();

        let b = store.entity("fig-b").await.unwrap();
        assert!(b.deleted);

        let rels = store.relationships().await;
        assert!(rels.iter().all(|r| !r.touches("fig-b")));
        assert!(rels.iter().all(|r| r.source_id != r.target_id));
        let portrayals_from_film_1 = rels
            .iter()
            .filter(|r| r.source_id == "film-1" && r.target_id == "fig-a" && r.rel_type == "PORTRAYS")
            .count();
        assert_eq!(portrayals_from_film_1, 1);
        assert!(rels.iter().any(|r| r.id == "r4" && r.source_id == "fig-a"));
    }

    #[tokio::test]
    async fn test_second_merge_of_same_secondary_conflicts() {
        let (_store, orch) = orchestrator();
        orch.merge("fig-a", "fig-b", "reviewer", false).await.unwrap();
        let err = orch.merge("fig-c", "fig-b", "reviewer", false).await.unwrap_err();
        assert!(matches!(err, DedupError::Conflict { ref id, .. } if id == "fig-b"));
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_concurrent_merges_on_same_secondary() {
        let (store, orch) = orchestrator();
        let (first, second) = tokio::join!(
            orch.merge("fig-a", "fig-b", "alice", false),
            orch.merge("fig-c", "fig-b", "bob", false),
        );
        let outcomes = [first.is_ok(), second.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        let err = first.err().or(second.err()).unwrap();
        assert_eq!(err.status_code(), 409);

        let real_merges = store
            .merge_history("fig-b")
            .await
            .unwrap()
            .into_iter()
            .filter(|r| !r.dry_run)
            .count();
        assert_eq!(real_merges, 1);
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back_everything() {
        let (store, orch) = orchestrator();
        let before_rels = store.relationships().await;
        let before_a = store.entity("fig-a").await.unwrap();

        store.fail_next_merge_write();
        let err = orch.merge("fig-a", "fig-b", "reviewer", false).await.unwrap_err();
        assert_eq!(err.status_code(), 503);

        assert_eq!(store.relationships().await, before_rels);
        assert_eq!(store.entity("fig-a").await.unwrap(), before_a);
        assert!(!store.entity("fig-b").await.unwrap().deleted);
        assert!(store.merge_history("fig-b").await.unwrap().is_empty());

        // The store is usable again afterwards.
        assert!(orch.merge("fig-a", "fig-b", "reviewer", false).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_entity_and_blank_actor() {
        let (_store, orch) = orchestrator();
        let err = orch.merge("fig-a", "fig-zz", "reviewer", false).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        let err = orch.merge("fig-a", "fig-b", "  ", true).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_dismissed_pair_is_not_merged() {
        let (store, orch) = orchestrator();
        DismissalRegistry::new(store.clone())
            .dismiss("fig-b", "fig-a", Some("different playwrights"), None)
            .await
            .unwrap();

        let preview = orch.merge("fig-a", "fig-b", "reviewer", true).await.unwrap_err();
        assert_eq!(preview.status_code(), 409);
        let err = orch.merge("fig-a", "fig-b", "reviewer", false).await.unwrap_err();
        assert_eq!(err.status_code(), 409);

        assert!(!store.entity("fig-b").await.unwrap().deleted);
        assert!(orch.history("fig-b").await.unwrap().is_empty());
        // Other pairs are unaffected.
        orch.merge("fig-a", "fig-c", "reviewer", false).await.unwrap();
    }
}
