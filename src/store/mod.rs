// src/store/mod.rs - Storage seam for the dedup engine
//
// The engine only needs a handful of reads and two kinds of writes (dismissals
// and merges), so the storage engine is reached through this one trait. The
// Postgres implementation is used in production; the in-memory one backs
// tests and offline review of fixture files.

pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::errors::DedupResult;
use crate::merge::plan::MergePlan;
use crate::models::{DismissedPair, Entity, MergeRecord, PairKey, Relationship};

pub use memory::{MemoryStore, StoreFixture};
pub use postgres::PgDedupStore;

/// Read-only view of the dismissal registry, loaded once per detection run.
pub type DismissedSet = HashSet<PairKey>;

/// Everything the merge planner needs to know about the two entities.
#[derive(Debug, Clone, Default)]
pub struct MergeSnapshot {
    pub primary: Option<Entity>,
    pub secondary: Option<Entity>,
    /// Relationships with the primary as either endpoint.
    pub primary_relationships: Vec<Relationship>,
    /// Relationships with the secondary as either endpoint. An edge between the
    /// two entities appears in both lists.
    pub secondary_relationships: Vec<Relationship>,
    /// The pair was reviewed and dismissed as not a duplicate.
    pub pair_dismissed: bool,
}

#[allow(async_fn_in_trait)]
pub trait DedupStore: Send + Sync {
    /// All entities, deleted ones included, ordered by id.
    async fn load_entities(&self) -> DedupResult<Vec<Entity>>;

    async fn load_dismissed(&self) -> DedupResult<DismissedSet>;

    async fn is_dismissed(&self, key: &PairKey) -> DedupResult<bool>;

    /// Inserts the dismissal, or updates only the note when the pair is
    /// already dismissed. Returns the stored record.
    async fn upsert_dismissal(
        &self,
        key: &PairKey,
        note: Option<&str>,
        dismissed_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> DedupResult<DismissedPair>;

    /// Point-in-time read of both entities and their relationships. Used for
    /// dry runs; nothing is locked.
    async fn merge_snapshot(&self, primary_id: &str, secondary_id: &str)
        -> DedupResult<MergeSnapshot>;

    /// Runs `planner` against a fresh snapshot taken while both entities are
    /// locked, applies the resulting plan and writes its audit record, all in
    /// one transaction. Any error leaves the store untouched.
    async fn commit_merge<F>(
        &self,
        primary_id: &str,
        secondary_id: &str,
        planner: F,
    ) -> DedupResult<MergeRecord>
    where
        F: FnOnce(&MergeSnapshot) -> DedupResult<MergePlan> + Send;

    /// Appends an audit record on its own (dry runs).
    async fn record_merge(&self, record: &MergeRecord) -> DedupResult<()>;

    /// Audit records where `entity_id` was primary or secondary, oldest first.
    async fn merge_history(&self, entity_id: &str) -> DedupResult<Vec<MergeRecord>>;
}
