// src/store/memory.rs - In-process DedupStore for tests and offline review
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::errors::{DedupError, DedupResult};
use crate::merge::plan::MergePlan;
use crate::models::{DismissedPair, Entity, MergeRecord, PairKey, Relationship};
use crate::store::{DedupStore, DismissedSet, MergeSnapshot};

/// JSON shape accepted by `MemoryStore::from_fixture_file`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreFixture {
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub dismissed: Vec<DismissedPair>,
    #[serde(default)]
    pub merges: Vec<MergeRecord>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    entities: BTreeMap<String, Entity>,
    relationships: BTreeMap<String, Relationship>,
    dismissed: HashMap<PairKey, DismissedPair>,
    merges: Vec<MergeRecord>,
}

impl MemoryState {
    fn snapshot(&self, primary_id: &str, secondary_id: &str) -> MergeSnapshot {
        let touching = |id: &str| -> Vec<Relationship> {
            self.relationships
                .values()
                .filter(|r| r.touches(id))
                .cloned()
                .collect()
        };
        MergeSnapshot {
            primary: self.entities.get(primary_id).cloned(),
            secondary: self.entities.get(secondary_id).cloned(),
            primary_relationships: touching(primary_id),
            secondary_relationships: touching(secondary_id),
            pair_dismissed: self
                .dismissed
                .contains_key(&PairKey::new(primary_id, secondary_id)),
        }
    }

    fn apply(&mut self, plan: &MergePlan) -> DedupResult<()> {
        let record = &plan.record;
        self.entities
            .insert(record.primary_id.clone(), plan.merged_primary.clone());
        for rel in &plan.transfers {
            self.relationships.insert(rel.id.clone(), rel.clone());
        }
        for id in &plan.dropped {
            self.relationships.remove(id);
        }
        let secondary = self
            .entities
            .get_mut(&record.secondary_id)
            .ok_or_else(|| DedupError::not_found(record.secondary_id.clone()))?;
        secondary.deleted = true;
        self.merges.push(record.clone());
        Ok(())
    }
}

/// All state lives behind one async mutex, so merges are serialized and a
/// merge's re-validation sees every earlier commit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_next_write: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: StoreFixture) -> Self {
        let state = MemoryState {
            entities: fixture
                .entities
                .into_iter()
                .map(|e| (e.id.clone(), e))
                .collect(),
            relationships: fixture
                .relationships
                .into_iter()
                .map(|r| (r.id.clone(), r))
                .collect(),
            dismissed: fixture
                .dismissed
                .into_iter()
                .map(|d| (d.key.clone(), d))
                .collect(),
            merges: fixture.merges,
        };
        Self {
            state: Mutex::new(state),
            fail_next_write: AtomicBool::new(false),
        }
    }

    pub fn from_fixture_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture file {}", path.display()))?;
        let fixture: StoreFixture = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse fixture file {}", path.display()))?;
        info!(
            "Loaded fixture {}: {} entities, {} relationships, {} dismissed pairs",
            path.display(),
            fixture.entities.len(),
            fixture.relationships.len(),
            fixture.dismissed.len()
        );
        Ok(Self::from_fixture(fixture))
    }

    /// Current state in fixture form, merge history included.
    pub async fn to_fixture(&self) -> StoreFixture {
        let state = self.state.lock().await;
        let mut dismissed: Vec<DismissedPair> = state.dismissed.values().cloned().collect();
        dismissed.sort_by(|a, b| a.key.cmp(&b.key));
        StoreFixture {
            entities: state.entities.values().cloned().collect(),
            relationships: state.relationships.values().cloned().collect(),
            dismissed,
            merges: state.merges.clone(),
        }
    }

    /// Writes the current state back to a fixture file, so dismissals and
    /// merges made in fixture mode outlive the process.
    pub async fn save_fixture_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let fixture = self.to_fixture().await;
        let raw = serde_json::to_string_pretty(&fixture).context("Failed to serialize fixture")?;
        std::fs::write(path, raw)
            .with_context(|| format!("Failed to write fixture file {}", path.display()))?;
        debug!(
            "Saved fixture {}: {} dismissed pairs, {} merge records",
            path.display(),
            fixture.dismissed.len(),
            fixture.merges.len()
        );
        Ok(())
    }

    pub async fn entity(&self, id: &str) -> Option<Entity> {
        self.state.lock().await.entities.get(id).cloned()
    }

    /// All relationships ordered by id.
    pub async fn relationships(&self) -> Vec<Relationship> {
        self.state
            .lock()
            .await
            .relationships
            .values()
            .cloned()
            .collect()
    }

    /// Makes the next merge fail after its plan was applied to the working
    /// copy but before it is committed.
    pub fn fail_next_merge_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }
}

impl DedupStore for MemoryStore {
    async fn load_entities(&self) -> DedupResult<Vec<Entity>> {
        Ok(self.state.lock().await.entities.values().cloned().collect())
    }

    async fn load_dismissed(&self) -> DedupResult<DismissedSet> {
        Ok(self.state.lock().await.dismissed.keys().cloned().collect())
    }

    async fn is_dismissed(&self, key: &PairKey) -> DedupResult<bool> {
        Ok(self.state.lock().await.dismissed.contains_key(key))
    }

    async fn upsert_dismissal(
        &self,
        key: &PairKey,
        note: Option<&str>,
        dismissed_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> DedupResult<DismissedPair> {
        let mut state = self.state.lock().await;
        let entry = state
            .dismissed
            .entry(key.clone())
            .and_modify(|existing| existing.note = note.map(str::to_string))
            .or_insert_with(|| DismissedPair {
                key: key.clone(),
                note: note.map(str::to_string),
                dismissed_by: dismissed_by.map(str::to_string),
                dismissed_at: now,
            });
        Ok(entry.clone())
    }

    async fn merge_snapshot(
        &self,
        primary_id: &str,
        secondary_id: &str,
    ) -> DedupResult<MergeSnapshot> {
        Ok(self.state.lock().await.snapshot(primary_id, secondary_id))
    }

    async fn commit_merge<F>(
        &self,
        primary_id: &str,
        secondary_id: &str,
        planner: F,
    ) -> DedupResult<MergeRecord>
    where
        F: FnOnce(&MergeSnapshot) -> DedupResult<MergePlan> + Send,
    {
        let mut state = self.state.lock().await;
        let snapshot = state.snapshot(primary_id, secondary_id);
        let plan = planner(&snapshot)?;

        let mut working = state.clone();
        working.apply(&plan)?;
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            debug!("Injected write failure, discarding merge {} <- {}", primary_id, secondary_id);
            return Err(DedupError::transient("injected write failure"));
        }
        *state = working;
        Ok(plan.record)
    }

    async fn record_merge(&self, record: &MergeRecord) -> DedupResult<()> {
        self.state.lock().await.merges.push(record.clone());
        Ok(())
    }

    async fn merge_history(&self, entity_id: &str) -> DedupResult<Vec<MergeRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .merges
            .iter()
            .filter(|m| m.primary_id == entity_id || m.secondary_id == entity_id)
            .cloned()
            .collect())
    }
}
