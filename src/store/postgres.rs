// src/store/postgres.rs - DedupStore backed by Postgres through a bb8 pool
use chrono::{DateTime, Utc};
use log::{debug, info};
use postgres_types::ToSql;
use tokio_postgres::{GenericClient, IsolationLevel, Row};

use crate::errors::{DedupError, DedupResult};
use crate::merge::plan::MergePlan;
use crate::models::{
    DismissedPair, Entity, FigureProperties, MergeRecord, PairKey, PropertyConflict, Relationship,
};
use crate::store::{DedupStore, DismissedSet, MergeSnapshot};
use crate::utils::db_connect::PgPool;

const ENTITY_COLUMNS: &str = "id, display_name, external_ref, birth_year, death_year, \
     birth_place, occupation, era, description, image_url, deleted";

// Locks every edge touching either entity, so a concurrent merge sharing an
// edge waits instead of rewriting it from a stale read.
const LOCK_RELATIONSHIPS_SQL: &str = "SELECT id FROM public.relationship
     WHERE source_id = ANY($1) OR target_id = ANY($1)
     ORDER BY id FOR UPDATE";

// Only the secondary's endpoint is rewritten; the other endpoint is left as
// stored.
const REPOINT_RELATIONSHIP_SQL: &str = "UPDATE public.relationship
     SET source_id = CASE WHEN source_id = $2 THEN $3 ELSE source_id END,
         target_id = CASE WHEN target_id = $2 THEN $3 ELSE target_id END
     WHERE id = $1";

const SCHEMA_SQL: &str = "
    CREATE SCHEMA IF NOT EXISTS dedup;

    ALTER TABLE public.entity ADD COLUMN IF NOT EXISTS deleted BOOLEAN NOT NULL DEFAULT FALSE;

    CREATE TABLE IF NOT EXISTS dedup.dismissed_pair (
        entity_id_1  TEXT NOT NULL,
        entity_id_2  TEXT NOT NULL,
        note         TEXT,
        dismissed_by TEXT,
        dismissed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (entity_id_1, entity_id_2),
        CHECK (entity_id_1 < entity_id_2)
    );

    CREATE TABLE IF NOT EXISTS dedup.merge_record (
        id                   BIGSERIAL PRIMARY KEY,
        primary_id           TEXT NOT NULL,
        secondary_id         TEXT NOT NULL,
        actor                TEXT NOT NULL,
        merged_at            TIMESTAMPTZ NOT NULL,
        transferred_count    INTEGER NOT NULL,
        dropped_count        INTEGER NOT NULL,
        filled_properties    TEXT[] NOT NULL DEFAULT '{}',
        property_conflicts   JSONB NOT NULL DEFAULT '[]'::jsonb,
        dry_run              BOOLEAN NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_merge_record_primary ON dedup.merge_record (primary_id);
    CREATE INDEX IF NOT EXISTS idx_merge_record_secondary ON dedup.merge_record (secondary_id);
";

/// Converts a count to the driver's INTEGER type. This and `count_from_pg`
/// are the only places integer widths change at the storage boundary.
pub fn count_to_pg(count: usize) -> DedupResult<i32> {
    i32::try_from(count)
        .map_err(|_| DedupError::integrity(format!("count {} does not fit an INTEGER column", count)))
}

pub fn count_from_pg(value: i32) -> DedupResult<usize> {
    usize::try_from(value)
        .map_err(|_| DedupError::integrity(format!("stored count {} is negative", value)))
}

#[derive(Clone)]
pub struct PgDedupStore {
    pool: PgPool,
}

impl PgDedupStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the dedup schema and adds the soft-delete column to
    /// `public.entity` when missing. Safe to run repeatedly.
    pub async fn ensure_schema(&self) -> DedupResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA_SQL).await?;
        info!("Dedup schema is in place (dedup.dismissed_pair, dedup.merge_record)");
        Ok(())
    }

    /// Entities without an external reference, for enrichment backfills.
    pub async fn entities_missing_external_ref(&self, limit: usize) -> DedupResult<Vec<Entity>> {
        let conn = self.pool.get().await?;
        let sql = format!(
            "SELECT {} FROM public.entity
             WHERE external_ref IS NULL AND deleted = FALSE AND display_name IS NOT NULL
             ORDER BY id LIMIT $1",
            ENTITY_COLUMNS
        );
        let limit = i64::from(count_to_pg(limit)?);
        let rows = conn.query(sql.as_str(), &[&limit]).await?;
        Ok(rows.iter().map(entity_from_row).collect())
    }

    /// Sets `external_ref` only when it is still empty. Returns false when
    /// another writer got there first.
    pub async fn set_external_ref(&self, entity_id: &str, external_ref: &str) -> DedupResult<bool> {
        let conn = self.pool.get().await?;
        let updated = conn
            .execute(
                "UPDATE public.entity SET external_ref = $2
                 WHERE id = $1 AND external_ref IS NULL",
                &[&entity_id, &external_ref],
            )
            .await?;
        Ok(updated == 1)
    }
}

fn entity_from_row(row: &Row) -> Entity {
    Entity {
        id: row.get("id"),
        display_name: row.get("display_name"),
        external_ref: row.get("external_ref"),
        properties: FigureProperties {
            birth_year: row.get("birth_year"),
            death_year: row.get("death_year"),
            birth_place: row.get("birth_place"),
            occupation: row.get("occupation"),
            era: row.get("era"),
            description: row.get("description"),
            image_url: row.get("image_url"),
        },
        deleted: row.get("deleted"),
    }
}

fn relationship_from_row(row: &Row) -> Relationship {
    Relationship {
        id: row.get("id"),
        source_id: row.get("source_id"),
        target_id: row.get("target_id"),
        rel_type: row.get("rel_type"),
        properties: row
            .get::<_, Option<serde_json::Value>>("properties")
            .unwrap_or_else(|| serde_json::json!({})),
    }
}

fn merge_record_from_row(row: &Row) -> DedupResult<MergeRecord> {
    let conflicts: serde_json::Value = row.get("property_conflicts");
    let property_conflicts: Vec<PropertyConflict> = serde_json::from_value(conflicts)
        .map_err(|e| DedupError::integrity(format!("malformed property_conflicts: {}", e)))?;
    Ok(MergeRecord {
        primary_id: row.get("primary_id"),
        secondary_id: row.get("secondary_id"),
        actor: row.get("actor"),
        timestamp: row.get("merged_at"),
        transferred_relationship_count: count_from_pg(row.get("transferred_count"))?,
        dropped_relationship_count: count_from_pg(row.get("dropped_count"))?,
        filled_properties: row.get("filled_properties"),
        property_conflicts,
        dry_run: row.get("dry_run"),
    })
}

async fn fetch_entity(conn: &impl GenericClient, id: &str) -> DedupResult<Option<Entity>> {
    let sql = format!("SELECT {} FROM public.entity WHERE id = $1", ENTITY_COLUMNS);
    let row = conn.query_opt(sql.as_str(), &[&id]).await?;
    Ok(row.as_ref().map(entity_from_row))
}

async fn fetch_relationships(conn: &impl GenericClient, id: &str) -> DedupResult<Vec<Relationship>> {
    let rows = conn
        .query(
            "SELECT id, source_id, target_id, rel_type, properties
             FROM public.relationship
             WHERE source_id = $1 OR target_id = $1
             ORDER BY id",
            &[&id],
        )
        .await?;
    Ok(rows.iter().map(relationship_from_row).collect())
}

async fn fetch_pair_dismissed(conn: &impl GenericClient, key: &PairKey) -> DedupResult<bool> {
    let row = conn
        .query_opt(
            "SELECT 1 FROM dedup.dismissed_pair WHERE entity_id_1 = $1 AND entity_id_2 = $2",
            &[&key.entity_id_1, &key.entity_id_2],
        )
        .await?;
    Ok(row.is_some())
}

async fn read_snapshot(
    conn: &impl GenericClient,
    primary_id: &str,
    secondary_id: &str,
) -> DedupResult<MergeSnapshot> {
    Ok(MergeSnapshot {
        primary: fetch_entity(conn, primary_id).await?,
        secondary: fetch_entity(conn, secondary_id).await?,
        primary_relationships: fetch_relationships(conn, primary_id).await?,
        secondary_relationships: fetch_relationships(conn, secondary_id).await?,
        pair_dismissed: fetch_pair_dismissed(conn, &PairKey::new(primary_id, secondary_id)).await?,
    })
}

async fn insert_merge_record(conn: &impl GenericClient, record: &MergeRecord) -> DedupResult<()> {
    let conflicts = serde_json::to_value(&record.property_conflicts)
        .map_err(|e| DedupError::integrity(format!("cannot serialize conflicts: {}", e)))?;
    let transferred = count_to_pg(record.transferred_relationship_count)?;
    let dropped = count_to_pg(record.dropped_relationship_count)?;
    let params: Vec<&(dyn ToSql + Sync)> = vec![
        &record.primary_id,
        &record.secondary_id,
        &record.actor,
        &record.timestamp,
        &transferred,
        &dropped,
        &record.filled_properties,
        &conflicts,
        &record.dry_run,
    ];
    conn.execute(
        "INSERT INTO dedup.merge_record
            (primary_id, secondary_id, actor, merged_at, transferred_count, dropped_count,
             filled_properties, property_conflicts, dry_run)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        &params,
    )
    .await?;
    Ok(())
}

async fn apply_plan(conn: &impl GenericClient, plan: &MergePlan) -> DedupResult<()> {
    let p = &plan.merged_primary;
    let props = &p.properties;
    conn.execute(
        "UPDATE public.entity
         SET external_ref = $2, birth_year = $3, death_year = $4, birth_place = $5,
             occupation = $6, era = $7, description = $8, image_url = $9
         WHERE id = $1",
        &[
            &p.id,
            &p.external_ref,
            &props.birth_year,
            &props.death_year,
            &props.birth_place,
            &props.occupation,
            &props.era,
            &props.description,
            &props.image_url,
        ],
    )
    .await?;

    let (primary_id, secondary_id) = (&plan.record.primary_id, &plan.record.secondary_id);
    for rel in &plan.transfers {
        conn.execute(REPOINT_RELATIONSHIP_SQL, &[&rel.id, secondary_id, primary_id])
            .await?;
    }

    if !plan.dropped.is_empty() {
        conn.execute(
            "DELETE FROM public.relationship WHERE id = ANY($1)",
            &[&plan.dropped],
        )
        .await?;
    }

    let soft_deleted = conn
        .execute(
            "UPDATE public.entity SET deleted = TRUE WHERE id = $1 AND deleted = FALSE",
            &[secondary_id],
        )
        .await?;
    if soft_deleted != 1 {
        return Err(DedupError::conflict(
            secondary_id.clone(),
            "entity was deleted while the merge was in progress",
        ));
    }
    Ok(())
}

impl DedupStore for PgDedupStore {
    async fn load_entities(&self) -> DedupResult<Vec<Entity>> {
        let conn = self.pool.get().await?;
        let sql = format!("SELECT {} FROM public.entity ORDER BY id", ENTITY_COLUMNS);
        let rows = conn.query(sql.as_str(), &[]).await?;
        debug!("Loaded {} entity rows", rows.len());
        Ok(rows.iter().map(entity_from_row).collect())
    }

    async fn load_dismissed(&self) -> DedupResult<DismissedSet> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query("SELECT entity_id_1, entity_id_2 FROM dedup.dismissed_pair", &[])
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let a: String = row.get("entity_id_1");
                let b: String = row.get("entity_id_2");
                PairKey::new(&a, &b)
            })
            .collect())
    }

    async fn is_dismissed(&self, key: &PairKey) -> DedupResult<bool> {
        let conn = self.pool.get().await?;
        fetch_pair_dismissed(&*conn, key).await
    }

    async fn upsert_dismissal(
        &self,
        key: &PairKey,
        note: Option<&str>,
        dismissed_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> DedupResult<DismissedPair> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_one(
                "INSERT INTO dedup.dismissed_pair
                    (entity_id_1, entity_id_2, note, dismissed_by, dismissed_at)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (entity_id_1, entity_id_2)
                 DO UPDATE SET note = EXCLUDED.note
                 RETURNING note, dismissed_by, dismissed_at",
                &[&key.entity_id_1, &key.entity_id_2, &note, &dismissed_by, &now],
            )
            .await?;
        Ok(DismissedPair {
            key: key.clone(),
            note: row.get("note"),
            dismissed_by: row.get("dismissed_by"),
            dismissed_at: row.get("dismissed_at"),
        })
    }

    async fn merge_snapshot(
        &self,
        primary_id: &str,
        secondary_id: &str,
    ) -> DedupResult<MergeSnapshot> {
        // One repeatable-read transaction, so all reads see the same state.
        let mut conn = self.pool.get().await?;
        let tx = conn
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()
            .await?;
        let snapshot = read_snapshot(&tx, primary_id, secondary_id).await?;
        tx.commit().await?;
        Ok(snapshot)
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
        let mut conn = self.pool.get().await?;
        let tx = conn.transaction().await?;

        // Row locks are taken in id order so two merges sharing an entity
        // cannot deadlock.
        let mut ids = vec![primary_id, secondary_id];
        ids.sort_unstable();
        tx.query(
            "SELECT id FROM public.entity WHERE id = ANY($1) ORDER BY id FOR UPDATE",
            &[&ids],
        )
        .await?;
        tx.query(LOCK_RELATIONSHIPS_SQL, &[&ids]).await?;

        let snapshot = read_snapshot(&tx, primary_id, secondary_id).await?;
        let plan = planner(&snapshot)?;
        apply_plan(&tx, &plan).await?;
        insert_merge_record(&tx, &plan.record).await?;
        tx.commit().await?;

        debug!(
            "Committed merge {} <- {} ({} transferred, {} dropped)",
            primary_id,
            secondary_id,
            plan.transfers.len(),
            plan.dropped.len()
        );
        Ok(plan.record)
    }

    async fn record_merge(&self, record: &MergeRecord) -> DedupResult<()> {
        let conn = self.pool.get().await?;
        insert_merge_record(&*conn, record).await
    }

    async fn merge_history(&self, entity_id: &str) -> DedupResult<Vec<MergeRecord>> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query(
                "SELECT primary_id, secondary_id, actor, merged_at, transferred_count,
                        dropped_count, filled_properties, property_conflicts, dry_run
                 FROM dedup.merge_record
                 WHERE primary_id = $1 OR secondary_id = $1
                 ORDER BY id",
                &[&entity_id],
            )
            .await?;
        rows.iter().map(merge_record_from_row).collect()
    }
}
