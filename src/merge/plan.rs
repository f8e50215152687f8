// src/merge/plan.rs - Pure merge planning: validation, property reconciliation,
// relationship transfer and the integrity check.
//
// The same planner runs for dry runs and for real merges, so a preview and
// the merge that follows it over unchanged data produce the same record.
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::errors::{DedupError, DedupResult};
use crate::models::{
    Entity, FigureProperties, MergeRecord, PairKey, PropertyConflict, PropertyValue,
    Relationship,
};
use crate::store::MergeSnapshot;

/// The full set of changes a merge makes.
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub record: MergeRecord,
    /// Primary entity with reconciled properties.
    pub merged_primary: Entity,
    /// Secondary relationships re-pointed to the primary, keeping their ids.
    pub transfers: Vec<Relationship>,
    /// Relationship ids deleted as self-loops or duplicates.
    pub dropped: Vec<String>,
}

pub fn plan_merge(
    snapshot: &MergeSnapshot,
    primary_id: &str,
    secondary_id: &str,
    actor: &str,
    dry_run: bool,
    now: DateTime<Utc>,
) -> DedupResult<MergePlan> {
    let (primary, secondary) = validate(snapshot, primary_id, secondary_id)?;

    let mut merged_primary = primary.clone();
    let mut filled = Vec::new();
    let mut conflicts = Vec::new();
    reconcile_properties(&mut merged_primary, secondary, &mut filled, &mut conflicts);

    let (transfers, dropped) = transfer_relationships(snapshot, primary_id, secondary_id);
    check_integrity(&transfers, secondary_id)?;

    let record = MergeRecord {
        primary_id: primary_id.to_string(),
        secondary_id: secondary_id.to_string(),
        actor: actor.to_string(),
        timestamp: now,
        transferred_relationship_count: transfers.len(),
        dropped_relationship_count: dropped.len(),
        filled_properties: filled,
        property_conflicts: conflicts,
        dry_run,
    };

    Ok(MergePlan {
        record,
        merged_primary,
        transfers,
        dropped,
    })
}

fn validate<'a>(
    snapshot: &'a MergeSnapshot,
    primary_id: &str,
    secondary_id: &str,
) -> DedupResult<(&'a Entity, &'a Entity)> {
    if primary_id.trim().is_empty() || secondary_id.trim().is_empty() {
        return Err(DedupError::validation(
            "primary_id and secondary_id must both be non-empty",
        ));
    }
    if primary_id == secondary_id {
        return Err(DedupError::validation(format!(
            "cannot merge entity {} into itself",
            primary_id
        )));
    }

    let primary = snapshot
        .primary
        .as_ref()
        .ok_or_else(|| DedupError::not_found(primary_id))?;
    let secondary = snapshot
        .secondary
        .as_ref()
        .ok_or_else(|| DedupError::not_found(secondary_id))?;

    if primary.deleted {
        return Err(DedupError::conflict(
            primary_id,
            "entity is deleted (already merged into another record)",
        ));
    }
    if secondary.deleted {
        return Err(DedupError::conflict(
            secondary_id,
            "entity is deleted (already merged into another record)",
        ));
    }
    if snapshot.pair_dismissed {
        return Err(DedupError::conflict(
            secondary_id,
            format!("pair {} was dismissed as not a duplicate", PairKey::new(primary_id, secondary_id)),
        ));
    }
    Ok((primary, secondary))
}

/// Copies secondary values into empty primary slots and reports differing
/// non-null values as conflicts. The primary value always wins.
fn reconcile_properties(
    merged: &mut Entity,
    secondary: &Entity,
    filled: &mut Vec<String>,
    conflicts: &mut Vec<PropertyConflict>,
) {
    reconcile_slot(
        "external_ref",
        &mut merged.external_ref,
        &secondary.external_ref,
        filled,
        conflicts,
    );

    // Destructured so a new property cannot be added without being reconciled.
    let FigureProperties {
        birth_year,
        death_year,
        birth_place,
        occupation,
        era,
        description,
        image_url,
    } = &mut merged.properties;
    let theirs = &secondary.properties;

    reconcile_slot("birth_year", birth_year, &theirs.birth_year, filled, conflicts);
    reconcile_slot("death_year", death_year, &theirs.death_year, filled, conflicts);
    reconcile_slot("birth_place", birth_place, &theirs.birth_place, filled, conflicts);
    reconcile_slot("occupation", occupation, &theirs.occupation, filled, conflicts);
    reconcile_slot("era", era, &theirs.era, filled, conflicts);
    reconcile_slot("description", description, &theirs.description, filled, conflicts);
    reconcile_slot("image_url", image_url, &theirs.image_url, filled, conflicts);
}

fn reconcile_slot<T>(
    name: &str,
    mine: &mut Option<T>,
    theirs: &Option<T>,
    filled: &mut Vec<String>,
    conflicts: &mut Vec<PropertyConflict>,
) where
    T: Clone + PartialEq + Into<PropertyValue>,
{
    match (mine.as_ref(), theirs) {
        (_, None) => {}
        (None, Some(value)) => {
            *mine = Some(value.clone());
            filled.push(name.to_string());
        }
        (Some(current), Some(value)) if current != value => {
            conflicts.push(PropertyConflict {
                property: name.to_string(),
                primary_value: current.clone().into(),
                secondary_value: value.clone().into(),
            });
        }
        (Some(_), Some(_)) => {}
    }
}

/// Re-points every secondary edge at the primary, except edges that would
/// become self-loops and edges whose (type, other endpoint) the primary
/// already has. Secondary edges are visited in id order.
fn transfer_relationships(
    snapshot: &MergeSnapshot,
    primary_id: &str,
    secondary_id: &str,
) -> (Vec<Relationship>, Vec<String>) {
    let mut existing: HashSet<(String, String)> = snapshot
        .primary_relationships
        .iter()
        .filter(|r| !r.touches(secondary_id))
        .map(|r| (r.rel_type.clone(), r.other_endpoint(primary_id).to_string()))
        .collect();

    let mut incoming: Vec<&Relationship> = snapshot.secondary_relationships.iter().collect();
    incoming.sort_by(|a, b| a.id.cmp(&b.id));
    incoming.dedup_by(|a, b| a.id == b.id);

    let mut transfers = Vec::new();
    let mut dropped = Vec::new();

    for rel in incoming {
        let other = rel.other_endpoint(secondary_id);
        if other == primary_id || other == secondary_id {
            dropped.push(rel.id.clone());
            continue;
        }
        if !existing.insert((rel.rel_type.clone(), other.to_string())) {
            dropped.push(rel.id.clone());
            continue;
        }

        let mut moved = rel.clone();
        if moved.source_id == secondary_id {
            moved.source_id = primary_id.to_string();
        }
        if moved.target_id == secondary_id {
            moved.target_id = primary_id.to_string();
        }
        transfers.push(moved);
    }

    (transfers, dropped)
}

fn check_integrity(transfers: &[Relationship], secondary_id: &str) -> DedupResult<()> {
    for rel in transfers {
        if rel.source_id == rel.target_id {
            return Err(DedupError::integrity(format!(
                "relationship {} would become a self-loop on {}",
                rel.id, rel.source_id
            )));
        }
        if rel.touches(secondary_id) {
            return Err(DedupError::integrity(format!(
                "relationship {} still points at merged entity {}",
                rel.id, secondary_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn figure(id: &str, birth_year: Option<i32>) -> Entity {
        let mut e = Entity::new(id, format!("Figure {}", id));
        e.properties.birth_year = birth_year;
        e
    }

    fn snapshot(primary: Entity, secondary: Entity, rels: Vec<Relationship>) -> MergeSnapshot {
        let primary_relationships = rels.iter().filter(|r| r.touches(&primary.id)).cloned().collect();
        let secondary_relationships =
            rels.iter().filter(|r| r.touches(&secondary.id)).cloned().collect();
        MergeSnapshot {
            primary: Some(primary),
            secondary: Some(secondary),
            primary_relationships,
            secondary_relationships,
            pair_dismissed: false,
        }
    }

    fn plan(snap: &MergeSnapshot) -> DedupResult<MergePlan> {
        plan_merge(snap, "p", "s", "reviewer", false, Utc::now())
    }

    #[test]
    fn test_fills_empty_birth_year_without_conflict() {
        let snap = snapshot(figure("p", None), figure("s", Some(1561)), vec![]);
        let plan = plan(&snap).unwrap();
        assert_eq!(plan.merged_primary.properties.birth_year, Some(1561));
        assert_eq!(plan.record.filled_properties, vec!["birth_year".to_string()]);
        assert!(plan.record.property_conflicts.is_empty());
    }

    #[test]
    fn test_differing_birth_year_keeps_primary_and_reports_conflict() {
        let snap = snapshot(figure("p", Some(1561)), figure("s", Some(1564)), vec![]);
        let plan = plan(&snap).unwrap();
        assert_eq!(plan.merged_primary.properties.birth_year, Some(1561));
        assert_eq!(plan.record.property_conflicts.len(), 1);
        let conflict = &plan.record.property_conflicts[0];
        assert_eq!(conflict.property, "birth_year");
        assert_eq!(conflict.primary_value, PropertyValue::Int(1561));
        assert_eq!(conflict.secondary_value, PropertyValue::Int(1564));
    }

    #[test]
    fn test_equal_values_are_neither_filled_nor_conflicting() {
        let mut p = figure("p", Some(1643));
        let mut s = figure("s", Some(1643));
        p.properties.occupation = Some("physicist".into());
        s.properties.occupation = Some("physicist".into());
        s.external_ref = Some("Q935".into());
        let plan = plan(&snapshot(p, s, vec![])).unwrap();
        assert!(plan.record.property_conflicts.is_empty());
        assert_eq!(plan.record.filled_properties, vec!["external_ref".to_string()]);
        assert_eq!(plan.merged_primary.external_ref.as_deref(), Some("Q935"));
    }

    #[test]
    fn test_relationship_transfer_drops_self_loops_and_duplicates() {
        let rels = vec![
            Relationship::new("r1", "film-1", "PORTRAYS", "p"),
            Relationship::new("r2", "film-1", "PORTRAYS", "s"), // duplicate of r1 after transfer
            Relationship::new("r3", "film-2", "PORTRAYS", "s"), // transferred
            Relationship::new("r4", "p", "SAME_AS", "s"),       // self-loop after transfer
            Relationship::new("r5", "s", "INTERACTED_WITH", "fig-9"), // transferred, outgoing
        ];
        let plan = plan(&snapshot(figure("p", None), figure("s", None), rels)).unwrap();

        assert_eq!(plan.record.transferred_relationship_count, 2);
        assert_eq!(plan.record.dropped_relationship_count, 2);
        assert_eq!(plan.dropped, vec!["r2".to_string(), "r4".to_string()]);

        let r3 = plan.transfers.iter().find(|r| r.id == "r3").unwrap();
        assert_eq!((r3.source_id.as_str(), r3.target_id.as_str()), ("film-2", "p"));
        let r5 = plan.transfers.iter().find(|r| r.id == "r5").unwrap();
        assert_eq!((r5.source_id.as_str(), r5.target_id.as_str()), ("p", "fig-9"));
    }

    #[test]
    fn test_two_secondary_edges_to_same_target_collapse() {
        let rels = vec![
            Relationship::new("r1", "s", "INTERACTED_WITH", "fig-3"),
            Relationship::new("r2", "fig-3", "INTERACTED_WITH", "s"),
        ];
        let plan = plan(&snapshot(figure("p", None), figure("s", None), rels)).unwrap();
        assert_eq!(plan.record.transferred_relationship_count, 1);
        assert_eq!(plan.dropped, vec!["r2".to_string()]);
    }

    #[test]
    fn test_relationship_properties_survive_transfer() {
        let mut rel = Relationship::new("r1", "book-1", "MENTIONS", "s");
        rel.properties = serde_json::json!({"chapter": 4});
        let plan = plan(&snapshot(figure("p", None), figure("s", None), vec![rel])).unwrap();
        assert_eq!(plan.transfers[0].properties["chapter"], 4);
    }

    #[test]
    fn test_validation_errors() {
        let snap = snapshot(figure("p", None), figure("s", None), vec![]);
        let same = plan_merge(&snap, "p", "p", "r", false, Utc::now()).unwrap_err();
        assert_eq!(same.status_code(), 400);
        let empty = plan_merge(&snap, " ", "s", "r", false, Utc::now()).unwrap_err();
        assert_eq!(empty.status_code(), 400);

        let missing = MergeSnapshot {
            secondary: None,
            ..snap.clone()
        };
        let err = plan(&missing).unwrap_err();
        assert!(matches!(err, DedupError::NotFound { ref id } if id == "s"));

        let mut deleted = snap;
        if let Some(s) = deleted.secondary.as_mut() {
            s.deleted = true;
        }
        let err = plan(&deleted).unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_dismissed_pair_cannot_be_merged() {
        let mut snap = snapshot(figure("p", None), figure("s", None), vec![]);
        snap.pair_dismissed = true;
        for dry_run in [true, false] {
            let err = plan_merge(&snap, "p", "s", "r", dry_run, Utc::now()).unwrap_err();
            assert!(matches!(err, DedupError::Conflict { ref id, .. } if id == "s"));
            assert!(err.to_string().contains("dismissed"));
        }
    }

    #[test]
    fn test_dry_run_flag_only_changes_record_flag() {
        let rels = vec![Relationship::new("r1", "film-1", "PORTRAYS", "s")];
        let snap = snapshot(figure("p", None), figure("s", Some(1500)), rels);
        let now = Utc::now();
        let dry = plan_merge(&snap, "p", "s", "reviewer", true, now).unwrap();
        let real = plan_merge(&snap, "p", "s", "reviewer", false, now).unwrap();
        assert!(dry.record.dry_run);
        assert!(!real.record.dry_run);
        assert!(dry.record.same_effect_as(&real.record));
        assert_eq!(dry.transfers, real.transfers);
    }
}
