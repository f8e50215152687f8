// src/models/matching.rs - Detection, dismissal and merge records
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::core::{Entity, PropertyValue};

pub const PAIR_KEY_SEPARATOR: char = '|';

/// Unordered entity pair in canonical order (smaller id first), so that
/// `(a, b)` and `(b, a)` produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub entity_id_1: String,
    pub entity_id_2: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        let (e1, e2) = if a <= b { (a, b) } else { (b, a) };
        Self {
            entity_id_1: e1.to_string(),
            entity_id_2: e2.to_string(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entity_id_1 == id || self.entity_id_2 == id
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.entity_id_1, PAIR_KEY_SEPARATOR, self.entity_id_2)
    }
}

/// Discrete confidence tier. Ordering is `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            other => Err(format!(
                "unknown confidence tier '{}' (expected high, medium or low)",
                other
            )),
        }
    }
}

/// Display attributes of one side of a candidate pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: String,
    pub display_name: Option<String>,
    pub external_ref: Option<String>,
    pub birth_year: Option<i32>,
    pub death_year: Option<i32>,
}

impl From<&Entity> for EntitySummary {
    fn from(e: &Entity) -> Self {
        Self {
            id: e.id.clone(),
            display_name: e.display_name.clone(),
            external_ref: e.external_ref.clone(),
            birth_year: e.properties.birth_year,
            death_year: e.properties.death_year,
        }
    }
}

/// A scored candidate duplicate. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicatePair {
    pub key: PairKey,
    pub entity_a: EntitySummary,
    pub entity_b: EntitySummary,
    pub lexical_score: f64,
    pub phonetic_score: f64,
    pub combined_score: f64,
    pub confidence: Confidence,
    /// Birth years within tolerance. `None` when either side lacks one.
    pub attribute_corroboration: Option<bool>,
}

/// A pair a reviewer has rejected as non-duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DismissedPair {
    pub key: PairKey,
    pub note: Option<String>,
    pub dismissed_by: Option<String>,
    pub dismissed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyConflict {
    pub property: String,
    pub primary_value: PropertyValue,
    pub secondary_value: PropertyValue,
}

/// Immutable audit entry describing what a merge did (or would do).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecord {
    pub primary_id: String,
    pub secondary_id: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub transferred_relationship_count: usize,
    pub dropped_relationship_count: usize,
    pub filled_properties: Vec<String>,
    pub property_conflicts: Vec<PropertyConflict>,
    pub dry_run: bool,
}

impl MergeRecord {
    /// True when both records describe the same effect, ignoring the
    /// timestamp and the dry-run flag.
    pub fn same_effect_as(&self, other: &MergeRecord) -> bool {
        self.primary_id == other.primary_id
            && self.secondary_id == other.secondary_id
            && self.actor == other.actor
            && self.transferred_relationship_count == other.transferred_relationship_count
            && self.dropped_relationship_count == other.dropped_relationship_count
            && self.filled_properties == other.filled_properties
            && self.property_conflicts == other.property_conflicts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    Cancelled,
    DeadlineExceeded,
}

/// Outcome of one detection run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionReport {
    pub pairs: Vec<DuplicatePair>,
    pub entities_scanned: usize,
    pub pairs_considered: usize,
    pub pairs_prefiltered: usize,
    pub pairs_cross_ref_excluded: usize,
    pub pairs_dismissed: usize,
    pub pairs_scored: usize,
    pub completed: bool,
    pub halt_reason: Option<HaltReason>,
}
