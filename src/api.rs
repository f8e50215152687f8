// src/api.rs - Request/response shapes for detect, dismiss and merge
//
// These are the JSON bodies the CLI prints and that an HTTP front end would
// exchange. Handlers here only translate between wire shapes and the engine.
use serde::{Deserialize, Serialize};

use crate::config::{DetectionConfig, ScanControl};
use crate::errors::{DedupError, DedupResult};
use crate::matching::{CandidateGenerator, DismissalRegistry};
use crate::merge::MergeOrchestrator;
use crate::models::{Confidence, DismissedPair, DuplicatePair, HaltReason, MergeRecord};
use crate::store::DedupStore;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectRequest {
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub min_confidence: Option<Confidence>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl DetectRequest {
    pub fn to_config(&self, base: DetectionConfig) -> DetectionConfig {
        base.with_overrides(self.threshold, self.min_confidence, self.limit)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    pub pairs: Vec<DuplicatePair>,
    pub total_entities_scanned: usize,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<HaltReason>,
    pub threshold: f64,
    pub min_confidence: Confidence,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DismissRequest {
    pub entity_a_id: String,
    pub entity_b_id: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub dismissed_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DismissAck {
    pub pair_key: String,
    pub dismissed: bool,
    pub note: Option<String>,
    pub dismissed_at: chrono::DateTime<chrono::Utc>,
}

impl From<DismissedPair> for DismissAck {
    fn from(pair: DismissedPair) -> Self {
        Self {
            pair_key: pair.key.to_string(),
            dismissed: true,
            note: pair.note,
            dismissed_at: pair.dismissed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub primary_id: String,
    pub secondary_id: String,
    #[serde(default)]
    pub dry_run: bool,
    pub actor: String,
}

/// Structured error body. `status` follows HTTP conventions so callers can
/// tell "unknown entity" (404) from "already merged" (409) from a bad
/// request (400).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub kind: String,
    pub message: String,
}

impl From<&DedupError> for ErrorBody {
    fn from(err: &DedupError) -> Self {
        Self {
            status: err.status_code(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

pub async fn handle_detect<S: DedupStore>(
    generator: &CandidateGenerator<S>,
    request: &DetectRequest,
    base: DetectionConfig,
    control: &ScanControl,
) -> DedupResult<DetectResponse> {
    let config = request.to_config(base);
    let report = generator.detect(&config, control).await?;
    Ok(DetectResponse {
        pairs: report.pairs,
        total_entities_scanned: report.entities_scanned,
        completed: report.completed,
        halt_reason: report.halt_reason,
        threshold: config.threshold,
        min_confidence: config.min_confidence,
        limit: config.limit,
    })
}

pub async fn handle_dismiss<S: DedupStore>(
    registry: &DismissalRegistry<S>,
    request: &DismissRequest,
) -> DedupResult<DismissAck> {
    let pair = registry
        .dismiss(
            &request.entity_a_id,
            &request.entity_b_id,
            request.note.as_deref(),
            request.dismissed_by.as_deref(),
        )
        .await?;
    Ok(pair.into())
}

pub async fn handle_merge<S: DedupStore>(
    orchestrator: &MergeOrchestrator<S>,
    request: &MergeRequest,
) -> DedupResult<MergeRecord> {
    orchestrator
        .merge(
            &request.primary_id,
            &request.secondary_id,
            &request.actor,
            request.dry_run,
        )
        .await
}
