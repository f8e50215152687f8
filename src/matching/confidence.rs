// src/matching/confidence.rs
use crate::models::matching::Confidence;

pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.90;
pub const MEDIUM_CONFIDENCE_THRESHOLD: f64 = 0.70;

/// Maps a combined score to its tier. NaN falls through to `Low`.
pub fn classify(combined: f64) -> Confidence {
    if combined >= HIGH_CONFIDENCE_THRESHOLD {
        Confidence::High
    } else if combined >= MEDIUM_CONFIDENCE_THRESHOLD {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}
