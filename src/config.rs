// src/config.rs - Detection settings and cooperative scan control
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::{Confidence, HaltReason};
use crate::utils::env::env_or;

pub const DEFAULT_THRESHOLD: f64 = 0.70;
pub const DEFAULT_MIN_CONFIDENCE: Confidence = Confidence::Medium;
pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 500;

/// Pairs whose name lengths differ by more than this ratio are never scored.
pub const LENGTH_RATIO_FLOOR: f64 = 0.5;
/// Birth years within this many years corroborate a candidate pair.
pub const BIRTH_YEAR_TOLERANCE: u32 = 5;
/// Rows of the pair matrix handed to a worker at a time.
pub const ROW_BLOCK_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub threshold: f64,
    pub min_confidence: Confidence,
    pub limit: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl DetectionConfig {
    /// Builds a config from optional request values. Threshold is clamped to
    /// [0, 1] (NaN uses the default) and limit to [1, 500].
    pub fn new(
        threshold: Option<f64>,
        min_confidence: Option<Confidence>,
        limit: Option<usize>,
    ) -> Self {
        let threshold = match threshold {
            Some(t) if t.is_nan() => {
                warn!("Threshold is NaN, using default {:.2}", DEFAULT_THRESHOLD);
                DEFAULT_THRESHOLD
            }
            Some(t) => t.clamp(0.0, 1.0),
            None => DEFAULT_THRESHOLD,
        };
        Self {
            threshold,
            min_confidence: min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }

    /// Defaults overridden by DEDUP_THRESHOLD, DEDUP_MIN_CONFIDENCE and DEDUP_LIMIT.
    pub fn from_env() -> Self {
        Self::new(
            Some(env_or("DEDUP_THRESHOLD", DEFAULT_THRESHOLD)),
            Some(env_or("DEDUP_MIN_CONFIDENCE", DEFAULT_MIN_CONFIDENCE)),
            Some(env_or("DEDUP_LIMIT", DEFAULT_LIMIT)),
        )
    }

    /// Applies request values on top of this config, re-clamping the result.
    pub fn with_overrides(
        self,
        threshold: Option<f64>,
        min_confidence: Option<Confidence>,
        limit: Option<usize>,
    ) -> Self {
        Self::new(
            Some(threshold.unwrap_or(self.threshold)),
            Some(min_confidence.unwrap_or(self.min_confidence)),
            Some(limit.unwrap_or(self.limit)),
        )
    }
}

/// DEDUP_SCAN_TIMEOUT_SECS, when set to a positive number.
pub fn scan_timeout_from_env() -> Option<Duration> {
    let secs: u64 = env_or("DEDUP_SCAN_TIMEOUT_SECS", 0);
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Cancellation flag plus optional deadline, checked by scan workers between
/// row blocks. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct ScanControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl ScanControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Why the scan should stop now, if it should.
    pub fn check(&self) -> Option<HaltReason> {
        if self.is_cancelled() {
            return Some(HaltReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(HaltReason::DeadlineExceeded),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_config_clamps() {
        let c = DetectionConfig::new(Some(1.7), None, Some(10_000));
        assert_eq!(c.threshold, 1.0);
        assert_eq!(c.limit, MAX_LIMIT);
        assert_eq!(c.min_confidence, Confidence::Medium);

        let c = DetectionConfig::new(Some(-0.2), Some(Confidence::High), Some(0));
        assert_eq!(c.threshold, 0.0);
        assert_eq!(c.limit, 1);

        let c = DetectionConfig::new(Some(f64::NAN), None, None);
        assert_eq!(c, DetectionConfig::default());
    }

    #[test]
    fn test_overrides_keep_unset_values() {
        let base = DetectionConfig::new(Some(0.8), Some(Confidence::High), Some(20));
        let c = base.with_overrides(None, Some(Confidence::Low), None);
        assert_eq!(c.threshold, 0.8);
        assert_eq!(c.min_confidence, Confidence::Low);
        assert_eq!(c.limit, 20);
    }

    #[test]
    fn test_scan_control() {
        let control = ScanControl::new();
        assert_eq!(control.check(), None);
        let shared = control.clone();
        shared.cancel();
        assert_eq!(control.check(), Some(HaltReason::Cancelled));

        let expired = ScanControl::with_deadline(Instant::now());
        assert_eq!(expired.check(), Some(HaltReason::DeadlineExceeded));
        let roomy = ScanControl::with_timeout(Duration::from_secs(3600));
        assert_eq!(roomy.check(), None);
    }
}
