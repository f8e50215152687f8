// src/utils/progress_bars/progress_config.rs

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::env;

/// Configuration for progress display during detection runs
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Whether to show progress bars at all
    pub enabled: bool,
    /// Whether to log per-block progress messages in addition to the bar
    pub detailed: bool,
    /// Refresh rate for progress bars in milliseconds
    pub refresh_rate_ms: u64,
    /// Whether to report memory usage in the detection summary
    pub show_memory: bool,
    /// Whether to report database connection pool statistics
    pub show_db_connection_stats: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detailed: false,
            refresh_rate_ms: 100,
            show_memory: true,
            show_db_connection_stats: true,
        }
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl ProgressConfig {
    /// Create progress configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_flag("PROGRESS_ENABLED", defaults.enabled),
            detailed: env_flag("PROGRESS_DETAILED", defaults.detailed),
            refresh_rate_ms: env::var("PROGRESS_REFRESH_RATE_MS")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.refresh_rate_ms),
            show_memory: env_flag("PROGRESS_SHOW_MEMORY", defaults.show_memory),
            show_db_connection_stats: env_flag(
                "PROGRESS_SHOW_DB_CONNECTIONS",
                defaults.show_db_connection_stats,
            ),
        }
    }

    /// Draw rate in Hz derived from `refresh_rate_ms`, kept within 1..=60.
    pub fn refresh_hz(&self) -> u8 {
        let hz = 1000 / self.refresh_rate_ms.max(1);
        hz.clamp(1, 60) as u8
    }

    /// A styled bar over `len` scan blocks, or None when progress is disabled.
    pub fn create_scan_bar(&self, len: u64) -> Option<ProgressBar> {
        if !self.enabled {
            return None;
        }
        let pb = ProgressBar::with_draw_target(
            Some(len),
            ProgressDrawTarget::stderr_with_hz(self.refresh_hz()),
        );
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} blocks {msg}")
        {
            pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        pb.set_message("scoring pairs...");
        Some(pb)
    }

    pub fn should_show_detailed(&self) -> bool {
        self.enabled && self.detailed
    }

    pub fn should_show_memory(&self) -> bool {
        self.enabled && self.show_memory
    }

    pub fn should_show_db_connection_stats(&self) -> bool {
        self.enabled && self.show_db_connection_stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = ProgressConfig::default();
        assert!(config.enabled);
        assert!(!config.detailed);
        assert_eq!(config.refresh_rate_ms, 100);
        assert_eq!(config.refresh_hz(), 10);
        assert!(config.show_memory);
        assert!(config.show_db_connection_stats);
    }

    #[test]
    fn test_env_config() {
        env::set_var("PROGRESS_ENABLED", "false");
        env::set_var("PROGRESS_DETAILED", "true");
        env::set_var("PROGRESS_REFRESH_RATE_MS", "5");
        env::set_var("PROGRESS_SHOW_MEMORY", "false");
        env::set_var("PROGRESS_SHOW_DB_CONNECTIONS", "nope");

        let config = ProgressConfig::from_env();
        assert!(!config.enabled);
        assert!(config.detailed);
        assert_eq!(config.refresh_rate_ms, 5);
        assert_eq!(config.refresh_hz(), 60);
        assert!(!config.show_memory);
        // Malformed values fall back to the default.
        assert!(config.show_db_connection_stats);

        env::remove_var("PROGRESS_ENABLED");
        env::remove_var("PROGRESS_DETAILED");
        env::remove_var("PROGRESS_REFRESH_RATE_MS");
        env::remove_var("PROGRESS_SHOW_MEMORY");
        env::remove_var("PROGRESS_SHOW_DB_CONNECTIONS");
    }

    #[test]
    fn test_scan_bar_creation() {
        let mut config = ProgressConfig::default();
        config.enabled = false;
        assert!(config.create_scan_bar(10).is_none());
        config.enabled = true;
        let pb = config.create_scan_bar(10).unwrap();
        assert_eq!(pb.length(), Some(10));
    }

    #[test]
    fn test_should_show_methods() {
        let mut config = ProgressConfig::default();
        config.detailed = true;
        assert!(config.should_show_detailed());
        assert!(config.should_show_memory());
        assert!(config.should_show_db_connection_stats());

        config.enabled = false;
        assert!(!config.should_show_detailed());
        assert!(!config.should_show_memory());
        assert!(!config.should_show_db_connection_stats());
    }
}
