// src/utils/progress_bars/progress_callback.rs - Progress callbacks for long-running scans

use indicatif::ProgressBar;
use log::debug;
use std::sync::Arc;

/// Type alias for progress callback functions
/// Takes phase name and optional detailed progress information
pub type ProgressCallback = Arc<dyn Fn(String, Option<String>) + Send + Sync>;

/// Callback that only writes debug log lines.
pub fn create_simple_callback(tag: &str) -> ProgressCallback {
    let tag = tag.to_string();
    Arc::new(move |phase: String, details: Option<String>| {
        let detail_str = details.map(|d| format!(" - {}", d)).unwrap_or_default();
        debug!("[{}] Progress: {}{}", tag, phase, detail_str);
    })
}

/// Callback that drives a progress bar. Details of the form `"current/total"`
/// move the bar and set its length; anything else becomes the bar message.
pub fn create_bar_callback(pb: ProgressBar) -> ProgressCallback {
    Arc::new(move |phase: String, details: Option<String>| {
        let counts = details.as_deref().and_then(|d| {
            let head = d.split_whitespace().next()?;
            let (current, total) = head.split_once('/')?;
            Some((current.parse::<u64>().ok()?, total.parse::<u64>().ok()?))
        });
        match counts {
            Some((current, total)) => {
                pb.set_length(total);
                pb.set_position(current);
            }
            None => pb.set_message(match details {
                Some(d) => format!("{} - {}", phase, d),
                None => phase,
            }),
        }
    })
}

/// Convenience macro for updating progress
#[macro_export]
macro_rules! update_progress {
    ($callback:expr, $phase:expr) => {
        if let Some(ref cb) = $callback {
            cb($phase.to_string(), None);
        }
    };
    ($callback:expr, $phase:expr, $details:expr) => {
        if let Some(ref cb) = $callback {
            cb($phase.to_string(), Some($details.to_string()));
        }
    };
}

/// Convenience macro for updating progress with a current/total count
#[macro_export]
macro_rules! update_detailed_progress {
    ($callback:expr, $phase:expr, $current:expr, $total:expr) => {
        if let Some(ref cb) = $callback {
            let details = format!("{}/{}", $current, $total);
            cb($phase.to_string(), Some(details));
        }
    };
    ($callback:expr, $phase:expr, $current:expr, $total:expr, $extra:expr) => {
        if let Some(ref cb) = $callback {
            let details = format!("{}/{} ({})", $current, $total, $extra);
            cb($phase.to_string(), Some(details));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_macros_invoke_callback() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = Arc::clone(&call_count);
        let callback: Option<ProgressCallback> = Some(Arc::new(move |_phase: String, _details: Option<String>| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        update_progress!(callback, "Loading");
        update_progress!(callback, "Loading", "entities");
        update_detailed_progress!(callback, "Scoring", 3, 10);
        update_detailed_progress!(callback, "Scoring", 4, 10, "2 candidates");
        assert_eq!(call_count.load(Ordering::SeqCst), 4);

        let none: Option<ProgressCallback> = None;
        update_progress!(none, "ignored");
    }

    #[test]
    fn test_bar_callback_moves_position() {
        let pb = ProgressBar::hidden();
        let cb = create_bar_callback(pb.clone());
        cb("Scoring".to_string(), Some("4/10 (2 candidates)".to_string()));
        assert_eq!(pb.position(), 4);
        assert_eq!(pb.length(), Some(10));
        cb("Scoring".to_string(), Some("done".to_string()));
        assert_eq!(pb.position(), 4);
    }

    #[test]
    fn test_simple_callback_creation() {
        let callback = create_simple_callback("DETECT");
        callback("Phase".to_string(), Some("details".to_string()));
        callback("Phase2".to_string(), None);
    }
}
