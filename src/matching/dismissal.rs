// src/matching/dismissal.rs - Durable registry of pairs reviewed as non-duplicates
use chrono::Utc;
use std::sync::Arc;

use crate::errors::{DedupError, DedupResult};
use crate::models::{DismissedPair, PairKey};
use crate::store::{DedupStore, DismissedSet};
use crate::utils::progress_bars::logging::DedupLogger;

pub struct DismissalRegistry<S: DedupStore> {
    store: Arc<S>,
}

impl<S: DedupStore> DismissalRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn is_dismissed(&self, id_a: &str, id_b: &str) -> DedupResult<bool> {
        self.store.is_dismissed(&PairKey::new(id_a, id_b)).await
    }

    /// Records that `(id_a, id_b)` is not a duplicate. Dismissing the same
    /// pair again, in either order, only replaces the note.
    pub async fn dismiss(
        &self,
        id_a: &str,
        id_b: &str,
        note: Option<&str>,
        dismissed_by: Option<&str>,
    ) -> DedupResult<DismissedPair> {
        let (id_a, id_b) = (id_a.trim(), id_b.trim());
        if id_a.is_empty() || id_b.is_empty() {
            return Err(DedupError::validation("both entity ids are required"));
        }
        if id_a == id_b {
            return Err(DedupError::validation(format!(
                "cannot dismiss entity {} against itself",
                id_a
            )));
        }

        let note = note.map(str::trim).filter(|n| !n.is_empty());
        let key = PairKey::new(id_a, id_b);
        let pair = self
            .store
            .upsert_dismissal(&key, note, dismissed_by, Utc::now())
            .await?;
        DedupLogger::dismissal().log_dismissal(&pair);
        Ok(pair)
    }

    /// Read-only copy for one detection run.
    pub async fn snapshot(&self) -> DedupResult<DismissedSet> {
        self.store.load_dismissed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> DismissalRegistry<MemoryStore> {
        DismissalRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_dismissal_is_order_independent() {
        let reg = registry();
        reg.dismiss("fig-2", "fig-1", None, None).await.unwrap();
        assert!(reg.is_dismissed("fig-1", "fig-2").await.unwrap());
        assert!(reg.is_dismissed("fig-2", "fig-1").await.unwrap());
        assert!(!reg.is_dismissed("fig-1", "fig-3").await.unwrap());
    }

    #[tokio::test]
    async fn test_redismiss_updates_note_only() {
        let reg = registry();
        let first = reg
            .dismiss("fig-1", "fig-2", Some("father and son"), Some("alice"))
            .await
            .unwrap();
        let second = reg
            .dismiss("fig-2", "fig-1", Some("Dumas père / Dumas fils"), Some("bob"))
            .await
            .unwrap();

        assert_eq!(second.note.as_deref(), Some("Dumas père / Dumas fils"));
        assert_eq!(second.dismissed_at, first.dismissed_at);
        assert_eq!(reg.snapshot().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_dismissals_are_rejected() {
        let reg = registry();
        let err = reg.dismiss("fig-1", "fig-1", None, None).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        let err = reg.dismiss("", "fig-1", None, None).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(reg.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_note_is_stored_as_none() {
        let reg = registry();
        let pair = reg.dismiss("a", "b", Some("   "), None).await.unwrap();
        assert!(pair.note.is_none());
    }
}
