// src/enrichment/mod.rs - External reference lookup (Wikidata) for backfills
//
// Only the backfill binary calls out to the network. Detection reads the
// `external_ref` values this writes and never calls a source itself.
use anyhow::{Context, Result};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

const WIKIDATA_API_URL: &str = "https://www.wikidata.org/w/api.php";
const USER_AGENT: &str = concat!("figure_dedupe/", env!("CARGO_PKG_VERSION"));

static QID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Q\d+$").unwrap());

pub fn is_valid_qid(candidate: &str) -> bool {
    QID.is_match(candidate)
}

/// Enforces a minimum gap between consecutive calls. Each client owns its
/// own limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: None,
        }
    }

    /// How long a call made at `now` would have to wait.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_call {
            Some(last) => self.min_interval.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Sleeps until the next call is allowed and records it.
    pub async fn acquire(&mut self) {
        let wait = self.remaining(Instant::now());
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        self.last_call = Some(Instant::now());
    }
}

/// A catalog that can resolve a display name to a stable identifier.
#[allow(async_fn_in_trait)]
pub trait ExternalRefSource {
    fn source_name(&self) -> &'static str;

    /// Returns an identifier only for an unambiguous match.
    async fn lookup(&mut self, display_name: &str) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    #[serde(default)]
    label: Option<String>,
}

pub struct WikidataClient {
    http: Client,
    limiter: RateLimiter,
    language: String,
}

impl WikidataClient {
    pub fn new(min_interval: Duration, language: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(20))
            .build()
            .context("Failed to build Wikidata HTTP client")?;
        Ok(Self {
            http,
            limiter: RateLimiter::new(min_interval),
            language: language.to_string(),
        })
    }
}

/// First hit whose label equals the name, ignoring case and surrounding space.
fn pick_exact_match(display_name: &str, response: &SearchResponse) -> Option<String> {
    let wanted = display_name.trim().to_lowercase();
    response
        .search
        .iter()
        .filter(|hit| is_valid_qid(&hit.id))
        .find(|hit| {
            hit.label
                .as_deref()
                .map(|l| l.trim().to_lowercase() == wanted)
                .unwrap_or(false)
        })
        .map(|hit| hit.id.clone())
}

impl ExternalRefSource for WikidataClient {
    fn source_name(&self) -> &'static str {
        "wikidata"
    }

    async fn lookup(&mut self, display_name: &str) -> Result<Option<String>> {
        if display_name.trim().is_empty() {
            return Ok(None);
        }
        self.limiter.acquire().await;

        let response = self
            .http
            .get(WIKIDATA_API_URL)
            .query(&[
                ("action", "wbsearchentities"),
                ("search", display_name.trim()),
                ("language", self.language.as_str()),
                ("type", "item"),
                ("limit", "5"),
                ("format", "json"),
            ])
            .send()
            .await
            .context("Wikidata request failed")?
            .error_for_status()
            .context("Wikidata returned an error status")?;
        let body: SearchResponse = response
            .json()
            .await
            .context("Failed to parse Wikidata search response")?;

        let found = pick_exact_match(display_name, &body);
        debug!(
            "Wikidata lookup '{}': {} hits, match {:?}",
            display_name,
            body.search.len(),
            found
        );
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qid_validation() {
        assert!(is_valid_qid("Q517"));
        assert!(!is_valid_qid("q517"));
        assert!(!is_valid_qid("Q"));
        assert!(!is_valid_qid("P31"));
    }

    #[test]
    fn test_rate_limiter_remaining() {
        let mut limiter = RateLimiter::new(Duration::from_millis(500));
        let t0 = Instant::now();
        assert_eq!(limiter.remaining(t0), Duration::ZERO);
        limiter.last_call = Some(t0);
        assert_eq!(limiter.remaining(t0 + Duration::from_millis(200)), Duration::from_millis(300));
        assert_eq!(limiter.remaining(t0 + Duration::from_secs(2)), Duration::ZERO);
    }

    #[test]
    fn test_pick_exact_match_requires_label_equality() {
        let body: SearchResponse = serde_json::from_str(
            r#"{"search": [
                {"id": "Q1001", "label": "Gandhi (film)"},
                {"id": "Q1001x", "label": "Mahatma Gandhi"},
                {"id": "Q1001", "label": "Mahatma Gandhi"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(pick_exact_match(" mahatma gandhi ", &body), Some("Q1001".to_string()));
        assert_eq!(pick_exact_match("Gandhi", &body), None);

        let empty: SearchResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(pick_exact_match("Gandhi", &empty), None);
    }
}
