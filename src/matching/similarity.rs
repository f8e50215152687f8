// src/matching/similarity.rs - Lexical + phonetic name similarity
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strsim::levenshtein;

use crate::matching::phonetic::{encode_token, PhoneticCode};

pub const LEXICAL_WEIGHT: f64 = 0.7;
pub const PHONETIC_WEIGHT: f64 = 0.3;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScores {
    pub lexical: f64,
    pub phonetic: f64,
    pub combined: f64,
}

/// Lowercases, trims and collapses internal whitespace.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    WHITESPACE.replace_all(&lowered, " ").into_owned()
}

/// Precomputed matching view of one name. The candidate generator builds one
/// per entity so that each name is normalized and encoded once per scan.
#[derive(Debug, Clone)]
pub struct NameProfile {
    pub normalized: String,
    pub char_len: usize,
    pub codes: Vec<PhoneticCode>,
}

impl NameProfile {
    pub fn new(name: &str) -> Self {
        let normalized = normalize_name(name);
        let codes = normalized
            .split(' ')
            .filter(|t| !t.is_empty())
            .filter_map(encode_token)
            .collect();
        Self {
            char_len: normalized.chars().count(),
            normalized,
            codes,
        }
    }
}

pub fn lexical_similarity(a: &str, b: &str) -> f64 {
    lexical_from_normalized(&normalize_name(a), &normalize_name(b))
}

fn lexical_from_normalized(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let d = levenshtein(a, b);
    (max_len - d.min(max_len)) as f64 / max_len as f64
}

pub fn phonetic_similarity(a: &str, b: &str) -> f64 {
    phonetic_from_codes(&NameProfile::new(a).codes, &NameProfile::new(b).codes)
}

/// Best pairwise token match; one strong token (a shared surname) is enough.
fn phonetic_from_codes(a: &[PhoneticCode], b: &[PhoneticCode]) -> f64 {
    let mut best = 0.0_f64;
    for ca in a {
        for cb in b {
            best = best.max(token_match(ca, cb));
            if best >= 1.0 {
                return 1.0;
            }
        }
    }
    best
}

fn token_match(a: &PhoneticCode, b: &PhoneticCode) -> f64 {
    if !a.primary.is_empty() && a.primary == b.primary {
        return 1.0;
    }
    let same = |x: Option<&str>, y: Option<&str>| match (x, y) {
        (Some(x), Some(y)) => !x.is_empty() && x == y,
        _ => false,
    };
    let (a_primary, a_secondary) = (Some(a.primary.as_str()), a.secondary.as_deref());
    let (b_primary, b_secondary) = (Some(b.primary.as_str()), b.secondary.as_deref());
    if same(a_primary, b_secondary) || same(a_secondary, b_primary) || same(a_secondary, b_secondary)
    {
        0.5
    } else {
        0.0
    }
}

pub fn score_profiles(a: &NameProfile, b: &NameProfile) -> SimilarityScores {
    let lexical = lexical_from_normalized(&a.normalized, &b.normalized);
    let phonetic = phonetic_from_codes(&a.codes, &b.codes);
    SimilarityScores {
        lexical,
        phonetic,
        combined: LEXICAL_WEIGHT * lexical + PHONETIC_WEIGHT * phonetic,
    }
}

/// Scores two raw display names. Pure and deterministic.
pub fn score(name_a: &str, name_b: &str) -> SimilarityScores {
    score_profiles(&NameProfile::new(name_a), &NameProfile::new(name_b))
}
