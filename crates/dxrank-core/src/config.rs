//! # Engine Configuration
//!
//! Tunables for the grounding engine, the scoring engine and the cache.
//! All structs deserialize with defaults so a partial TOML section is valid.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// DEFAULTS
// =============================================================================

/// Distance cutoff for semantic-search hits.
pub const DEFAULT_RELEVANCE_THRESHOLD: f64 = 0.23;

/// Semantic-search hits kept per diagnosis.
pub const DEFAULT_SEARCH_LIMIT: usize = 1;

/// Attempts for a fallback search call, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// First backoff delay; doubles on each retry.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;

/// Entries kept per cache file before LRU eviction.
pub const DEFAULT_CACHE_CAPACITY: usize = 524_288;

/// How long to wait for another handle to release a cache file.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;

// =============================================================================
// GROUNDING
// =============================================================================

/// Settings for [`crate::grounding::Grounder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundingConfig {
    /// Only annotations whose id starts with one of these are kept.
    pub allowed_prefixes: Vec<String>,
    /// Enable the semantic-search tier.
    pub fallback_enabled: bool,
    /// Collection searched in the semantic store.
    pub collection: String,
    pub relevance_threshold: f64,
    pub limit: usize,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    /// Drop everything before the first "1." in the model output.
    pub require_enumeration: bool,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            allowed_prefixes: vec!["MONDO:".to_string()],
            fallback_enabled: true,
            collection: "ont_mondo".to_string(),
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
            limit: DEFAULT_SEARCH_LIMIT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            require_enumeration: true,
        }
    }
}

impl GroundingConfig {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
        )
    }

    /// Whether `id` belongs to one of the allowed namespaces.
    #[must_use]
    pub fn is_allowed(&self, id: &str) -> bool {
        self.allowed_prefixes
            .iter()
            .any(|prefix| id.starts_with(prefix.as_str()))
    }
}

// =============================================================================
// SCORING
// =============================================================================

/// Which score values the scoring engine may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringPolicy {
    /// `{0.0, 1.0}`: exact or grouping matches only.
    Binary,
    /// `{0.0, 0.5, 1.0}`: adds partial credit for more specific predictions.
    #[default]
    Tiered,
}

/// Settings for [`crate::scoring::Scorer`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub policy: ScoringPolicy,
    /// Grounded ids outside these prefixes score zero.
    pub candidate_prefixes: Vec<String>,
    /// Gold namespaces that denote disease groupings (phenotypic series).
    pub grouping_namespaces: Vec<String>,
    /// Predicates followed when looking for a grouping ancestor.
    pub grouping_predicates: Vec<String>,
    /// Predicates followed when looking for a broader matching disease.
    pub subsumption_predicates: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            policy: ScoringPolicy::Tiered,
            candidate_prefixes: vec!["MONDO:".to_string()],
            grouping_namespaces: vec!["OMIMPS".to_string()],
            grouping_predicates: vec!["rdfs:subClassOf".to_string()],
            subsumption_predicates: vec!["rdfs:subClassOf".to_string()],
        }
    }
}

impl ScoringConfig {
    /// Whether a grounded id is eligible for credit.
    #[must_use]
    pub fn is_candidate(&self, id: &str) -> bool {
        self.candidate_prefixes
            .iter()
            .any(|prefix| id.starts_with(prefix.as_str()))
    }
}

// =============================================================================
// CACHE
// =============================================================================

/// Settings for the durable cache files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub lock_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
