//! # Core Type Definitions
//!
//! This module contains the typed records that flow through the pipeline:
//! - Input records (`RawResponse`, `Gold`)
//! - Segmenter output (`DiagnosisLine`)
//! - Grounding output (`Candidate`, `GroundingResult`)
//! - Scoring output (`MatchScore`, `ScoredCandidate`, `ScoredCase`, `CaseSummary`)
//! - Error types (`DxError`)
//!
//! Tabular and JSON shapes exist only at the I/O boundary; everything inside
//! the core uses these records.

use crate::gateway::GatewayError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// SENTINELS
// =============================================================================

/// Identifier used when a diagnosis line could not be grounded.
pub const SENTINEL_ID: &str = "N/A";

/// Label paired with [`SENTINEL_ID`] when neither grounding tier matched.
pub const NO_GROUNDING_LABEL: &str = "No grounding found";

/// Label paired with [`SENTINEL_ID`] when the fallback tier errored out.
pub const GROUNDING_FAILED_LABEL: &str = "CurateGPT grounding failed";

// =============================================================================
// INPUT RECORDS
// =============================================================================

/// The known-correct disease for a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gold {
    pub disease_id: String,
    #[serde(default)]
    pub disease_name: String,
}

impl Gold {
    #[must_use]
    pub fn new(disease_id: impl Into<String>, disease_name: impl Into<String>) -> Self {
        Self {
            disease_id: disease_id.into(),
            disease_name: disease_name.into(),
        }
    }
}

/// One model response as produced by the inference step.
///
/// On disk this is a JSONL record `{"id", "response", "gold"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResponse {
    #[serde(rename = "id")]
    pub case_id: String,
    #[serde(rename = "response", default)]
    pub free_text: String,
    #[serde(default)]
    pub gold: Option<Gold>,
}

impl RawResponse {
    #[must_use]
    pub fn new(case_id: impl Into<String>, free_text: impl Into<String>, gold: Gold) -> Self {
        Self {
            case_id: case_id.into(),
            free_text: free_text.into(),
            gold: Some(gold),
        }
    }

    /// The gold record, if present and carrying a non-empty identifier.
    #[must_use]
    pub fn usable_gold(&self) -> Option<&Gold> {
        self.gold
            .as_ref()
            .filter(|gold| !gold.disease_id.trim().is_empty())
    }
}

// =============================================================================
// SEGMENTER OUTPUT
// =============================================================================

/// A cleaned candidate diagnosis with its 1-based position in the model's list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisLine {
    pub rank: usize,
    pub text: String,
}

// =============================================================================
// GROUNDING OUTPUT
// =============================================================================

/// A single `(ontology_id, label)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub label: String,
}

impl Candidate {
    #[must_use]
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }

    /// The "no grounding found" sentinel.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(SENTINEL_ID, NO_GROUNDING_LABEL)
    }

    /// The "fallback grounding failed" sentinel.
    #[must_use]
    pub fn failed() -> Self {
        Self::new(SENTINEL_ID, GROUNDING_FAILED_LABEL)
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.id == SENTINEL_ID
    }
}

/// Grounding of one diagnosis line.
///
/// `candidates` is never empty: when nothing matched it holds exactly one
/// sentinel candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingResult {
    pub diagnosis_text: String,
    pub candidates: Vec<Candidate>,
}

impl GroundingResult {
    /// Build a result, substituting the "not found" sentinel for an empty list.
    #[must_use]
    pub fn new(diagnosis_text: impl Into<String>, candidates: Vec<Candidate>) -> Self {
        let candidates = if candidates.is_empty() {
            vec![Candidate::not_found()]
        } else {
            candidates
        };
        Self {
            diagnosis_text: diagnosis_text.into(),
            candidates,
        }
    }

    /// True when the only candidate is a sentinel.
    #[must_use]
    pub fn is_ungrounded(&self) -> bool {
        self.candidates.iter().all(Candidate::is_sentinel)
    }
}

// =============================================================================
// SCORING OUTPUT
// =============================================================================

/// Quality of a grounded-vs-gold match.
///
/// Ordered: `Miss < Partial < Full`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MatchScore {
    Miss,
    Partial,
    Full,
}

impl MatchScore {
    /// Numeric value written to output files.
    #[must_use]
    pub const fn value(self) -> f64 {
        match self {
            Self::Miss => 0.0,
            Self::Partial => 0.5,
            Self::Full => 1.0,
        }
    }

    #[must_use]
    pub const fn is_correct(self) -> bool {
        !matches!(self, Self::Miss)
    }
}

/// One scored `(rank, grounded_id)` entry of a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub rank: usize,
    pub grounded_id: String,
    pub grounded_score: f64,
    pub is_correct: bool,
}

impl ScoredCandidate {
    #[must_use]
    pub fn new(rank: usize, grounded_id: impl Into<String>, score: MatchScore) -> Self {
        Self {
            rank,
            grounded_id: grounded_id.into(),
            grounded_score: score.value(),
            is_correct: score.is_correct(),
        }
    }
}

/// A fully processed case: grounding plus scored list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCase {
    #[serde(rename = "id")]
    pub case_id: String,
    pub gold: Gold,
    #[serde(default)]
    pub grounding: Vec<GroundingResult>,
    #[serde(default)]
    pub scored: Vec<ScoredCandidate>,
}

impl ScoredCase {
    /// Derive the per-case summary.
    #[must_use]
    pub fn summary(&self) -> CaseSummary {
        CaseSummary::from_scored(&self.scored)
    }
}

/// Derived per-case outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaseSummary {
    /// Smallest rank among correct entries; `None` means not found.
    pub correct_rank: Option<usize>,
    /// Any entry carries the sentinel id.
    pub grounding_failure: bool,
}

impl CaseSummary {
    #[must_use]
    pub fn from_scored(scored: &[ScoredCandidate]) -> Self {
        Self {
            correct_rank: scored
                .iter()
                .filter(|entry| entry.is_correct)
                .map(|entry| entry.rank)
                .min(),
            grounding_failure: scored.iter().any(|entry| entry.grounded_id == SENTINEL_ID),
        }
    }

    #[must_use]
    pub fn is_found(&self) -> bool {
        self.correct_rank.is_some()
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in dxrank.
///
/// Grounding and scoring degrade to sentinel values instead of returning
/// errors; these variants surface from storage, I/O, configuration and the
/// aggregate invariant check.
#[derive(Debug, Error)]
pub enum DxError {
    /// An I/O or storage error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An external service call failed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Input data is malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is malformed or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another handle kept the cache database locked past the lock timeout.
    #[error("Cache database is locked: {0}")]
    CacheLocked(String),

    /// The batch worker pool could not be started.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// A batch worker panicked while evaluating its chunk.
    #[error("Worker {0} panicked")]
    WorkerPanicked(usize),

    /// Rank buckets do not add up to the number of cases.
    #[error("Invariant violation: rank buckets sum to {bucketed} but {cases} cases were processed")]
    InvariantViolation { bucketed: u64, cases: u64 },
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_candidates_become_sentinel() {
        let result = GroundingResult::new("Unknown thing", Vec::new());
        assert_eq!(result.candidates, vec![Candidate::not_found()]);
        assert!(result.is_ungrounded());
    }

    #[test]
    fn match_score_ordering_and_values() {
        assert!(MatchScore::Miss < MatchScore::Partial);
        assert!(MatchScore::Partial < MatchScore::Full);
        assert!(!MatchScore::Miss.is_correct());
        assert!(MatchScore::Partial.is_correct());
        assert_eq!(MatchScore::Full.value(), 1.0);
    }

    #[test]
    fn case_summary_uses_minimum_correct_rank() {
        let scored = vec![
            ScoredCandidate::new(1, "MONDO:1", MatchScore::Miss),
            ScoredCandidate::new(3, "MONDO:3", MatchScore::Full),
            ScoredCandidate::new(2, "MONDO:2", MatchScore::Partial),
            ScoredCandidate::new(4, SENTINEL_ID, MatchScore::Miss),
        ];
        let summary = CaseSummary::from_scored(&scored);
        assert_eq!(summary.correct_rank, Some(2));
        assert!(summary.grounding_failure);
    }

    #[test]
    fn blank_gold_id_is_not_usable() {
        let response = RawResponse {
            case_id: "PMID_1".to_string(),
            free_text: "1. A".to_string(),
            gold: Some(Gold::new("  ", "")),
        };
        assert!(response.usable_gold().is_none());
    }
}
