//! # Grounding Engine
//!
//! Maps a free-text diagnosis to canonical ontology identifiers.
//!
//! Two tiers, tried in order:
//! 1. Exact annotation through the [`OntologyGateway`], filtered to the
//!    allowed namespaces.
//! 2. Semantic search through the [`SemanticStore`], filtered by distance and
//!    limited in count. Transient failures are retried with backoff.
//!
//! Grounding never fails: when nothing matches the result carries the
//! "no grounding found" sentinel, and when the fallback tier errors out it
//! carries the "grounding failed" sentinel.

use crate::config::GroundingConfig;
use crate::gateway::{GatewayError, OntologyGateway, SearchHit, SemanticStore};
use crate::retry::{Sleeper, ThreadSleeper};
use crate::segmenter;
use crate::types::{Candidate, DiagnosisLine, GroundingResult};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Outcome of the fallback tier before sentinel substitution.
enum Fallback {
    Found(Vec<Candidate>),
    Failed,
}

/// Two-tier grounding over injected gateway handles.
pub struct Grounder {
    ontology: Arc<dyn OntologyGateway>,
    search: Option<Arc<dyn SemanticStore>>,
    config: GroundingConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl Grounder {
    /// Grounder with the exact-annotation tier only.
    pub fn new(ontology: Arc<dyn OntologyGateway>, config: GroundingConfig) -> Self {
        Self {
            ontology,
            search: None,
            config,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Attach a semantic store for the fallback tier.
    #[must_use]
    pub fn with_semantic_store(mut self, search: Arc<dyn SemanticStore>) -> Self {
        self.search = Some(search);
        self
    }

    /// Replace the backoff sleeper.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn config(&self) -> &GroundingConfig {
        &self.config
    }

    /// Ground one diagnosis string.
    #[must_use]
    pub fn ground(&self, diagnosis: &str) -> GroundingResult {
        let exact = self.exact_tier(diagnosis);
        if !exact.is_empty() {
            tracing::debug!(diagnosis, found = exact.len(), "grounded by exact annotation");
            return GroundingResult::new(diagnosis, exact);
        }

        match self.fallback_tier(diagnosis) {
            Some(Fallback::Found(candidates)) => {
                tracing::debug!(
                    diagnosis,
                    found = candidates.len(),
                    "grounded by semantic search"
                );
                GroundingResult::new(diagnosis, candidates)
            }
            Some(Fallback::Failed) => {
                GroundingResult::new(diagnosis, vec![Candidate::failed()])
            }
            None => GroundingResult::new(diagnosis, Vec::new()),
        }
    }

    /// Ground already segmented lines, keeping their order.
    #[must_use]
    pub fn ground_lines(&self, lines: &[DiagnosisLine]) -> Vec<GroundingResult> {
        lines.iter().map(|line| self.ground(&line.text)).collect()
    }

    /// Segment a whole model answer and ground every line.
    ///
    /// With `require_enumeration`, text before the first `"1."` is discarded
    /// and an answer without an enumerated list grounds to nothing.
    #[must_use]
    pub fn ground_text(&self, free_text: &str) -> Vec<GroundingResult> {
        let body = if self.config.require_enumeration {
            segmenter::split_from_first_item(free_text)
        } else {
            free_text
        };
        let lines = segmenter::segment(&segmenter::strip_header(body));
        self.ground_lines(&lines)
    }

    // -------------------------------------------------------------------------
    // TIERS
    // -------------------------------------------------------------------------

    fn exact_tier(&self, diagnosis: &str) -> Vec<Candidate> {
        let annotations = match self.ontology.annotate_text(diagnosis, true) {
            Ok(annotations) => annotations,
            Err(e) => {
                tracing::warn!(diagnosis, "exact annotation failed: {}", e);
                return Vec::new();
            }
        };

        let mut seen = BTreeSet::new();
        annotations
            .into_iter()
            .filter(|a| self.config.is_allowed(&a.object_id))
            .map(|a| Candidate::new(a.object_id, a.object_label))
            .filter(|candidate| seen.insert(candidate.clone()))
            .collect()
    }

    /// `None` when the fallback tier is disabled or has no store.
    fn fallback_tier(&self, diagnosis: &str) -> Option<Fallback> {
        if !self.config.fallback_enabled {
            return None;
        }
        let search = self.search.as_ref()?;
        let policy = self.config.retry_policy();

        let hits = policy.run(self.sleeper.as_ref(), |attempt| {
            tracing::debug!(diagnosis, attempt, "semantic search");
            search.search(diagnosis, &self.config.collection)
        });

        Some(match hits {
            Ok(hits) => Fallback::Found(self.select_hits(hits)),
            Err(e) => {
                log_fallback_failure(diagnosis, &e);
                Fallback::Failed
            }
        })
    }

    fn select_hits(&self, hits: Vec<SearchHit>) -> Vec<Candidate> {
        hits.into_iter()
            .filter(|hit| hit.distance <= self.config.relevance_threshold)
            .take(self.config.limit)
            .filter_map(|hit| match (hit.original_id, hit.label) {
                (Some(id), Some(label)) => Some(Candidate::new(id, label)),
                _ => None,
            })
            .collect()
    }
}

fn log_fallback_failure(diagnosis: &str, error: &GatewayError) {
    tracing::warn!(
        diagnosis,
        kind = %error.kind,
        "semantic search failed, marking grounding as failed: {}",
        error.message
    );
}

// =============================================================================
// TESTS
// =============================================================================
