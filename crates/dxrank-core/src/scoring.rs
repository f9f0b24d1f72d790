//! # Scoring Engine
//!
//! Compares a grounded identifier with a gold identifier through ontology
//! relations:
//!
//! | Relation                                            | Score          |
//! |-----------------------------------------------------|----------------|
//! | sentinel or namespace outside `candidate_prefixes`  | `Miss`         |
//! | identical ids                                       | `Full`         |
//! | gold is an exact mapping of the grounded term       | `Full`         |
//! | grouping ancestor equals or maps to a grouping gold | `Full`         |
//! | broader ancestor equals or maps to gold (Tiered)    | `Partial`      |
//! | otherwise                                           | `Miss`         |
//!
//! Mapping lookups and pairwise scores are memoized through [`Memo`]. Gateway
//! failures score `Miss` and are never written to the cache.

use crate::cache::{CacheInfo, Instrumented, KeyValueStore, Memo};
use crate::config::{ScoringConfig, ScoringPolicy};
use crate::gateway::{GatewayError, OntologyGateway, namespace_of};
use crate::types::{Gold, GroundingResult, MatchScore, SENTINEL_ID, ScoredCandidate};
use std::sync::Arc;

/// Memo namespace for exact-mapping lookups.
pub const MAPPINGS_NAMESPACE: &str = "exact_mappings";

/// Memo namespace for pairwise scores.
pub const SCORES_NAMESPACE: &str = "score_grounded_result";

/// Hit/miss counters of both memo tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoringCacheInfo {
    pub mappings: CacheInfo,
    pub scores: CacheInfo,
}

impl ScoringCacheInfo {
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            mappings: self.mappings.merge(other.mappings),
            scores: self.scores.merge(other.scores),
        }
    }
}

/// Scores grounded ids against gold ids.
///
/// One `Scorer` per worker: it owns its hit/miss counters while the stores
/// underneath are shared.
pub struct Scorer {
    ontology: Arc<dyn OntologyGateway>,
    config: ScoringConfig,
    mappings: Memo<Vec<String>>,
    scores: Memo<MatchScore>,
    mapping_stats: Arc<Instrumented>,
    score_stats: Arc<Instrumented>,
}

impl Scorer {
    pub fn new(
        ontology: Arc<dyn OntologyGateway>,
        config: ScoringConfig,
        mapping_store: Arc<dyn KeyValueStore>,
        score_store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let mapping_stats = Arc::new(Instrumented::new(mapping_store));
        let score_stats = Arc::new(Instrumented::new(score_store));
        Self {
            ontology,
            config,
            mappings: Memo::new(MAPPINGS_NAMESPACE, mapping_stats.clone()),
            scores: Memo::new(SCORES_NAMESPACE, score_stats.clone()),
            mapping_stats,
            score_stats,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score one grounded id against the gold id.
    #[must_use]
    pub fn score_pair(&self, grounded_id: &str, gold_id: &str) -> MatchScore {
        if grounded_id == SENTINEL_ID || !self.config.is_candidate(grounded_id) {
            return MatchScore::Miss;
        }

        let args = (&self.config, grounded_id, gold_id);
        match self
            .scores
            .get_or_compute(&args, || self.compute(grounded_id, gold_id))
        {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!(
                    grounded_id,
                    gold_id,
                    kind = %e.kind,
                    "scoring lookup failed, scoring as miss: {}",
                    e.message
                );
                MatchScore::Miss
            }
        }
    }

    /// Score every candidate of every line; ranks follow line order.
    #[must_use]
    pub fn score_case(&self, grounding: &[GroundingResult], gold: &Gold) -> Vec<ScoredCandidate> {
        grounding
            .iter()
            .enumerate()
            .flat_map(|(index, line)| {
                line.candidates.iter().map(move |candidate| {
                    let score = self.score_pair(&candidate.id, &gold.disease_id);
                    ScoredCandidate::new(index + 1, candidate.id.as_str(), score)
                })
            })
            .collect()
    }

    #[must_use]
    pub fn cache_info(&self) -> ScoringCacheInfo {
        ScoringCacheInfo {
            mappings: self.mapping_stats.info(),
            scores: self.score_stats.info(),
        }
    }

    // -------------------------------------------------------------------------
    // RELATIONS
    // -------------------------------------------------------------------------

    fn compute(&self, grounded_id: &str, gold_id: &str) -> Result<MatchScore, GatewayError> {
        if grounded_id == gold_id {
            return Ok(MatchScore::Full);
        }
        let gold_namespace = namespace_of(gold_id);
        if self.maps_to(grounded_id, gold_id, gold_namespace)? {
            return Ok(MatchScore::Full);
        }

        let is_grouping = self
            .config
            .grouping_namespaces
            .iter()
            .any(|ns| ns == gold_namespace);
        if is_grouping
            && self.any_ancestor_matches(grounded_id, gold_id, &self.config.grouping_predicates)?
        {
            return Ok(MatchScore::Full);
        }

        if self.config.policy == ScoringPolicy::Tiered
            && self.any_ancestor_matches(grounded_id, gold_id, &self.config.subsumption_predicates)?
        {
            return Ok(MatchScore::Partial);
        }

        Ok(MatchScore::Miss)
    }

    fn any_ancestor_matches(
        &self,
        grounded_id: &str,
        gold_id: &str,
        predicates: &[String],
    ) -> Result<bool, GatewayError> {
        let gold_namespace = namespace_of(gold_id);
        for ancestor in self.ontology.ancestors(grounded_id, predicates)? {
            if ancestor == gold_id || self.maps_to(&ancestor, gold_id, gold_namespace)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn maps_to(&self, term: &str, gold_id: &str, namespace: &str) -> Result<bool, GatewayError> {
        let mapped = self.mappings.get_or_compute(&(term, namespace), || {
            self.ontology.exact_mappings(term, namespace)
        })?;
        Ok(mapped.iter().any(|id| id == gold_id))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::ontology::InMemoryOntology;
    use crate::types::Candidate;

    const IS_A: &str = "rdfs:subClassOf";

    fn ontology() -> Arc<dyn OntologyGateway> {
        let mut ontology = InMemoryOntology::new();
        ontology
            .add_term("MONDO:0007947", "Marfan syndrome")
            .add_term("MONDO:0007948", "Marfan syndrome type 2")
            .add_term("MONDO:0019391", "Fanconi anemia")
            .add_term("MONDO:0009215", "Fanconi anemia group A")
            .add_edge("MONDO:0007948", IS_A, "MONDO:0007947")
            .add_edge("MONDO:0009215", IS_A, "MONDO:0019391")
            .add_mapping("MONDO:0007947", "OMIM:154700")
            .add_mapping("MONDO:0019391", "OMIMPS:227650");
        Arc::new(ontology)
    }

    fn scorer(policy: ScoringPolicy) -> Scorer {
        let config = ScoringConfig {
            policy,
            ..ScoringConfig::default()
        };
        Scorer::new(
            ontology(),
            config,
            Arc::new(MemoryStore::new(64)),
            Arc::new(MemoryStore::new(64)),
        )
    }

    #[test]
    fn sentinel_and_foreign_namespaces_miss() {
        let scorer = scorer(ScoringPolicy::Tiered);
        assert_eq!(scorer.score_pair(SENTINEL_ID, "OMIM:154700"), MatchScore::Miss);
        assert_eq!(scorer.score_pair("HP:0001166", "HP:0001166"), MatchScore::Miss);
    }

    #[test]
    fn identity_and_exact_mapping_are_full() {
        let scorer = scorer(ScoringPolicy::Tiered);
        assert_eq!(
            scorer.score_pair("MONDO:0007947", "MONDO:0007947"),
            MatchScore::Full
        );
        assert_eq!(
            scorer.score_pair("MONDO:0007947", "OMIM:154700"),
            MatchScore::Full
        );
        assert_eq!(
            scorer.score_pair("MONDO:0019391", "OMIM:154700"),
            MatchScore::Miss
        );
    }

    #[test]
    fn grouping_gold_matches_through_ancestor() {
        let scorer = scorer(ScoringPolicy::Binary);
        assert_eq!(
            scorer.score_pair("MONDO:0009215", "OMIMPS:227650"),
            MatchScore::Full
        );
    }

    #[test]
    fn more_specific_prediction_is_partial_only_when_tiered() {
        let tiered = scorer(ScoringPolicy::Tiered);
        assert_eq!(
            tiered.score_pair("MONDO:0007948", "OMIM:154700"),
            MatchScore::Partial
        );

        let binary = scorer(ScoringPolicy::Binary);
        assert_eq!(
            binary.score_pair("MONDO:0007948", "OMIM:154700"),
            MatchScore::Miss
        );
    }

    #[test]
    fn repeated_pair_hits_score_cache() {
        let scorer = scorer(ScoringPolicy::Tiered);
        let _ = scorer.score_pair("MONDO:0007947", "OMIM:154700");
        let _ = scorer.score_pair("MONDO:0007947", "OMIM:154700");
        let info = scorer.cache_info();
        assert_eq!(info.scores.hits, 1);
        assert_eq!(info.scores.misses, 1);
        assert_eq!(info.mappings.misses, 1);
    }

    #[test]
    fn score_case_keeps_line_ranks() {
        let scorer = scorer(ScoringPolicy::Tiered);
        let grounding = vec![
            GroundingResult::new("Fanconi anemia", vec![Candidate::new("MONDO:0019391", "FA")]),
            GroundingResult::new(
                "Marfan",
                vec![
                    Candidate::new("MONDO:0007947", "Marfan syndrome"),
                    Candidate::new("MONDO:0007948", "Marfan syndrome type 2"),
                ],
            ),
            GroundingResult::new("?", Vec::new()),
        ];
        let scored = scorer.score_case(&grounding, &Gold::new("OMIM:154700", "Marfan"));

        let ranks: Vec<_> = scored.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 2, 2, 3]);
        assert!(!scored[0].is_correct);
        assert_eq!(scored[1].grounded_score, 1.0);
        assert_eq!(scored[2].grounded_score, 0.5);
        assert_eq!(scored[3].grounded_id, SENTINEL_ID);
    }
}
