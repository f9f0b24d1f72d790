//! # In-Memory Ontology
//!
//! A self-contained [`OntologyGateway`] over an ontology snapshot held in
//! memory: term labels and synonyms, typed parent edges, and exact mappings
//! to external namespaces.
//!
//! Used for offline runs (the app loads a JSON snapshot) and as the
//! deterministic gateway in tests. All data structures use `BTreeMap` so
//! every query returns results in a stable order.

use crate::gateway::{Annotation, GatewayError, OntologyGateway};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Upper bound on ancestor traversal depth.
pub const MAX_TRAVERSAL_DEPTH: usize = 100;

/// Mapping predicate treated as an exact match.
pub const EXACT_MATCH: &str = "skos:exactMatch";

// =============================================================================
// SNAPSHOT FORMAT
// =============================================================================

/// A term with its primary label and synonyms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRecord {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

/// A directed `subject -predicate-> object` edge (object is the parent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

/// A cross-reference from an ontology term to an external identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub subject: String,
    pub object: String,
    #[serde(default = "default_mapping_predicate")]
    pub predicate: String,
}

fn default_mapping_predicate() -> String {
    EXACT_MATCH.to_string()
}

/// Serializable form of an [`InMemoryOntology`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologySnapshot {
    #[serde(default)]
    pub terms: Vec<TermRecord>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
    #[serde(default)]
    pub mappings: Vec<MappingRecord>,
}

// =============================================================================
// ONTOLOGY
// =============================================================================

/// Ontology held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOntology {
    labels: BTreeMap<String, String>,
    /// Normalized label or synonym -> term ids.
    lexicon: BTreeMap<String, BTreeSet<String>>,
    /// Child -> (predicate, parent).
    parents: BTreeMap<String, Vec<(String, String)>>,
    /// Term -> exact-match external ids.
    mappings: BTreeMap<String, BTreeSet<String>>,
}

impl InMemoryOntology {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a term and index its label.
    pub fn add_term(&mut self, id: &str, label: &str) -> &mut Self {
        self.labels.insert(id.to_string(), label.to_string());
        self.index_text(id, label);
        self
    }

    pub fn add_synonym(&mut self, id: &str, synonym: &str) -> &mut Self {
        self.index_text(id, synonym);
        self
    }

    /// Add a `child -predicate-> parent` edge.
    pub fn add_edge(&mut self, child: &str, predicate: &str, parent: &str) -> &mut Self {
        let edges = self.parents.entry(child.to_string()).or_default();
        let edge = (predicate.to_string(), parent.to_string());
        if !edges.contains(&edge) {
            edges.push(edge);
        }
        self
    }

    /// Add an exact-match mapping from `term` to an external id.
    pub fn add_mapping(&mut self, term: &str, external_id: &str) -> &mut Self {
        self.mappings
            .entry(term.to_string())
            .or_default()
            .insert(external_id.to_string());
        self
    }

    #[must_use]
    pub fn term_count(&self) -> usize {
        self.labels.len()
    }

    /// Build an ontology from a snapshot. Non-exact mappings are ignored.
    #[must_use]
    pub fn from_snapshot(snapshot: &OntologySnapshot) -> Self {
        let mut ontology = Self::new();
        for term in &snapshot.terms {
            ontology.add_term(&term.id, &term.label);
            for synonym in &term.synonyms {
                ontology.add_synonym(&term.id, synonym);
            }
        }
        for edge in &snapshot.edges {
            ontology.add_edge(&edge.subject, &edge.predicate, &edge.object);
        }
        for mapping in snapshot
            .mappings
            .iter()
            .filter(|m| m.predicate == EXACT_MATCH)
        {
            ontology.add_mapping(&mapping.subject, &mapping.object);
        }
        ontology
    }

    fn index_text(&mut self, id: &str, text: &str) {
        let key = normalize(text);
        if !key.is_empty() {
            self.lexicon.entry(key).or_default().insert(id.to_string());
        }
    }

    fn annotation(&self, id: &str) -> Annotation {
        let label = self.labels.get(id).cloned().unwrap_or_default();
        Annotation::new(id, label)
    }
}

/// Lower-case, collapse whitespace, drop trailing punctuation.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', ',', ';', ':'])
        .to_lowercase()
}

/// Whether `needle` occurs in `haystack` delimited by non-alphanumerics.
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

// =============================================================================
// GATEWAY IMPLEMENTATION
// =============================================================================

impl OntologyGateway for InMemoryOntology {
    fn annotate_text(
        &self,
        text: &str,
        exact_match: bool,
    ) -> Result<Vec<Annotation>, GatewayError> {
        let query = normalize(text);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let ids: BTreeSet<&String> = if exact_match {
            self.lexicon
                .get(&query)
                .map(|ids| ids.iter().collect())
                .unwrap_or_default()
        } else {
            self.lexicon
                .iter()
                .filter(|(phrase, _)| contains_phrase(&query, phrase))
                .flat_map(|(_, ids)| ids.iter())
                .collect()
        };

        Ok(ids.into_iter().map(|id| self.annotation(id)).collect())
    }

    fn ancestors(&self, id: &str, predicates: &[String]) -> Result<Vec<String>, GatewayError> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        let mut ancestors = Vec::new();

        queue.push_back((id.to_string(), 0usize));
        visited.insert(id.to_string());

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= MAX_TRAVERSAL_DEPTH {
                continue;
            }
            let Some(edges) = self.parents.get(&current) else {
                continue;
            };
            for (predicate, parent) in edges {
                if !predicates.is_empty() && !predicates.iter().any(|p| p == predicate) {
                    continue;
                }
                if visited.insert(parent.clone()) {
                    ancestors.push(parent.clone());
                    queue.push_back((parent.clone(), depth + 1));
                }
            }
        }

        Ok(ancestors)
    }

    fn exact_mappings(
        &self,
        id: &str,
        source_namespace: &str,
    ) -> Result<Vec<String>, GatewayError> {
        let prefix = format!("{source_namespace}:");
        Ok(self
            .mappings
            .get(id)
            .map(|ids| {
                ids.iter()
                    .filter(|external| external.starts_with(&prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn label(&self, id: &str) -> Result<Option<String>, GatewayError> {
        Ok(self.labels.get(id).cloned())
    }
}

// =============================================================================
// TESTS
// =============================================================================
