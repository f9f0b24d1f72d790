//! # External Service Interfaces
//!
//! The ontology backend and the semantic-search store are external
//! collaborators. The core only sees these traits; concrete adapters (HTTP
//! clients, the in-memory ontology) implement them.
//!
//! Adapters classify every failure into an [`ErrorKind`] at the boundary so
//! retry policy can dispatch on the kind instead of on message text.

use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// ERROR CLASSIFICATION
// =============================================================================

/// Coarse classification of an external-service failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Timeouts, connection failures, rate limits, unavailable backends.
    Transient,
    /// The service answered but the requested item does not exist.
    NotFound,
    /// The request or the response was malformed.
    Invalid,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::NotFound => write!(f, "not found"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// A classified external-service failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Invalid,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl std::error::Error for GatewayError {}

// =============================================================================
// ONTOLOGY GATEWAY
// =============================================================================

/// A text annotation returned by the ontology annotator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub object_id: String,
    pub object_label: String,
}

impl Annotation {
    pub fn new(object_id: impl Into<String>, object_label: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            object_label: object_label.into(),
        }
    }
}

/// Read-only access to the disease ontology.
///
/// Implementations must be shareable across worker threads.
pub trait OntologyGateway: Send + Sync {
    /// Annotate `text` with ontology terms. With `exact_match` the whole text
    /// must match a term label or synonym.
    fn annotate_text(&self, text: &str, exact_match: bool)
    -> Result<Vec<Annotation>, GatewayError>;

    /// Ancestors of `id` reachable through any of `predicates`
    /// (all predicates when empty). Does not include `id` itself.
    fn ancestors(&self, id: &str, predicates: &[String]) -> Result<Vec<String>, GatewayError>;

    /// External identifiers in `source_namespace` that `id` maps to with an
    /// exact-match mapping.
    fn exact_mappings(&self, id: &str, source_namespace: &str)
    -> Result<Vec<String>, GatewayError>;

    /// Primary label of `id`, if the term exists.
    fn label(&self, id: &str) -> Result<Option<String>, GatewayError>;
}

// =============================================================================
// SEMANTIC SEARCH STORE
// =============================================================================

/// One nearest-neighbour hit from the semantic-search store.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub original_id: Option<String>,
    pub label: Option<String>,
    pub distance: f64,
    pub metadata: BTreeMap<String, String>,
}

impl SearchHit {
    pub fn new(original_id: impl Into<String>, label: impl Into<String>, distance: f64) -> Self {
        Self {
            original_id: Some(original_id.into()),
            label: Some(label.into()),
            distance,
            metadata: BTreeMap::new(),
        }
    }
}

/// Embedding-backed nearest-neighbour search, ordered by ascending distance.
pub trait SemanticStore: Send + Sync {
    fn search(&self, query: &str, collection: &str) -> Result<Vec<SearchHit>, GatewayError>;
}

// =============================================================================
// HELPERS
// =============================================================================

/// Namespace prefix of a CURIE (`"OMIM:1234"` -> `"OMIM"`).
///
/// Identifiers without a colon are their own namespace.
#[must_use]
pub fn namespace_of(id: &str) -> &str {
    id.split_once(':').map_or(id, |(prefix, _)| prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(GatewayError::transient("timeout").is_retryable());
        assert!(!GatewayError::not_found("gone").is_retryable());
        assert!(!GatewayError::invalid("bad json").is_retryable());
    }

    #[test]
    fn namespace_extraction() {
        assert_eq!(namespace_of("OMIM:132800"), "OMIM");
        assert_eq!(namespace_of("OMIMPS:154700"), "OMIMPS");
        assert_eq!(namespace_of("N/A"), "N/A");
    }
}
