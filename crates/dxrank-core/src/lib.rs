//! # dxrank-core
//!
//! The grounding and scoring engine for dxrank - THE LOGIC.
//!
//! This crate benchmarks free-text LLM differential diagnoses against gold
//! disease identifiers:
//!
//! ```text
//! raw text -> segmenter -> grounding -> scoring (memoized) -> summary
//! ```
//!
//! ## Architectural Constraints
//!
//! - Pure Rust, synchronous, NO network dependencies
//! - External services (ontology backend, semantic search) are traits;
//!   adapters live in the app crate
//! - Deterministic: ordered collections and stable cache keys
//! - A failing diagnosis degrades to a sentinel and never aborts the batch

// =============================================================================
// MODULES
// =============================================================================

pub mod cache;
pub mod config;
pub mod gateway;
pub mod grounding;
pub mod ontology;
pub mod pipeline;
pub mod retry;
pub mod scoring;
pub mod segmenter;
pub mod summary;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Candidate, CaseSummary, DiagnosisLine, DxError, Gold, GroundingResult, MatchScore,
    RawResponse, SENTINEL_ID, ScoredCandidate, ScoredCase,
};

// =============================================================================
// RE-EXPORTS: Engines
// =============================================================================

pub use cache::{CacheInfo, CacheKey, Instrumented, KeyValueStore, Memo, MemoryStore, RedbStore};
pub use config::{CacheConfig, GroundingConfig, ScoringConfig, ScoringPolicy};
pub use gateway::{
    Annotation, ErrorKind, GatewayError, OntologyGateway, SearchHit, SemanticStore, namespace_of,
};
pub use grounding::Grounder;
pub use ontology::{InMemoryOntology, OntologySnapshot};
pub use pipeline::{BatchOutcome, Evaluator, default_workers, run_batch};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use scoring::{Scorer, ScoringCacheInfo};
pub use summary::{RankSummary, TOPN_HEADER, TSV_HEADER, summarize};
