//! # Batch Pipeline
//!
//! Runs grounding and scoring over a batch of model responses on a fixed-size
//! rayon pool.
//!
//! The batch is cut into one contiguous chunk per worker. Each chunk builds
//! its own [`Evaluator`] through the caller's factory, so engines and cache
//! counters are per chunk while gateway and store handles are shared.
//! Output order follows input order.

use crate::grounding::Grounder;
use crate::scoring::{Scorer, ScoringCacheInfo};
use crate::types::{DxError, RawResponse, ScoredCase};
use rayon::prelude::*;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

/// Grounds and scores single responses.
pub struct Evaluator {
    grounder: Grounder,
    scorer: Scorer,
}

impl Evaluator {
    pub fn new(grounder: Grounder, scorer: Scorer) -> Self {
        Self { grounder, scorer }
    }

    #[must_use]
    pub fn grounder(&self) -> &Grounder {
        &self.grounder
    }

    /// Ground and score one response.
    ///
    /// Returns `None` for a response without a usable gold id.
    #[must_use]
    pub fn evaluate(&self, response: &RawResponse) -> Option<ScoredCase> {
        let Some(gold) = response.usable_gold() else {
            tracing::warn!(case_id = %response.case_id, "missing gold identifier, skipping case");
            return None;
        };

        let grounding = self.grounder.ground_text(&response.free_text);
        let scored = self.scorer.score_case(&grounding, gold);
        tracing::debug!(
            case_id = %response.case_id,
            lines = grounding.len(),
            scored = scored.len(),
            "evaluated case"
        );

        Some(ScoredCase {
            case_id: response.case_id.clone(),
            gold: gold.clone(),
            grounding,
            scored,
        })
    }

    #[must_use]
    pub fn cache_info(&self) -> ScoringCacheInfo {
        self.scorer.cache_info()
    }
}

/// Result of a batch run.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Scored cases in input order.
    pub cases: Vec<ScoredCase>,
    /// Responses skipped for missing gold.
    pub skipped: usize,
    /// Cache counters summed over all workers.
    pub cache: ScoringCacheInfo,
}

/// Worker count used when none is configured.
#[must_use]
pub fn default_workers() -> usize {
    thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Evaluate `responses` on a pool of `workers` threads.
///
/// `make_evaluator` is called once per chunk with the chunk index.
pub fn run_batch<F>(
    responses: &[RawResponse],
    workers: usize,
    make_evaluator: F,
) -> Result<BatchOutcome, DxError>
where
    F: Fn(usize) -> Evaluator + Sync,
{
    if responses.is_empty() {
        return Ok(BatchOutcome::default());
    }

    let workers = workers.clamp(1, responses.len());
    let chunk_size = responses.len().div_ceil(workers);
    tracing::info!(
        responses = responses.len(),
        workers,
        chunk_size,
        "starting batch"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("dxrank-worker-{index}"))
        .build()
        .map_err(|e| DxError::WorkerPool(e.to_string()))?;

    let results = pool.install(|| {
        responses
            .par_chunks(chunk_size)
            .enumerate()
            .map(|(index, chunk)| {
                panic::catch_unwind(AssertUnwindSafe(|| {
                    let evaluator = make_evaluator(index);
                    let cases: Vec<Option<ScoredCase>> =
                        chunk.iter().map(|r| evaluator.evaluate(r)).collect();
                    (cases, evaluator.cache_info())
                }))
                .map_err(|_| DxError::WorkerPanicked(index))
            })
            .collect::<Result<Vec<_>, _>>()
    })?;

    let mut outcome = BatchOutcome::default();
    for (cases, info) in results {
        outcome.cache = outcome.cache.merge(info);
        for case in cases {
            match case {
                Some(case) => outcome.cases.push(case),
                None => outcome.skipped += 1,
            }
        }
    }

    tracing::info!(
        cases = outcome.cases.len(),
        skipped = outcome.skipped,
        "batch complete"
    );
    Ok(outcome)
}

// =============================================================================
// TESTS
// =============================================================================
