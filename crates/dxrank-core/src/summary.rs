//! # Rank Aggregation
//!
//! Folds scored cases into per-run rank buckets: how many cases had their
//! first correct diagnosis at rank 1, 2, ... 10, beyond 10, or not at all.
//!
//! Every case lands in exactly one bucket, so
//! `n1 + ... + n10 + n10p + nf == cases` always holds for a summary built
//! here. [`RankSummary::verify`] checks it before a summary is written out.
//!
//! Two tables come out of a summary: the rank table ([`TSV_HEADER`]) and the
//! top-n table ([`TOPN_HEADER`]) with mean reciprocal rank and top-k rates.

use crate::types::{CaseSummary, DxError, ScoredCase};
use std::collections::BTreeMap;

/// Number of explicit rank buckets.
pub const RANK_BUCKETS: usize = 10;

/// Ranks reported as top-k fractions.
pub const TOP_K: [usize; 4] = [1, 3, 5, 10];

/// Rank-bucket counts for one run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RankSummary {
    pub run: String,
    /// `top[k - 1]` counts cases first correct at rank `k`.
    pub top: [u64; RANK_BUCKETS],
    /// First correct beyond rank 10.
    pub n10p: u64,
    /// Not found.
    pub nf: u64,
    /// Not found and at least one grounding failure.
    pub gf: u64,
    /// Cases with a non-empty scored list.
    pub nc: u64,
    /// Cases with at least one grounding failure.
    pub tgf: u64,
    /// Scored candidates across all cases.
    pub items: u64,
    /// All cases folded in.
    pub cases: u64,
    /// Found rank -> case count, for reciprocal-rank reporting.
    found_ranks: BTreeMap<usize, u64>,
}

impl RankSummary {
    #[must_use]
    pub fn new(run: impl Into<String>) -> Self {
        Self {
            run: run.into(),
            ..Self::default()
        }
    }

    /// Fold one case into the buckets.
    pub fn add(&mut self, summary: CaseSummary, items: usize) {
        self.cases += 1;
        self.items += items as u64;
        if items > 0 {
            self.nc += 1;
        }
        if summary.grounding_failure {
            self.tgf += 1;
        }

        match summary.correct_rank {
            Some(rank) if (1..=RANK_BUCKETS).contains(&rank) => self.top[rank - 1] += 1,
            Some(_) => self.n10p += 1,
            None => {
                self.nf += 1;
                if summary.grounding_failure {
                    self.gf += 1;
                }
            }
        }
        if let Some(rank) = summary.correct_rank {
            *self.found_ranks.entry(rank).or_insert(0) += 1;
        }
    }

    /// Sum of all buckets.
    #[must_use]
    pub fn bucketed(&self) -> u64 {
        self.top.iter().sum::<u64>() + self.n10p + self.nf
    }

    /// Check that every case sits in exactly one bucket.
    pub fn verify(&self) -> Result<(), DxError> {
        let bucketed = self.bucketed();
        if bucketed == self.cases {
            Ok(())
        } else {
            Err(DxError::InvariantViolation {
                bucketed,
                cases: self.cases,
            })
        }
    }

    /// Cases first correct at rank `k` or better.
    #[must_use]
    pub fn found_within(&self, k: usize) -> u64 {
        self.top.iter().take(k.min(RANK_BUCKETS)).sum()
    }

    /// Fraction of cases first correct at rank `k` or better.
    #[must_use]
    #[allow(clippy::float_arithmetic)]
    pub fn top_k(&self, k: usize) -> f64 {
        if self.cases == 0 {
            return 0.0;
        }
        self.found_within(k) as f64 / self.cases as f64
    }

    /// Fraction of cases with no correct candidate.
    #[must_use]
    #[allow(clippy::float_arithmetic)]
    pub fn not_found_fraction(&self) -> f64 {
        if self.cases == 0 {
            return 0.0;
        }
        self.nf as f64 / self.cases as f64
    }

    /// Mean reciprocal rank; not-found cases contribute zero.
    #[must_use]
    #[allow(clippy::float_arithmetic)]
    pub fn mrr(&self) -> f64 {
        if self.cases == 0 {
            return 0.0;
        }
        let total: f64 = self
            .found_ranks
            .iter()
            .map(|(&rank, &count)| count as f64 / rank as f64)
            .sum();
        total / self.cases as f64
    }

    /// One tab-separated row matching [`TSV_HEADER`].
    #[must_use]
    pub fn to_tsv_row(&self) -> String {
        let mut fields = vec![self.run.clone()];
        fields.extend(self.top.iter().map(u64::to_string));
        fields.extend(
            [self.n10p, self.nf, self.gf, self.nc, self.tgf, self.items]
                .iter()
                .map(u64::to_string),
        );
        fields.join("\t")
    }

    /// One tab-separated row matching [`TOPN_HEADER`].
    #[must_use]
    pub fn to_topn_row(&self) -> String {
        let mut fields = vec![self.run.clone(), format!("{:.4}", self.mrr())];
        fields.extend(TOP_K.iter().map(|&k| format!("{:.4}", self.top_k(k))));
        fields.push(format!("{:.4}", self.not_found_fraction()));
        fields.join("\t")
    }
}

/// Column names of the rank table.
pub const TSV_HEADER: &str = "run\tn1\tn2\tn3\tn4\tn5\tn6\tn7\tn8\tn9\tn10\tn10p\tnf\t\
grounding_failed\tnum_cases\ttotal_grounding_failures\titems_processed";

/// Column names of the top-n table.
pub const TOPN_HEADER: &str = "run\tmrr\ttop1\ttop3\ttop5\ttop10\tnot_found";

/// Build and verify the summary of one run.
pub fn summarize(run: &str, cases: &[ScoredCase]) -> Result<RankSummary, DxError> {
    let mut summary = RankSummary::new(run);
    for case in cases {
        summary.add(case.summary(), case.scored.len());
    }
    summary.verify()?;
    tracing::info!(
        run,
        cases = summary.cases,
        n1 = summary.top[0],
        nf = summary.nf,
        "summarized run"
    );
    Ok(summary)
}

fn render(header: &str, rows: impl Iterator<Item = String>) -> String {
    let mut out = String::from(header);
    out.push('\n');
    for row in rows {
        out.push_str(&row);
        out.push('\n');
    }
    out
}

/// Render the rank table for several runs.
#[must_use]
pub fn to_tsv(summaries: &[RankSummary]) -> String {
    render(TSV_HEADER, summaries.iter().map(RankSummary::to_tsv_row))
}

/// Render the top-n table for several runs.
#[must_use]
pub fn to_topn_tsv(summaries: &[RankSummary]) -> String {
    render(TOPN_HEADER, summaries.iter().map(RankSummary::to_topn_row))
}

// =============================================================================
// TESTS
// =============================================================================
