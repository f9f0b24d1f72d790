//! # File I/O
//!
//! JSONL input and output, the summary tables, and ontology snapshots.
//!
//! Output files are never overwritten in place: an existing file is first
//! renamed to `old_<name>` (replacing any older backup).

use dxrank_core::summary::{to_topn_tsv, to_tsv};
use dxrank_core::{DxError, OntologySnapshot, RankSummary, RawResponse, ScoredCase};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Maximum size of an input file (1 GB).
const MAX_INPUT_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Prefix given to rotated output files.
pub const ROTATED_PREFIX: &str = "old_";

/// Validate file size before reading.
fn validate_file_size(path: &Path) -> Result<(), DxError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        DxError::IoError(format!("Cannot read '{}': {}", path.display(), e))
    })?;
    if metadata.len() > MAX_INPUT_FILE_SIZE {
        return Err(DxError::InvalidInput(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_INPUT_FILE_SIZE
        )));
    }
    Ok(())
}

// =============================================================================
// JSONL
// =============================================================================

/// Read one JSON record per non-blank line.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, DxError> {
    validate_file_size(path)?;
    let file = File::open(path)
        .map_err(|e| DxError::IoError(format!("Cannot open '{}': {}", path.display(), e)))?;

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| DxError::IoError(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            DxError::DeserializationError(format!(
                "{}:{}: {}",
                path.display(),
                index + 1,
                e
            ))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Write one JSON record per line, rotating an existing file first.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<(), DxError> {
    rotate_existing(path)?;
    let file = File::create(path)
        .map_err(|e| DxError::IoError(format!("Cannot create '{}': {}", path.display(), e)))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)
            .map_err(|e| DxError::SerializationError(e.to_string()))?;
        writer
            .write_all(b"\n")
            .map_err(|e| DxError::IoError(e.to_string()))?;
    }
    writer.flush().map_err(|e| DxError::IoError(e.to_string()))
}

pub fn read_responses(path: &Path) -> Result<Vec<RawResponse>, DxError> {
    let responses = read_jsonl(path)?;
    tracing::info!(path = %path.display(), count = responses.len(), "responses loaded");
    Ok(responses)
}

pub fn read_scored(path: &Path) -> Result<Vec<ScoredCase>, DxError> {
    read_jsonl(path)
}

// =============================================================================
// SUMMARY TABLES
// =============================================================================

/// Write the rank table to `path` and the top-n table next to it.
pub fn write_summary(path: &Path, summaries: &[RankSummary]) -> Result<(), DxError> {
    write_table(path, &to_tsv(summaries))?;
    write_table(&topn_path(path), &to_topn_tsv(summaries))
}

fn write_table(path: &Path, table: &str) -> Result<(), DxError> {
    rotate_existing(path)?;
    std::fs::write(path, table)
        .map_err(|e| DxError::IoError(format!("Cannot write '{}': {}", path.display(), e)))
}

// =============================================================================
// ONTOLOGY SNAPSHOT
// =============================================================================

pub fn load_snapshot(path: &Path) -> Result<OntologySnapshot, DxError> {
    validate_file_size(path)?;
    let file = File::open(path)
        .map_err(|e| DxError::IoError(format!("Cannot open '{}': {}", path.display(), e)))?;
    let snapshot: OntologySnapshot = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| DxError::DeserializationError(format!("{}: {}", path.display(), e)))?;
    tracing::info!(
        path = %path.display(),
        terms = snapshot.terms.len(),
        edges = snapshot.edges.len(),
        "ontology snapshot loaded"
    );
    Ok(snapshot)
}

// =============================================================================
// ROTATION
// =============================================================================

/// Backup location for `path`.
#[must_use]
pub fn rotated_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{ROTATED_PREFIX}{name}"))
}

/// Move an existing `path` aside. Returns the backup path when one was made.
pub fn rotate_existing(path: &Path) -> Result<Option<PathBuf>, DxError> {
    if !path.exists() {
        return Ok(None);
    }
    let backup = rotated_path(path);
    std::fs::rename(path, &backup).map_err(|e| {
        DxError::IoError(format!(
            "Cannot rotate '{}' to '{}': {}",
            path.display(),
            backup.display(),
            e
        ))
    })?;
    tracing::info!(from = %path.display(), to = %backup.display(), "rotated existing output");
    Ok(Some(backup))
}

/// Run name derived from a scored file name (`gpt-4o_en_scored.jsonl` -> `gpt-4o_en`).
#[must_use]
pub fn run_name_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.strip_suffix(SCORED_SUFFIX)
        .map(str::to_string)
        .unwrap_or(stem)
}

/// Suffix of scored output file stems.
pub const SCORED_SUFFIX: &str = "_scored";

/// Scored output path for a run.
#[must_use]
pub fn scored_path(output_dir: &Path, run: &str) -> PathBuf {
    output_dir.join(format!("{run}{SCORED_SUFFIX}.jsonl"))
}

/// Suffix of rank table file stems.
pub const SUMMARY_SUFFIX: &str = "_summary";

/// Rank table path for a run.
#[must_use]
pub fn summary_path(output_dir: &Path, run: &str) -> PathBuf {
    output_dir.join(format!("{run}{SUMMARY_SUFFIX}.tsv"))
}

/// Top-n table written beside a rank table
/// (`gpt-4o_en_summary.tsv` -> `gpt-4o_en_topn.tsv`).
#[must_use]
pub fn topn_path(summary: &Path) -> PathBuf {
    let stem = summary
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = stem.strip_suffix(SUMMARY_SUFFIX).unwrap_or(&stem);
    summary.with_file_name(format!("{base}_topn.tsv"))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_responses_and_skips_blank_lines() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("responses.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"id":"PMID_1_en","response":"1. Marfan syndrome","gold":{"disease_id":"OMIM:154700","disease_name":"Marfan syndrome"}}"#,
                "\n\n",
                r#"{"id":"PMID_2_en","response":"1. X"}"#,
                "\n"
            ),
        )
        .expect("write");

        let responses = read_responses(&path).expect("read");
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].case_id, "PMID_1_en");
        assert!(responses[0].usable_gold().is_some());
        assert!(responses[1].gold.is_none());
    }

    #[test]
    fn malformed_line_reports_position() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"id\":\"a\"}\nnot json\n").expect("write");

        let error = read_jsonl::<RawResponse>(&path).expect_err("should fail");
        assert!(error.to_string().contains("bad.jsonl:2"));
    }

    #[test]
    fn writing_rotates_previous_output() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("run_summary.tsv");
        std::fs::write(&path, "previous").expect("write");

        write_summary(&path, &[RankSummary::new("run")]).expect("write summary");

        let backup = dir.path().join("old_run_summary.tsv");
        assert_eq!(std::fs::read_to_string(backup).expect("read"), "previous");
        assert!(
            std::fs::read_to_string(&path)
                .expect("read")
                .starts_with("run\tn1\t")
        );
    }

    #[test]
    fn summary_writes_separate_topn_table() {
        let dir = TempDir::new().expect("tempdir");
        let path = summary_path(dir.path(), "gpt-4o_en");

        write_summary(&path, &[RankSummary::new("gpt-4o_en")]).expect("write summary");

        let ranks = std::fs::read_to_string(&path).expect("ranks");
        assert_eq!(ranks.lines().next(), Some(dxrank_core::TSV_HEADER));
        let topn = std::fs::read_to_string(dir.path().join("gpt-4o_en_topn.tsv")).expect("topn");
        assert_eq!(topn.lines().next(), Some(dxrank_core::TOPN_HEADER));
        assert!(topn.lines().nth(1).expect("row").starts_with("gpt-4o_en\t"));
    }

    #[test]
    fn topn_path_follows_summary_name() {
        assert_eq!(
            topn_path(Path::new("out/run_summary.tsv")),
            Path::new("out/run_topn.tsv")
        );
        assert_eq!(topn_path(Path::new("all.tsv")), Path::new("all_topn.tsv"));
    }

    #[test]
    fn run_name_strips_scored_suffix() {
        assert_eq!(
            run_name_from_path(Path::new("out/gpt-4o_en_scored.jsonl")),
            "gpt-4o_en"
        );
        assert_eq!(run_name_from_path(Path::new("other.jsonl")), "other");
    }
}
