//! # dxrank CLI Module
//!
//! This module implements the CLI interface for dxrank.
//!
//! ## Available Commands
//!
//! - `evaluate` - Ground, score and summarize a response file
//! - `ground` - Ground a single diagnosis or answer and print JSON
//! - `summarize` - Rebuild the summary tables from scored files
//! - `cache-info` - Show cache file sizes
//! - `init-config` - Write a default configuration file

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use dxrank_core::{DxError, ScoringPolicy};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// dxrank - benchmark LLM differential diagnoses
///
/// Grounds free-text diagnoses to disease-ontology identifiers and scores
/// them against gold labels.
#[derive(Parser, Debug)]
#[command(name = "dxrank")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the TOML run configuration
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Values accepted by `--policy`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Full credit only for identical, equivalent or grouped diagnoses
    Binary,
    /// Also half credit for a diagnosis more specific than the gold
    Tiered,
}

impl From<PolicyArg> for ScoringPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Binary => Self::Binary,
            PolicyArg::Tiered => Self::Tiered,
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ground, score and summarize a response file
    Evaluate {
        /// JSONL response file (overrides run.response_file)
        #[arg(short, long)]
        responses: Option<PathBuf>,

        /// Output directory (overrides run.output_dir)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Run name used in output file names and the summary row
        #[arg(short = 'n', long)]
        run_name: Option<String>,

        /// Worker threads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Scoring policy (overrides scoring.policy)
        #[arg(short, long, value_enum)]
        policy: Option<PolicyArg>,

        /// Use volatile in-memory caches instead of the cache files
        #[arg(long)]
        no_cache: bool,

        /// Disable the semantic-search fallback
        #[arg(long)]
        no_fallback: bool,
    },

    /// Ground a single diagnosis (or a whole answer) and print JSON
    Ground {
        /// Diagnosis text
        text: String,

        /// Treat the text as a full model answer and segment it first
        #[arg(short, long)]
        answer: bool,
    },

    /// Rebuild the summary tables from scored JSONL files
    Summarize {
        /// Scored files, one summary row each
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output TSV path
        #[arg(short, long, default_value = "summary.tsv")]
        output: PathBuf,
    },

    /// Show cache file sizes
    CacheInfo,

    /// Write a default configuration file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = crate::config::DEFAULT_CONFIG_FILE)]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), DxError> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Evaluate {
            responses,
            output_dir,
            run_name,
            workers,
            policy,
            no_cache,
            no_fallback,
        } => {
            let overrides = EvaluateOverrides {
                responses,
                output_dir,
                run_name,
                workers,
                policy: policy.map(ScoringPolicy::from),
                no_cache,
                no_fallback,
            };
            cmd_evaluate(config_path, overrides)
        }
        Commands::Ground { text, answer } => cmd_ground(config_path, &text, answer),
        Commands::Summarize { files, output } => cmd_summarize(&files, &output),
        Commands::CacheInfo => cmd_cache_info(config_path),
        Commands::InitConfig { output, force } => cmd_init_config(&output, force),
    }
}
