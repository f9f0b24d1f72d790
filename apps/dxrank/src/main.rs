//! # dxrank
//!
//! The main binary for benchmarking LLM differential diagnoses.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                    apps/dxrank (THE BINARY)               │
//! │                                                           │
//! │  ┌──────────┐   ┌──────────────┐   ┌──────────────────┐   │
//! │  │   CLI    │   │ TOML config  │   │  HTTP adapters   │   │
//! │  │  (clap)  │   │   (toml)     │   │ (reqwest)        │   │
//! │  └────┬─────┘   └──────┬───────┘   └────────┬─────────┘   │
//! │       └────────────────┼────────────────────┘             │
//! │                        ▼                                  │
//! │                ┌───────────────┐                          │
//! │                │  dxrank-core  │                          │
//! │                │  (THE LOGIC)  │                          │
//! │                └───────────────┘                          │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! dxrank init-config
//! dxrank evaluate -r responses/gpt-4o_en.jsonl -n gpt-4o_en
//! dxrank ground "Marfan syndrome (MFS)"
//! dxrank summarize results/*_scored.jsonl -o summary.tsv
//! ```

use clap::Parser;
use dxrank::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // DXRANK_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("DXRANK_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "dxrank=debug,dxrank_core=debug"
    } else {
        "dxrank=info,dxrank_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
