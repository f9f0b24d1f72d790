//! # dxrank
//!
//! Application layer for dxrank: CLI, run configuration, HTTP adapters for
//! the external services, and file I/O. All grounding and scoring logic
//! lives in `dxrank-core`.

pub mod cli;
pub mod client;
pub mod config;
pub mod io;
