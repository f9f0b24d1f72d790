//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::client::{HttpOntologyGateway, HttpSemanticStore};
use crate::config::{CacheSection, RunConfig, ServicesSection};
use crate::io;
use dxrank_core::summary::{to_topn_tsv, to_tsv};
use dxrank_core::{
    DxError, Evaluator, Grounder, InMemoryOntology, KeyValueStore, MemoryStore, OntologyGateway,
    RedbStore, Scorer, ScoringPolicy, SemanticStore, default_workers, run_batch, summarize,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// SERVICE WIRING
// =============================================================================

/// Ontology gateway from the snapshot file, else from the HTTP backend.
pub fn build_ontology(services: &ServicesSection) -> Result<Arc<dyn OntologyGateway>, DxError> {
    if let Some(path) = &services.ontology_snapshot {
        let snapshot = io::load_snapshot(path)?;
        return Ok(Arc::new(InMemoryOntology::from_snapshot(&snapshot)));
    }
    if let Some(url) = &services.ontology_url {
        tracing::info!(url = %url, "using ontology backend");
        let gateway = HttpOntologyGateway::new(url, services.resolved_api_key(), services.timeout())?;
        return Ok(Arc::new(gateway));
    }
    Err(DxError::Config(
        "no ontology source: set services.ontology_snapshot or services.ontology_url".to_string(),
    ))
}

/// Semantic store when a search URL is configured.
pub fn build_search(
    services: &ServicesSection,
) -> Result<Option<Arc<dyn SemanticStore>>, DxError> {
    match &services.search_url {
        Some(url) => {
            tracing::info!(url = %url, "using semantic search");
            let store: Arc<dyn SemanticStore> = Arc::new(HttpSemanticStore::new(
                url,
                services.resolved_api_key(),
                services.timeout(),
            )?);
            Ok(Some(store))
        }
        None => Ok(None),
    }
}

/// The mapping and score stores, durable unless disabled.
pub fn open_stores(
    cache: &CacheSection,
) -> Result<(Arc<dyn KeyValueStore>, Arc<dyn KeyValueStore>), DxError> {
    if !cache.enabled {
        tracing::info!("cache files disabled, using in-memory caches");
        let mappings: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new(cache.capacity));
        let scores: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new(cache.capacity));
        return Ok((mappings, scores));
    }

    std::fs::create_dir_all(&cache.dir).map_err(|e| {
        DxError::IoError(format!("Cannot create cache dir '{}': {}", cache.dir.display(), e))
    })?;
    let store_config = cache.store_config();
    let mappings: Arc<dyn KeyValueStore> =
        Arc::new(RedbStore::open(cache.mappings_path(), &store_config)?);
    let scores: Arc<dyn KeyValueStore> =
        Arc::new(RedbStore::open(cache.scores_path(), &store_config)?);
    tracing::info!(
        mappings = mappings.len(),
        scores = scores.len(),
        dir = %cache.dir.display(),
        "cache files opened"
    );
    Ok((mappings, scores))
}

fn grounder_for(
    config: &RunConfig,
    ontology: &Arc<dyn OntologyGateway>,
    search: Option<&Arc<dyn SemanticStore>>,
) -> Grounder {
    let grounder = Grounder::new(ontology.clone(), config.grounding.clone());
    match search {
        Some(search) => grounder.with_semantic_store(search.clone()),
        None => grounder,
    }
}

// =============================================================================
// EVALUATE COMMAND
// =============================================================================

/// Flag values that override the configuration file.
#[derive(Debug, Default)]
pub struct EvaluateOverrides {
    pub responses: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub run_name: Option<String>,
    pub workers: Option<usize>,
    pub policy: Option<ScoringPolicy>,
    pub no_cache: bool,
    pub no_fallback: bool,
}

impl EvaluateOverrides {
    /// Apply the flags to `config` and re-validate it.
    pub fn apply(&self, config: &mut RunConfig) -> Result<(), DxError> {
        if let Some(path) = &self.responses {
            config.run.response_file = Some(path.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.run.output_dir = dir.clone();
        }
        if let Some(name) = &self.run_name {
            config.run.name = name.clone();
        }
        if self.workers.is_some() {
            config.run.workers = self.workers;
        }
        if let Some(policy) = self.policy {
            config.scoring.policy = policy;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
        if self.no_fallback {
            config.grounding.fallback_enabled = false;
        }
        config.validate()
    }
}

/// Ground, score and summarize a response file.
pub fn cmd_evaluate(config_path: Option<&Path>, overrides: EvaluateOverrides) -> Result<(), DxError> {
    let mut config = RunConfig::load(config_path)?;
    overrides.apply(&mut config)?;

    let response_file = config.run.response_file.clone().ok_or_else(|| {
        DxError::Config("no response file: pass --responses or set run.response_file".to_string())
    })?;
    let responses = io::read_responses(&response_file)?;

    let ontology = build_ontology(&config.services)?;
    let search = build_search(&config.services)?;
    let (mapping_store, score_store) = open_stores(&config.cache)?;
    let workers = config.run.workers.unwrap_or_else(default_workers);

    let outcome = run_batch(&responses, workers, |_| {
        Evaluator::new(
            grounder_for(&config, &ontology, search.as_ref()),
            Scorer::new(
                ontology.clone(),
                config.scoring.clone(),
                mapping_store.clone(),
                score_store.clone(),
            ),
        )
    })?;

    mapping_store.flush()?;
    score_store.flush()?;
    tracing::info!("mappings {}", outcome.cache.mappings);
    tracing::info!("scores {}", outcome.cache.scores);

    let output_dir = &config.run.output_dir;
    std::fs::create_dir_all(output_dir).map_err(|e| {
        DxError::IoError(format!("Cannot create '{}': {}", output_dir.display(), e))
    })?;

    let run = config.run.name.as_str();
    let scored_path = io::scored_path(output_dir, run);
    io::write_jsonl(&scored_path, &outcome.cases)?;

    let summary = summarize(run, &outcome.cases)?;
    let summary_path = io::summary_path(output_dir, run);
    io::write_summary(&summary_path, std::slice::from_ref(&summary))?;

    println!("Evaluated {} cases ({} skipped)", outcome.cases.len(), outcome.skipped);
    println!("Scored:  {}", scored_path.display());
    println!("Summary: {}", summary_path.display());
    println!("Top-n:   {}", io::topn_path(&summary_path).display());
    println!();
    print!("{}", to_tsv(std::slice::from_ref(&summary)));
    println!();
    print!("{}", to_topn_tsv(std::slice::from_ref(&summary)));
    Ok(())
}

// =============================================================================
// GROUND COMMAND
// =============================================================================

/// Ground one diagnosis, or a whole answer with `answer`, and print JSON.
pub fn cmd_ground(config_path: Option<&Path>, text: &str, answer: bool) -> Result<(), DxError> {
    let config = RunConfig::load(config_path)?;
    let ontology = build_ontology(&config.services)?;
    let search = build_search(&config.services)?;
    let grounder = grounder_for(&config, &ontology, search.as_ref());

    let output = if answer {
        serde_json::to_string_pretty(&grounder.ground_text(text))
    } else {
        serde_json::to_string_pretty(&grounder.ground(text))
    }
    .map_err(|e| DxError::SerializationError(e.to_string()))?;

    println!("{output}");
    Ok(())
}

// =============================================================================
// SUMMARIZE COMMAND
// =============================================================================

/// One summary row per scored file.
pub fn cmd_summarize(files: &[PathBuf], output: &Path) -> Result<(), DxError> {
    let mut summaries = Vec::with_capacity(files.len());
    for file in files {
        let cases = io::read_scored(file)?;
        summaries.push(summarize(&io::run_name_from_path(file), &cases)?);
    }
    io::write_summary(output, &summaries)?;

    println!(
        "Summarized {} runs into {} and {}",
        summaries.len(),
        output.display(),
        io::topn_path(output).display()
    );
    print!("{}", to_tsv(&summaries));
    println!();
    print!("{}", to_topn_tsv(&summaries));
    Ok(())
}

// =============================================================================
// CACHE INFO COMMAND
// =============================================================================

/// Print entry counts of the cache files.
pub fn cmd_cache_info(config_path: Option<&Path>) -> Result<(), DxError> {
    let config = RunConfig::load(config_path)?;
    let store_config = config.cache.store_config();

    println!("Cache directory: {}", config.cache.dir.display());
    for (name, path) in [
        ("mappings", config.cache.mappings_path()),
        ("scores", config.cache.scores_path()),
    ] {
        if !path.exists() {
            println!("  {name:<9} (missing)");
            continue;
        }
        let store = RedbStore::open(&path, &store_config)?;
        println!(
            "  {name:<9} {} / {} entries",
            store.len(),
            store.capacity()
        );
    }
    Ok(())
}

// =============================================================================
// INIT CONFIG COMMAND
// =============================================================================

/// Write the default configuration.
pub fn cmd_init_config(output: &Path, force: bool) -> Result<(), DxError> {
    if output.exists() && !force {
        return Err(DxError::Config(format!(
            "'{}' already exists (use --force to overwrite)",
            output.display()
        )));
    }
    let text = RunConfig::default().to_toml()?;
    std::fs::write(output, text)
        .map_err(|e| DxError::IoError(format!("Cannot write '{}': {}", output.display(), e)))?;
    println!("Wrote default configuration to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_take_precedence() {
        let mut config = RunConfig::default();
        let overrides = EvaluateOverrides {
            run_name: Some("llama3_de".to_string()),
            workers: Some(2),
            policy: Some(ScoringPolicy::Binary),
            no_fallback: true,
            ..EvaluateOverrides::default()
        };
        overrides.apply(&mut config).expect("apply");

        assert_eq!(config.run.name, "llama3_de");
        assert_eq!(config.run.workers, Some(2));
        assert_eq!(config.scoring.policy, ScoringPolicy::Binary);
        assert!(!config.grounding.fallback_enabled);
        assert!(config.cache.enabled);
    }

    #[test]
    fn missing_ontology_source_is_a_config_error() {
        let result = build_ontology(&ServicesSection::default());
        assert!(matches!(result, Err(DxError::Config(_))));
    }
}
