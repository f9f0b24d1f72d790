//! # Run Configuration
//!
//! A TOML file with one section per concern. Every field has a default, so
//! an empty file (or no file) is a valid configuration; CLI flags are applied
//! on top by the command layer.
//!
//! ```toml
//! [run]
//! name = "gpt-4o_en"
//! response_file = "responses/gpt-4o_en.jsonl"
//! output_dir = "results"
//!
//! [grounding]
//! relevance_threshold = 0.23
//!
//! [scoring]
//! policy = "tiered"
//!
//! [cache]
//! dir = "cache"
//!
//! [services]
//! ontology_url = "http://localhost:8000/ontology"
//! search_url = "http://localhost:8000/search"
//! ```

use dxrank_core::{CacheConfig, DxError, GroundingConfig, ScoringConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the bearer token for both services.
pub const API_KEY_ENV: &str = "DXRANK_API_KEY";

/// Default location of the run file.
pub const DEFAULT_CONFIG_FILE: &str = "dxrank.toml";

// =============================================================================
// SECTIONS
// =============================================================================

/// `[run]`: what to evaluate and where results go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub name: String,
    pub response_file: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// Worker threads; available parallelism when unset.
    pub workers: Option<usize>,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            name: "run".to_string(),
            response_file: None,
            output_dir: PathBuf::from("results"),
            workers: None,
        }
    }
}

/// `[cache]`: where the memo files live and how large they grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    pub dir: PathBuf,
    pub capacity: usize,
    pub lock_timeout_ms: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        let store = CacheConfig::default();
        Self {
            enabled: true,
            dir: PathBuf::from("cache"),
            capacity: store.capacity,
            lock_timeout_ms: store.lock_timeout_ms,
        }
    }
}

impl CacheSection {
    #[must_use]
    pub fn store_config(&self) -> CacheConfig {
        CacheConfig {
            capacity: self.capacity,
            lock_timeout_ms: self.lock_timeout_ms,
        }
    }

    #[must_use]
    pub fn mappings_path(&self) -> PathBuf {
        self.dir.join("mappings.redb")
    }

    #[must_use]
    pub fn scores_path(&self) -> PathBuf {
        self.dir.join("scores.redb")
    }
}

/// `[services]`: where the ontology and search backends live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesSection {
    pub ontology_url: Option<String>,
    /// JSON ontology snapshot; takes precedence over `ontology_url`.
    pub ontology_snapshot: Option<PathBuf>,
    pub search_url: Option<String>,
    pub timeout_secs: u64,
    pub api_key: Option<String>,
}

impl Default for ServicesSection {
    fn default() -> Self {
        Self {
            ontology_url: None,
            ontology_snapshot: None,
            search_url: None,
            timeout_secs: 30,
            api_key: None,
        }
    }
}

impl ServicesSection {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Token from the file, else from [`API_KEY_ENV`].
    #[must_use]
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

// =============================================================================
// RUN CONFIGURATION
// =============================================================================

/// Complete configuration of a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub run: RunSection,
    pub grounding: GroundingConfig,
    pub scoring: ScoringConfig,
    pub cache: CacheSection,
    pub services: ServicesSection,
}

impl RunConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, DxError> {
        let config: Self = toml::from_str(text).map_err(|e| DxError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`; a missing file at the default location yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, DxError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if !path.exists() {
            if explicit {
                return Err(DxError::Config(format!(
                    "configuration file '{}' not found",
                    path.display()
                )));
            }
            tracing::debug!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|e| {
            DxError::IoError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String, DxError> {
        toml::to_string_pretty(self).map_err(|e| DxError::SerializationError(e.to_string()))
    }

    /// Reject values no run can work with.
    pub fn validate(&self) -> Result<(), DxError> {
        if self.run.name.trim().is_empty() {
            return Err(DxError::Config("run.name must not be empty".to_string()));
        }
        if self.run.workers == Some(0) {
            return Err(DxError::Config("run.workers must be at least 1".to_string()));
        }
        if self.grounding.allowed_prefixes.is_empty() {
            return Err(DxError::Config(
                "grounding.allowed_prefixes must not be empty".to_string(),
            ));
        }
        // A grounding namespace the scorer ignores would always score zero.
        if let Some(prefix) = self
            .grounding
            .allowed_prefixes
            .iter()
            .find(|prefix| !self.scoring.is_candidate(prefix))
        {
            return Err(DxError::Config(format!(
                "grounding prefix '{prefix}' is not covered by scoring.candidate_prefixes"
            )));
        }
        let threshold = self.grounding.relevance_threshold;
        if threshold.is_nan() || threshold < 0.0 {
            return Err(DxError::Config(
                "grounding.relevance_threshold must be a non-negative number".to_string(),
            ));
        }
        if self.grounding.limit == 0 {
            return Err(DxError::Config("grounding.limit must be at least 1".to_string()));
        }
        if self.cache.capacity == 0 {
            return Err(DxError::Config("cache.capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dxrank_core::ScoringPolicy;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = RunConfig::from_toml("").expect("parse");
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.grounding.limit, 1);
        assert_eq!(config.scoring.policy, ScoringPolicy::Tiered);
        assert_eq!(config.cache.capacity, 524_288);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = RunConfig::from_toml(
            r#"
            [run]
            name = "gpt-4o_en"
            workers = 4

            [scoring]
            policy = "binary"

            [cache]
            dir = "/tmp/dx"
            "#,
        )
        .expect("parse");

        assert_eq!(config.run.name, "gpt-4o_en");
        assert_eq!(config.run.workers, Some(4));
        assert_eq!(config.scoring.policy, ScoringPolicy::Binary);
        assert_eq!(config.scoring.grouping_namespaces, vec!["OMIMPS"]);
        assert_eq!(config.cache.scores_path(), PathBuf::from("/tmp/dx/scores.redb"));
        assert!(config.grounding.fallback_enabled);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(RunConfig::from_toml("[run]\nworkers = 0").is_err());
        assert!(RunConfig::from_toml("[grounding]\nlimit = 0").is_err());
        assert!(RunConfig::from_toml("[grounding]\nrelevance_threshold = -0.5").is_err());
        assert!(RunConfig::from_toml("[scoring]\npolicy = \"fuzzy\"").is_err());
    }

    #[test]
    fn grounding_prefixes_must_be_scorable() {
        let grounding_only = "[grounding]\nallowed_prefixes = [\"MONDO:\", \"OMIM:\"]";
        let error = RunConfig::from_toml(grounding_only).expect_err("should fail");
        assert!(error.to_string().contains("OMIM:"));

        let both = "[grounding]\nallowed_prefixes = [\"MONDO:\", \"OMIM:\"]\n\
                    [scoring]\ncandidate_prefixes = [\"MONDO:\", \"OMIM:\"]";
        assert!(RunConfig::from_toml(both).is_ok());

        // A broader scoring prefix covers a narrower grounding one.
        let broader = "[grounding]\nallowed_prefixes = [\"MONDO:00\"]";
        assert!(RunConfig::from_toml(broader).is_ok());
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = RunConfig::default().to_toml().expect("serialize");
        assert!(text.contains("[grounding]"));
        assert_eq!(RunConfig::from_toml(&text).expect("parse"), RunConfig::default());
    }

    #[test]
    fn file_api_key_wins() {
        let services = ServicesSection {
            api_key: Some("from-file".to_string()),
            ..ServicesSection::default()
        };
        assert_eq!(services.resolved_api_key(), Some("from-file".to_string()));
    }
}
