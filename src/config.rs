//! Project configuration loaded from `.ftlint.yaml`.
//!
//! Every section and field has a default, so a partial file (or none at
//! all) is valid. The engines never read this file; [`crate::Analyzer`]
//! turns it into plain parameters.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::DatasetFormat;
use crate::dedup::{minhash, semantic, DedupMethod};
use crate::diversity::clustering::{DEFAULT_JOIN_SIMILARITY, DEFAULT_MIN_CLUSTER_SIZE};
use crate::diversity::embeddings::DEFAULT_DIMENSION;
use crate::profiling::DEFAULT_TOP_K;
use crate::quality::{QualityRule, DEFAULT_MAX_RESPONSE_TOKENS, DEFAULT_MIN_RESPONSE_TOKENS};

/// File name searched for by [`discover_config`].
pub const CONFIG_FILENAME: &str = ".ftlint.yaml";

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid YAML for this schema.
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A field has an out-of-range or unknown value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    /// Detect per-sample languages with the stop-word detector.
    pub language_detection: bool,
    /// Entries in the most-frequent-token list.
    pub top_k_tokens: usize,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            language_detection: true,
            top_k_tokens: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub method: DedupMethod,
    pub minhash_threshold: f64,
    pub minhash_num_perm: usize,
    /// Words per MinHash shingle.
    pub shingle_size: usize,
    /// Cosine similarity for semantic duplicates.
    pub semantic_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            method: DedupMethod::Exact,
            minhash_threshold: minhash::DEFAULT_THRESHOLD,
            minhash_num_perm: minhash::DEFAULT_NUM_PERM,
            shingle_size: minhash::DEFAULT_SHINGLE_SIZE,
            semantic_threshold: semantic::DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Rule ids such as `FT011` that are never evaluated.
    pub disabled_rules: Vec<String>,
    pub max_response_tokens: usize,
    pub min_response_tokens: usize,
    /// Upper bound of the FT012 similarity band.
    pub near_duplicate_threshold: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            disabled_rules: Vec::new(),
            max_response_tokens: DEFAULT_MAX_RESPONSE_TOKENS,
            min_response_tokens: DEFAULT_MIN_RESPONSE_TOKENS,
            near_duplicate_threshold: minhash::DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContaminationConfig {
    /// Benchmarks checked by `analyze`; empty skips contamination.
    pub benchmarks: Vec<String>,
    pub ngram_size: usize,
    /// Directory holding `<name>.jsonl` / `<name>.txt` test sets.
    pub benchmark_dir: Option<PathBuf>,
}

impl Default for ContaminationConfig {
    fn default() -> Self {
        Self {
            benchmarks: Vec::new(),
            ngram_size: crate::contamination::DEFAULT_NGRAM_SIZE,
            benchmark_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversityConfig {
    /// Topic clusters smaller than this become noise.
    pub min_cluster_size: usize,
    /// Cosine similarity needed to join a topic.
    pub join_similarity: f64,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: DEFAULT_MIN_CLUSTER_SIZE,
            join_similarity: DEFAULT_JOIN_SIMILARITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Dimension of the built-in hash embedder.
    pub embedding_dimension: usize,
    pub judge_model: String,
    /// OpenAI-compatible endpoint; the judge is disabled when unset.
    pub judge_api_base: Option<String>,
    /// Samples sent to the judge; all when unset.
    pub judge_sample_size: Option<usize>,
    /// Per-call timeout for embedding and judge calls.
    pub timeout_secs: u64,
    pub max_concurrency: usize,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            embedding_dimension: DEFAULT_DIMENSION,
            judge_model: crate::llm::DEFAULT_JUDGE_MODEL.to_string(),
            judge_api_base: None,
            judge_sample_size: None,
            timeout_secs: 60,
            max_concurrency: 4,
        }
    }
}

/// Top-level `.ftlint.yaml` contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FtlintConfig {
    /// Forces a dataset format instead of detecting it.
    pub format: Option<DatasetFormat>,
    pub profiling: ProfilingConfig,
    pub dedup: DedupConfig,
    pub quality: QualityConfig,
    pub contamination: ContaminationConfig,
    pub diversity: DiversityConfig,
    pub providers: ProvidersConfig,
}

fn check_unit_interval(key: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(key, format!("{value} is outside [0, 1]")));
    }
    Ok(())
}

fn check_positive(key: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(invalid(key, "must be greater than 0"));
    }
    Ok(())
}

impl FtlintConfig {
    /// Parses YAML text. An empty document yields the defaults.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as YAML, as written by `ftlint init`.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit_interval("dedup.minhash_threshold", self.dedup.minhash_threshold)?;
        check_unit_interval("dedup.semantic_threshold", self.dedup.semantic_threshold)?;
        check_positive("dedup.minhash_num_perm", self.dedup.minhash_num_perm)?;
        check_positive("dedup.shingle_size", self.dedup.shingle_size)?;

        for id in &self.quality.disabled_rules {
            id.parse::<QualityRule>()?;
        }
        if self.quality.min_response_tokens > self.quality.max_response_tokens {
            return Err(invalid(
                "quality.min_response_tokens",
                format!(
                    "{} exceeds max_response_tokens {}",
                    self.quality.min_response_tokens, self.quality.max_response_tokens
                ),
            ));
        }
        check_unit_interval(
            "quality.near_duplicate_threshold",
            self.quality.near_duplicate_threshold,
        )?;

        check_positive("contamination.ngram_size", self.contamination.ngram_size)?;

        check_positive("diversity.min_cluster_size", self.diversity.min_cluster_size)?;
        check_unit_interval("diversity.join_similarity", self.diversity.join_similarity)?;

        check_positive("providers.embedding_dimension", self.providers.embedding_dimension)?;
        check_positive("providers.max_concurrency", self.providers.max_concurrency)?;
        if self.providers.timeout_secs == 0 {
            return Err(invalid("providers.timeout_secs", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Walks up from `start` looking for [`CONFIG_FILENAME`].
pub fn discover_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILENAME))
        .find(|candidate| candidate.is_file())
}

/// Loads `path`, or the discovered config when `path` is `None`.
///
/// Returns the defaults when no file is found.
pub fn load_config(path: Option<&Path>) -> Result<FtlintConfig, ConfigError> {
    let path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => discover_config(&std::env::current_dir()?),
    };
    let Some(path) = path.filter(|p| p.is_file()) else {
        tracing::debug!("No configuration file found, using defaults");
        return Ok(FtlintConfig::default());
    };

    let content = fs::read_to_string(&path)?;
    let config = FtlintConfig::from_yaml(&content)?;
    tracing::debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = FtlintConfig::default();
        assert!(config.format.is_none());
        assert!(config.profiling.language_detection);
        assert_eq!(config.dedup.method, DedupMethod::Exact);
        assert_eq!(config.dedup.minhash_threshold, 0.8);
        assert_eq!(config.dedup.minhash_num_perm, 128);
        assert!(config.quality.disabled_rules.is_empty());
        assert_eq!(config.quality.max_response_tokens, 4096);
        assert_eq!(config.quality.min_response_tokens, 1);
        assert!(config.contamination.benchmarks.is_empty());
        assert_eq!(config.contamination.ngram_size, 13);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml() {
        let config = FtlintConfig::from_yaml(
            "format: alpaca\ndedup:\n  method: minhash\n  minhash_threshold: 0.9\nquality:\n  disabled_rules: [FT001, FT002]\n",
        )
        .expect("parse");
        assert_eq!(config.format, Some(DatasetFormat::Alpaca));
        assert_eq!(config.dedup.method, DedupMethod::MinHash);
        assert_eq!(config.dedup.minhash_threshold, 0.9);
        assert_eq!(config.dedup.minhash_num_perm, 128);
        assert_eq!(config.quality.disabled_rules, vec!["FT001", "FT002"]);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(FtlintConfig::from_yaml("\n").expect("parse"), FtlintConfig::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            "dedup:\n  minhash_threshold: 1.5\n",
            "dedup:\n  minhash_num_perm: 0\n",
            "contamination:\n  ngram_size: 0\n",
            "quality:\n  disabled_rules: [FT999]\n",
        ];
        for yaml in cases {
            let err = FtlintConfig::from_yaml(yaml).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { .. }), "{yaml}: {err}");
        }
        assert!(matches!(
            FtlintConfig::from_yaml("dedup: [1, 2]").unwrap_err(),
            ConfigError::Yaml(_)
        ));
    }

    #[test]
    fn test_to_yaml_round_trips() {
        let mut config = FtlintConfig::default();
        config.contamination.benchmarks = vec!["gsm8k".to_string()];
        let yaml = config.to_yaml().expect("yaml");
        assert_eq!(FtlintConfig::from_yaml(&yaml).expect("parse"), config);
    }

    #[test]
    fn test_discover_in_parent() {
        let dir = TempDir::new().expect("tempdir");
        let config_file = dir.path().join(CONFIG_FILENAME);
        fs::write(&config_file, "format: chatml\n").expect("write");
        let child = dir.path().join("sub").join("dir");
        fs::create_dir_all(&child).expect("mkdir");

        assert_eq!(discover_config(&child), Some(config_file.clone()));
        let config = load_config(Some(&config_file)).expect("load");
        assert_eq!(config.format, Some(DatasetFormat::ChatMl));
    }

    #[test]
    fn test_missing_explicit_path_is_default() {
        let dir = TempDir::new().expect("tempdir");
        let config = load_config(Some(&dir.path().join("absent.yaml"))).expect("load");
        assert_eq!(config, FtlintConfig::default());
    }
}
