//! Quality checks for fine-tuning samples.
//!
//! Three sub-checks run independently and merge into one [`QualityResult`]:
//! deterministic per-sample [`rules`], dataset-aware [`heuristics`] and
//! [`pii`] detection. LLM judge scoring lives in [`llm_judge`] and is only
//! run when a judge is injected.

mod heuristics;
mod issue;
mod llm_judge;
mod pii;
mod rules;

use std::collections::HashSet;

pub use heuristics::{
    check_heuristics, check_language_consistency, check_low_diversity, check_repetition,
    check_turn_balance, outlier_flags,
};
pub use issue::{QualityIssue, QualityResult, QualityRule, Severity};
pub use llm_judge::{score_with_llm, select_samples, JudgeSettings, DEFAULT_SAMPLE_SEED};
pub use pii::{detect_pii, luhn_valid, redact, scan_text, PiiKind};
pub use rules::{check_quality_rules, DEFAULT_MAX_RESPONSE_TOKENS, DEFAULT_MIN_RESPONSE_TOKENS};

use crate::config::{DedupConfig, QualityConfig};
use crate::dataset::Dataset;
use crate::dedup::MinHashDeduplicator;
use crate::error::Result;

/// Set of rules a run may evaluate. Checks consult it before doing work.
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    disabled: HashSet<QualityRule>,
}

impl RuleFilter {
    pub fn new(disabled: impl IntoIterator<Item = QualityRule>) -> Self {
        Self {
            disabled: disabled.into_iter().collect(),
        }
    }

    /// Parses rule ids such as `"FT011"`; unknown ids are a config error.
    pub fn parse<S: AsRef<str>>(ids: &[S]) -> Result<Self> {
        let rules = ids
            .iter()
            .map(|id| id.as_ref().parse::<QualityRule>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::new(rules))
    }

    pub fn is_enabled(&self, rule: QualityRule) -> bool {
        !self.disabled.contains(&rule)
    }

    /// Disabled rules in rule order.
    pub fn disabled(&self) -> Vec<QualityRule> {
        let mut rules: Vec<QualityRule> = self.disabled.iter().copied().collect();
        rules.sort();
        rules
    }
}

/// Runs rules, heuristics and PII detection with the given configuration.
///
/// FT012 uses the MinHash `num_perm` and `shingle_size` from `dedup`, with
/// `near_duplicate_threshold` as its upper bound.
pub fn check_quality(
    dataset: &Dataset,
    config: &QualityConfig,
    dedup: &DedupConfig,
) -> Result<QualityResult> {
    let filter = RuleFilter::parse(&config.disabled_rules)?;
    let disabled = filter.disabled();
    let near_duplicates = MinHashDeduplicator::with_params(
        config.near_duplicate_threshold,
        dedup.minhash_num_perm,
        dedup.shingle_size,
    );

    let mut result = check_quality_rules(
        dataset,
        &disabled,
        config.max_response_tokens,
        config.min_response_tokens,
    );
    result.merge(check_heuristics(dataset, &disabled, &near_duplicates));
    if filter.is_enabled(QualityRule::PiiDetected) {
        result.merge(detect_pii(dataset));
    }

    tracing::info!(
        samples = dataset.sample_count(),
        errors = result.error_count(),
        warnings = result.warning_count(),
        infos = result.info_count(),
        passed = result.passed(),
        "Quality checks finished"
    );
    Ok(result)
}
