//! Dataset-aware heuristic checks.
//!
//! Unlike the per-sample rules these compare samples against each other:
//! FT007 repetition inside a response, FT008 language mismatch against the
//! dataset's primary language, FT010 turn-shape outliers and FT012 samples
//! with many near-identical neighbours.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde_json::json;

use crate::dataset::{Dataset, Sample};
use crate::dedup::MinHashDeduplicator;
use crate::profiling::language::{LanguageDetector, UNDETERMINED};
use crate::profiling::stats::median;
use crate::text;

use super::{QualityIssue, QualityResult, QualityRule, RuleFilter};

/// Share of repeated trigrams above which a response is flagged (FT007).
pub const REPETITION_THRESHOLD: f64 = 0.5;

/// Responses with fewer trigrams are too short to judge repetition.
pub const MIN_REPETITION_TRIGRAMS: usize = 10;

/// Modified z-score cut-off for FT010.
pub const OUTLIER_Z: f64 = 3.5;

/// Converts MAD to a standard-deviation estimate for normal data.
const MAD_FACTOR: f64 = 0.6745;

/// When MAD is zero, values this many times off the median are outliers.
pub const FALLBACK_RATIO: f64 = 3.0;

/// FT010 needs at least this many samples to define a distribution.
pub const MIN_OUTLIER_SAMPLES: usize = 3;

/// Lower bound of the "near-identical but not duplicate" band (FT012).
pub const LOW_DIVERSITY_FLOOR: f64 = 0.5;

/// Neighbours in the FT012 band needed to flag a sample.
pub const LOW_DIVERSITY_NEIGHBOURS: usize = 3;

/// Runs FT007, FT010 and FT012.
///
/// FT012 counts neighbours whose `near_duplicates` estimate lies in
/// `[0.5, threshold)`, with the detector's own threshold and parameters.
pub fn check_heuristics(
    dataset: &Dataset,
    disabled_rules: &[QualityRule],
    near_duplicates: &MinHashDeduplicator,
) -> QualityResult {
    let filter = RuleFilter::new(disabled_rules.iter().copied());
    let mut result = QualityResult::default();

    if filter.is_enabled(QualityRule::HighRepetition) {
        result.issues.extend(check_repetition(dataset));
    }
    if filter.is_enabled(QualityRule::ImbalancedTurns) {
        result.issues.extend(check_turn_balance(dataset));
    }
    if filter.is_enabled(QualityRule::LowDiversity) {
        result
            .issues
            .extend(check_low_diversity(dataset, near_duplicates));
    }
    result.sort();

    tracing::info!(
        samples = dataset.sample_count(),
        issues = result.issues.len(),
        "Heuristic checks finished"
    );
    result
}

/// FT007: responses where most word trigrams are repeats.
pub fn check_repetition(dataset: &Dataset) -> Vec<QualityIssue> {
    dataset
        .samples()
        .par_iter()
        .filter_map(|sample| {
            let words = text::words(&sample.response_text());
            let trigrams = text::ngrams(&words, 3);
            if trigrams.len() < MIN_REPETITION_TRIGRAMS {
                return None;
            }
            let unique: HashSet<&String> = trigrams.iter().collect();
            let ratio = 1.0 - unique.len() as f64 / trigrams.len() as f64;
            (ratio > REPETITION_THRESHOLD).then(|| {
                QualityIssue::new(
                    QualityRule::HighRepetition,
                    sample.index,
                    format!("{:.0}% of response trigrams are repeats", ratio * 100.0),
                )
                .with_details(json!({
                    "repetition_ratio": ratio,
                    "trigrams": trigrams.len(),
                    "unique_trigrams": unique.len(),
                }))
            })
        })
        .collect()
}

/// Flags modified z-score outliers.
///
/// `fallback(value, median)` decides when the MAD is zero and the z-score
/// is undefined. Returns one flag per value.
pub fn outlier_flags(values: &[f64], fallback: impl Fn(f64, f64) -> bool) -> Vec<bool> {
    if values.len() < MIN_OUTLIER_SAMPLES {
        return vec![false; values.len()];
    }
    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    let mad = median(&deviations);
    if mad < 1e-12 {
        return values.iter().map(|&v| fallback(v, center)).collect();
    }
    values
        .iter()
        .map(|&v| (MAD_FACTOR * (v - center) / mad).abs() > OUTLIER_Z)
        .collect()
}

fn ratio_off(value: f64, center: f64) -> bool {
    if value <= 0.0 || center <= 0.0 {
        return value != center;
    }
    value / center >= FALLBACK_RATIO || center / value >= FALLBACK_RATIO
}

fn response_prompt_log_ratio(sample: &Sample) -> f64 {
    let prompt = text::count_tokens(&sample.prompt_text()) as f64;
    let response = text::count_tokens(&sample.response_text()) as f64;
    ((response + 1.0) / (prompt + 1.0)).ln()
}

/// FT010: samples whose turn count or response/prompt length ratio is an
/// outlier relative to the rest of the dataset.
pub fn check_turn_balance(dataset: &Dataset) -> Vec<QualityIssue> {
    if dataset.sample_count() < MIN_OUTLIER_SAMPLES {
        return Vec::new();
    }

    let turns: Vec<f64> = dataset.iter().map(|s| s.turn_count() as f64).collect();
    let ratios: Vec<f64> = dataset
        .samples()
        .par_iter()
        .map(response_prompt_log_ratio)
        .collect();

    let turn_flags = outlier_flags(&turns, ratio_off);
    let ratio_flags = outlier_flags(&ratios, |v, c| (v - c).abs() >= FALLBACK_RATIO.ln());
    let median_turns = median(&turns);
    let median_ratio = median(&ratios).exp();

    let mut issues = Vec::new();
    for sample in dataset {
        let i = sample.index;
        let mut reasons = Vec::new();
        if turn_flags[i] {
            reasons.push(format!(
                "{} turns against a dataset median of {}",
                sample.turn_count(),
                median_turns
            ));
        }
        if ratio_flags[i] {
            reasons.push(format!(
                "response/prompt length ratio {:.2} against a median of {:.2}",
                ratios[i].exp(),
                median_ratio
            ));
        }
        if reasons.is_empty() {
            continue;
        }
        issues.push(
            QualityIssue::new(
                QualityRule::ImbalancedTurns,
                i,
                format!("Unusual conversation shape: {}", reasons.join("; ")),
            )
            .with_details(json!({
                "turn_count": sample.turn_count(),
                "median_turn_count": median_turns,
                "turn_outlier": turn_flags[i],
                "length_ratio": ratios[i].exp(),
                "median_length_ratio": median_ratio,
                "length_ratio_outlier": ratio_flags[i],
            })),
        );
    }
    tracing::debug!(flagged = issues.len(), "Turn balance outliers");
    issues
}

/// FT012: samples near-identical to several others without reaching the
/// threshold of `near_duplicates`.
pub fn check_low_diversity(
    dataset: &Dataset,
    near_duplicates: &MinHashDeduplicator,
) -> Vec<QualityIssue> {
    let near_duplicate_threshold = near_duplicates.threshold();
    if near_duplicate_threshold <= LOW_DIVERSITY_FLOOR {
        return Vec::new();
    }
    let pairs = near_duplicates.similar_pairs(dataset, LOW_DIVERSITY_FLOOR);

    let mut neighbours: HashMap<usize, Vec<usize>> = HashMap::new();
    for (a, b, estimate) in pairs {
        if estimate >= near_duplicate_threshold {
            continue;
        }
        neighbours.entry(a).or_default().push(b);
        neighbours.entry(b).or_default().push(a);
    }

    let mut flagged: Vec<(usize, Vec<usize>)> = neighbours
        .into_iter()
        .filter(|(_, n)| n.len() >= LOW_DIVERSITY_NEIGHBOURS)
        .collect();
    flagged.sort_by_key(|(i, _)| *i);

    flagged
        .into_iter()
        .map(|(index, mut similar)| {
            similar.sort_unstable();
            QualityIssue::new(
                QualityRule::LowDiversity,
                index,
                format!("Sample closely resembles {} others", similar.len()),
            )
            .with_details(json!({
                "similar_samples": similar,
                "min_similarity": LOW_DIVERSITY_FLOOR,
                "dedup_threshold": near_duplicate_threshold,
            }))
        })
        .collect()
}

/// FT008: samples whose detected language differs from the dataset's
/// primary language. Undetermined samples are never flagged.
pub fn check_language_consistency(
    dataset: &Dataset,
    detector: &dyn LanguageDetector,
) -> QualityResult {
    let detected: Vec<String> = dataset
        .samples()
        .par_iter()
        .map(|s| {
            detector
                .detect(&s.text())
                .unwrap_or_else(|| UNDETERMINED.to_string())
        })
        .collect();

    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (i, lang) in detected.iter().enumerate() {
        if lang != UNDETERMINED {
            counts.entry(lang.as_str()).or_insert((0, i)).0 += 1;
        }
    }
    let Some(primary) = counts
        .iter()
        .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
        .map(|(lang, _)| lang.to_string())
    else {
        return QualityResult::default();
    };

    let issues: Vec<QualityIssue> = detected
        .iter()
        .enumerate()
        .filter(|(_, lang)| lang.as_str() != UNDETERMINED && **lang != primary)
        .map(|(i, lang)| {
            QualityIssue::new(
                QualityRule::LanguageMismatch,
                i,
                format!("Sample is in '{lang}', dataset is mostly '{primary}'"),
            )
            .with_details(json!({ "language": lang, "primary_language": primary }))
        })
        .collect();

    tracing::info!(
        detector = detector.name(),
        primary = %primary,
        mismatches = issues.len(),
        "Language consistency checked"
    );
    QualityResult::new(issues)
}
