//! Dataset profiling: token lengths, turn counts, vocabulary and languages.

pub mod language;
pub mod stats;

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::text;

pub use language::{detect_languages, LanguageDetector, LanguageProfile, StopwordDetector, UNDETERMINED};
pub use stats::{percentile, TokenStats};

/// Default number of entries in [`VocabProfile::top_tokens`].
pub const DEFAULT_TOP_K: usize = 20;

/// Token length statistics for prompts, responses and whole samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LengthProfile {
    pub prompt_tokens: TokenStats,
    pub response_tokens: TokenStats,
    pub total_tokens: TokenStats,
}

/// Turn count distribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnProfile {
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub median: f64,
}

/// Vocabulary statistics over lower-cased word tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VocabProfile {
    pub unique_tokens: usize,
    pub type_token_ratio: f64,
    /// Most frequent tokens, ties in order of first occurrence.
    pub top_tokens: Vec<(String, usize)>,
}

/// Every profile of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileResult {
    pub length: LengthProfile,
    pub turns: TurnProfile,
    pub vocab: VocabProfile,
    pub language: LanguageProfile,
    pub sample_count: usize,
    pub total_tokens: usize,
}

/// Token counts of every sample's prompt, response and full text.
pub fn compute_length_profile(dataset: &Dataset) -> LengthProfile {
    let counts: Vec<(usize, usize)> = dataset
        .samples()
        .par_iter()
        .map(|s| {
            (
                text::count_tokens(&s.prompt_text()),
                text::count_tokens(&s.response_text()),
            )
        })
        .collect();

    let prompt: Vec<usize> = counts.iter().map(|c| c.0).collect();
    let response: Vec<usize> = counts.iter().map(|c| c.1).collect();
    let total: Vec<usize> = counts.iter().map(|c| c.0 + c.1).collect();

    LengthProfile {
        prompt_tokens: TokenStats::from_counts(&prompt),
        response_tokens: TokenStats::from_counts(&response),
        total_tokens: TokenStats::from_counts(&total),
    }
}

pub fn compute_turn_profile(dataset: &Dataset) -> TurnProfile {
    let turns: Vec<usize> = dataset.iter().map(|s| s.turn_count()).collect();
    let stats = TokenStats::from_counts(&turns);
    TurnProfile {
        min: stats.min,
        max: stats.max,
        mean: stats.mean,
        median: stats.median,
    }
}

/// Vocabulary size, type-token ratio and the `top_k` most frequent words.
pub fn compute_vocab_profile(dataset: &Dataset, top_k: usize) -> VocabProfile {
    let per_sample: Vec<Vec<String>> = dataset
        .samples()
        .par_iter()
        .map(|s| text::words(&s.text()))
        .collect();

    // (count, first occurrence)
    let mut freq: HashMap<&str, (usize, usize)> = HashMap::new();
    let mut total = 0usize;
    for word in per_sample.iter().flatten() {
        let order = freq.len();
        freq.entry(word.as_str()).or_insert((0, order)).0 += 1;
        total += 1;
    }

    let mut ranked: Vec<(&str, (usize, usize))> = freq.iter().map(|(w, c)| (*w, *c)).collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));

    VocabProfile {
        unique_tokens: freq.len(),
        type_token_ratio: if total == 0 {
            0.0
        } else {
            freq.len() as f64 / total as f64
        },
        top_tokens: ranked
            .into_iter()
            .take(top_k)
            .map(|(w, (count, _))| (w.to_string(), count))
            .collect(),
    }
}

/// Runs every profile. Language detection is skipped without a detector.
pub fn profile_dataset(
    dataset: &Dataset,
    detector: Option<&dyn LanguageDetector>,
    top_k: usize,
) -> ProfileResult {
    let length = compute_length_profile(dataset);
    let language = detector
        .map(|d| detect_languages(dataset, d))
        .unwrap_or_default();
    let result = ProfileResult {
        total_tokens: length.total_tokens.total,
        length,
        turns: compute_turn_profile(dataset),
        vocab: compute_vocab_profile(dataset, top_k),
        language,
        sample_count: dataset.sample_count(),
    };
    tracing::info!(
        samples = result.sample_count,
        total_tokens = result.total_tokens,
        unique_tokens = result.vocab.unique_tokens,
        "Profiling finished"
    );
    result
}
