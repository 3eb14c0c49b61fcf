//! Sliding-window n-gram overlap against benchmark test sets.

use std::collections::HashSet;

use rayon::prelude::*;

use crate::config::ConfigError;
use crate::dataset::{Dataset, Sample};
use crate::error::{FtlintError, Result};
use crate::text;

use super::benchmarks::BenchmarkRegistry;
use super::{BenchmarkMatch, ContaminationResult};

/// Default window size in words.
pub const DEFAULT_NGRAM_SIZE: usize = 13;

/// Longest `matched_text` kept on a match, in characters.
pub const MAX_MATCHED_TEXT_CHARS: usize = 200;

/// Set of every n-gram in a benchmark's test strings.
#[derive(Debug, Default)]
pub struct NgramIndex {
    ngram_size: usize,
    ngrams: HashSet<String>,
}

impl NgramIndex {
    pub fn build<S: AsRef<str> + Sync>(strings: &[S], ngram_size: usize) -> Self {
        let ngrams = strings
            .par_iter()
            .flat_map_iter(|s| text::ngrams(&text::words(s.as_ref()), ngram_size))
            .collect();
        Self { ngram_size, ngrams }
    }

    pub fn len(&self) -> usize {
        self.ngrams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ngrams.is_empty()
    }

    pub fn contains(&self, ngram: &str) -> bool {
        self.ngrams.contains(ngram)
    }

    /// Overlap score and the longest matching span of `input`, if any
    /// n-gram matched.
    pub fn score(&self, input: &str) -> Option<(f64, String)> {
        let words = text::words(input);
        let windows = text::ngrams(&words, self.ngram_size);
        if windows.is_empty() {
            return None;
        }
        let hits: Vec<bool> = windows.iter().map(|w| self.contains(w)).collect();
        let matched = hits.iter().filter(|h| **h).count();
        if matched == 0 {
            return None;
        }

        let (start, len) = longest_run(&hits);
        let span = words[start..start + len + self.ngram_size - 1].join(" ");
        Some((matched as f64 / windows.len() as f64, truncate_chars(&span, MAX_MATCHED_TEXT_CHARS)))
    }
}

/// Start and length of the longest run of `true`, earliest on ties.
fn longest_run(flags: &[bool]) -> (usize, usize) {
    let mut best = (0, 0);
    let mut current_start = 0;
    for (i, &flag) in flags.iter().enumerate() {
        if !flag {
            current_start = i + 1;
            continue;
        }
        let len = i + 1 - current_start;
        if len > best.1 {
            best = (current_start, len);
        }
    }
    best
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => s[..cut].to_string(),
        None => s.to_string(),
    }
}

fn check_ngram_size(ngram_size: usize) -> Result<()> {
    if ngram_size == 0 {
        return Err(ConfigError::InvalidValue {
            key: "contamination.ngram_size".to_string(),
            message: "must be greater than 0".to_string(),
        }
        .into());
    }
    Ok(())
}

fn score_sample(index: &NgramIndex, sample: &Sample, benchmark: &str) -> Option<BenchmarkMatch> {
    let (overlap_score, matched_text) = index.score(&sample.text())?;
    Some(BenchmarkMatch {
        benchmark_name: benchmark.to_string(),
        sample_index: sample.index,
        overlap_score,
        matched_text,
    })
}

/// Compares every sample against one benchmark.
///
/// An unknown benchmark fails before any indexing work.
pub fn check_ngram_overlap(
    dataset: &Dataset,
    registry: &dyn BenchmarkRegistry,
    benchmark_name: &str,
    ngram_size: usize,
) -> Result<ContaminationResult> {
    check_ngram_size(ngram_size)?;
    let strings = registry.load(benchmark_name)?;
    let index = NgramIndex::build(&strings, ngram_size);

    let matches: Vec<BenchmarkMatch> = dataset
        .samples()
        .par_iter()
        .filter_map(|s| score_sample(&index, s, benchmark_name))
        .collect();

    tracing::info!(
        benchmark = benchmark_name,
        ngram_size,
        benchmark_strings = strings.len(),
        indexed_ngrams = index.len(),
        matched_samples = matches.len(),
        "Contamination check finished"
    );
    Ok(ContaminationResult::for_benchmark(benchmark_name, matches))
}

/// Runs [`check_ngram_overlap`] for each benchmark and merges the results.
///
/// Every name is resolved first, so an unknown benchmark fails before any
/// benchmark is indexed.
pub fn check_contamination<S: AsRef<str>>(
    dataset: &Dataset,
    registry: &dyn BenchmarkRegistry,
    benchmarks: &[S],
    ngram_size: usize,
) -> Result<ContaminationResult> {
    check_ngram_size(ngram_size)?;
    if let Some(unknown) = benchmarks.iter().find(|b| !registry.contains(b.as_ref())) {
        return Err(FtlintError::BenchmarkNotFound {
            name: unknown.as_ref().to_string(),
        });
    }

    let mut result = ContaminationResult::default();
    for benchmark in benchmarks {
        result.merge(check_ngram_overlap(dataset, registry, benchmark.as_ref(), ngram_size)?);
    }
    Ok(result)
}
