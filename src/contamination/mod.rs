//! Benchmark contamination detection.
//!
//! Training samples that reproduce benchmark test strings inflate evaluation
//! scores. Each sample's word n-grams are looked up in an index built from a
//! benchmark's test set; any overlap is reported as a [`BenchmarkMatch`].

pub mod benchmarks;
pub mod ngram;

use std::collections::BTreeMap;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

pub use benchmarks::{
    builtin_description, catalog, BenchmarkEntry, BenchmarkRegistry, DirectoryRegistry,
    InMemoryRegistry, BUILTIN_BENCHMARKS,
};
pub use ngram::{check_contamination, check_ngram_overlap, NgramIndex, DEFAULT_NGRAM_SIZE};

/// One sample overlapping one benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkMatch {
    pub benchmark_name: String,
    pub sample_index: usize,
    /// Share of the sample's n-grams found in the benchmark, in `(0, 1]`.
    pub overlap_score: f64,
    /// Longest overlapping span.
    pub matched_text: String,
}

/// Matches across one or more benchmarks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContaminationResult {
    pub matches: Vec<BenchmarkMatch>,
    /// Matched sample count per checked benchmark, zero included.
    pub benchmark_summary: BTreeMap<String, usize>,
}

impl ContaminationResult {
    pub fn for_benchmark(name: &str, matches: Vec<BenchmarkMatch>) -> Self {
        let mut benchmark_summary = BTreeMap::new();
        benchmark_summary.insert(name.to_string(), matches.len());
        Self {
            matches,
            benchmark_summary,
        }
    }

    pub fn merge(&mut self, other: ContaminationResult) {
        self.matches.extend(other.matches);
        for (name, count) in other.benchmark_summary {
            *self.benchmark_summary.entry(name).or_default() += count;
        }
    }

    pub fn is_contaminated(&self) -> bool {
        !self.matches.is_empty()
    }

    /// Distinct samples matching any benchmark.
    pub fn contaminated_samples(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.matches.iter().map(|m| m.sample_index).collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

impl Serialize for ContaminationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ContaminationResult", 3)?;
        state.serialize_field("matches", &self.matches)?;
        state.serialize_field("benchmark_summary", &self.benchmark_summary)?;
        state.serialize_field("is_contaminated", &self.is_contaminated())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(benchmark: &str, index: usize) -> BenchmarkMatch {
        BenchmarkMatch {
            benchmark_name: benchmark.to_string(),
            sample_index: index,
            overlap_score: 0.5,
            matched_text: "span".to_string(),
        }
    }

    #[test]
    fn test_empty_result_is_clean() {
        let result = ContaminationResult::for_benchmark("mmlu", Vec::new());
        assert!(!result.is_contaminated());
        assert_eq!(result.benchmark_summary["mmlu"], 0);
    }

    #[test]
    fn test_merge_and_contaminated_samples() {
        let mut result = ContaminationResult::for_benchmark("a", vec![hit("a", 3), hit("a", 1)]);
        result.merge(ContaminationResult::for_benchmark("b", vec![hit("b", 3)]));
        assert!(result.is_contaminated());
        assert_eq!(result.contaminated_samples(), vec![1, 3]);
        assert_eq!(result.benchmark_summary["b"], 1);

        let json = serde_json::to_value(&result).expect("json");
        assert_eq!(json["is_contaminated"], true);
    }
}
