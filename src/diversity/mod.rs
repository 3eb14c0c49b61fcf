//! Topic diversity analysis.
//!
//! Samples are embedded through an [`EmbeddingProvider`], grouped by a
//! [`TopicClusterer`], and the cluster-size distribution is reduced to a
//! normalized entropy score:
//!
//! 1. **Embeddings** - provider trait, local hash embedder, cosine helpers
//! 2. **Clustering** - clusterer trait and the greedy cosine clusterer
//! 3. **Metrics** - entropy-based diversity score
//!
//! # Usage
//!
//! ```rust,ignore
//! use ftlint::diversity::{cluster_topics, GreedyCosineClusterer, HashEmbedder};
//!
//! let embedder = HashEmbedder::default();
//! let result = cluster_topics(&dataset, Some(&embedder), &GreedyCosineClusterer::default(), 5, timeout).await?;
//! println!("Diversity: {:.3}", result.diversity_score);
//! ```

pub mod clustering;
pub mod embeddings;
pub mod metrics;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use clustering::{cluster_topics, ClusterAssignment, GreedyCosineClusterer, TopicClusterer};
pub use embeddings::{cosine_similarity, EmbeddingProvider, HashEmbedder};
pub use metrics::{compute_diversity_score, normalized_entropy, shannon_entropy};

/// Label used in `topic_distribution` for samples no cluster accepted.
pub const NOISE_LABEL: &str = "unclustered";

/// One topic cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCluster {
    /// Human-readable label.
    pub label: String,
    /// Member sample indices, ascending.
    pub sample_indices: Vec<usize>,
    /// Short excerpt of the cluster's most central sample.
    pub centroid_summary: String,
}

impl TopicCluster {
    pub fn size(&self) -> usize {
        self.sample_indices.len()
    }
}

/// Result of topic clustering.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiversityResult {
    pub clusters: Vec<TopicCluster>,
    /// Samples assigned to no cluster.
    pub noise_indices: Vec<usize>,
    /// Normalized entropy of the cluster-size distribution, in `[0, 1]`.
    pub diversity_score: f64,
    /// Share of samples per cluster label, plus [`NOISE_LABEL`] when non-zero.
    pub topic_distribution: BTreeMap<String, f64>,
}

impl DiversityResult {
    /// Builds a result and fills in the derived score and distribution.
    pub fn new(clusters: Vec<TopicCluster>, noise_indices: Vec<usize>) -> Self {
        let mut result = Self {
            clusters,
            noise_indices,
            diversity_score: 0.0,
            topic_distribution: BTreeMap::new(),
        };
        result.diversity_score = compute_diversity_score(&result);
        result.topic_distribution = topic_distribution(&result);
        result
    }

    /// Number of samples covered, clustered or not.
    pub fn sample_count(&self) -> usize {
        self.clusters.iter().map(TopicCluster::size).sum::<usize>() + self.noise_indices.len()
    }
}

fn topic_distribution(result: &DiversityResult) -> BTreeMap<String, f64> {
    let total = result.sample_count();
    let mut distribution = BTreeMap::new();
    if total == 0 {
        return distribution;
    }
    for cluster in &result.clusters {
        *distribution.entry(cluster.label.clone()).or_insert(0.0) +=
            cluster.size() as f64 / total as f64;
    }
    if !result.noise_indices.is_empty() {
        distribution.insert(
            NOISE_LABEL.to_string(),
            result.noise_indices.len() as f64 / total as f64,
        );
    }
    distribution
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(label: &str, indices: Vec<usize>) -> TopicCluster {
        TopicCluster {
            label: label.to_string(),
            sample_indices: indices,
            centroid_summary: String::new(),
        }
    }

    #[test]
    fn test_topic_distribution_shares() {
        let result = DiversityResult::new(
            vec![cluster("python", vec![0, 1, 2]), cluster("cooking", vec![3, 4, 5])],
            vec![6, 7],
        );
        assert_eq!(result.sample_count(), 8);
        assert!((result.topic_distribution["python"] - 0.375).abs() < 1e-10);
        assert!((result.topic_distribution[NOISE_LABEL] - 0.25).abs() < 1e-10);
        let total: f64 = result.topic_distribution.values().sum();
        assert!((total - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_empty_result() {
        let result = DiversityResult::new(Vec::new(), Vec::new());
        assert_eq!(result.diversity_score, 0.0);
        assert!(result.topic_distribution.is_empty());
    }
}
