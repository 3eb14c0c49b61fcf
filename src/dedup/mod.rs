//! Duplicate and near-duplicate detection over a [`Dataset`].
//!
//! Three interchangeable strategies share one cluster-construction rule:
//! pairwise "is duplicate of" edges are merged with union-find and every
//! connected component with two or more members becomes a
//! [`DuplicateCluster`]. Clusters from one run are therefore index-disjoint
//! even when the pairwise test is not transitive.
//!
//! 1. **Exact** - equal content hashes ([`exact`])
//! 2. **MinHash** - estimated Jaccard similarity of word shingles with LSH
//!    banding ([`minhash`])
//! 3. **Semantic** - cosine similarity of provider embeddings ([`semantic`])
//!
//! # Usage
//!
//! ```rust,ignore
//! use ftlint::dedup::{find_exact_duplicates, MinHashDeduplicator};
//!
//! let exact = find_exact_duplicates(&dataset);
//! let near = MinHashDeduplicator::new(0.8).find_duplicates(&dataset);
//! println!("{} redundant copies", exact.estimated_savings() + near.estimated_savings());
//! ```

pub mod exact;
pub mod minhash;
pub mod semantic;
pub mod union_find;

use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::FtlintError;

pub use exact::find_exact_duplicates;
pub use minhash::{find_minhash_duplicates, MinHashDeduplicator, MinHasher};
pub use semantic::find_semantic_duplicates;
pub use union_find::UnionFind;

/// Deduplication methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupMethod {
    Exact,
    #[serde(rename = "minhash")]
    MinHash,
    Semantic,
}

impl DedupMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupMethod::Exact => "exact",
            DedupMethod::MinHash => "minhash",
            DedupMethod::Semantic => "semantic",
        }
    }
}

impl fmt::Display for DedupMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DedupMethod {
    type Err = FtlintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(DedupMethod::Exact),
            "minhash" | "near" => Ok(DedupMethod::MinHash),
            "semantic" => Ok(DedupMethod::Semantic),
            other => Err(crate::config::ConfigError::InvalidValue {
                key: "dedup.method".to_string(),
                message: format!("unknown method '{other}'"),
            }
            .into()),
        }
    }
}

/// A cluster of duplicate or near-duplicate samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCluster {
    /// Member sample indices, ascending.
    pub indices: Vec<usize>,
    /// Lowest pairwise similarity observed between linked members (1.0 for exact).
    pub similarity: f64,
    /// Method that produced the cluster.
    pub method: DedupMethod,
}

impl DuplicateCluster {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Index kept when the cluster is collapsed to one representative.
    pub fn representative(&self) -> Option<usize> {
        self.indices.first().copied()
    }
}

/// Result of a deduplication run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DedupResult {
    /// Multi-member clusters ordered by their smallest index.
    pub clusters: Vec<DuplicateCluster>,
    /// Number of samples that belong to any multi-member cluster.
    pub total_duplicates: usize,
    /// `total_duplicates` as a percentage of the dataset size.
    pub duplicate_percentage: f64,
}

impl DedupResult {
    /// Builds a result from clusters, dropping singletons.
    pub fn from_clusters(clusters: Vec<DuplicateCluster>, sample_count: usize) -> Self {
        let mut clusters: Vec<DuplicateCluster> =
            clusters.into_iter().filter(|c| c.len() >= 2).collect();
        for cluster in &mut clusters {
            cluster.indices.sort_unstable();
        }
        clusters.sort_by_key(|c| c.indices[0]);

        let total_duplicates: usize = clusters.iter().map(DuplicateCluster::len).sum();
        let duplicate_percentage = if sample_count == 0 {
            0.0
        } else {
            total_duplicates as f64 / sample_count as f64 * 100.0
        };

        Self {
            clusters,
            total_duplicates,
            duplicate_percentage,
        }
    }

    /// Number of redundant copies: `Σ(|cluster| − 1)` over multi-member clusters.
    pub fn estimated_savings(&self) -> usize {
        self.clusters
            .iter()
            .filter(|c| c.len() > 1)
            .map(|c| c.len() - 1)
            .sum()
    }

    /// Number of duplicate pairs implied by the clusters.
    pub fn duplicate_pairs(&self) -> usize {
        self.clusters
            .iter()
            .map(|c| c.len() * (c.len() - 1) / 2)
            .sum()
    }
}

impl Serialize for DedupResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DedupResult", 4)?;
        state.serialize_field("clusters", &self.clusters)?;
        state.serialize_field("total_duplicates", &self.total_duplicates)?;
        state.serialize_field("duplicate_percentage", &self.duplicate_percentage)?;
        state.serialize_field("estimated_savings", &self.estimated_savings())?;
        state.end()
    }
}

/// Merges pairwise duplicate edges into clusters.
///
/// Each edge is `(a, b, similarity)`. A cluster's similarity is the minimum
/// over the edges inside its component.
pub fn clusters_from_edges(
    sample_count: usize,
    edges: &[(usize, usize, f64)],
    method: DedupMethod,
) -> Vec<DuplicateCluster> {
    let mut uf = UnionFind::new(sample_count);
    for &(a, b, _) in edges {
        uf.union(a, b);
    }

    let mut min_similarity = vec![f64::INFINITY; sample_count];
    for &(a, _, similarity) in edges {
        let root = uf.find(a);
        if similarity < min_similarity[root] {
            min_similarity[root] = similarity;
        }
    }

    uf.components()
        .into_iter()
        .filter(|members| members.len() >= 2)
        .map(|members| {
            let root = uf.find(members[0]);
            let similarity = if min_similarity[root].is_finite() {
                min_similarity[root].clamp(0.0, 1.0)
            } else {
                1.0
            };
            DuplicateCluster {
                indices: members,
                similarity,
                method,
            }
        })
        .collect()
}
