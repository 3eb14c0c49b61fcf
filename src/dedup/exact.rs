//! Exact duplicate detection using content hashing.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::dataset::Dataset;

use super::{DedupMethod, DedupResult, DuplicateCluster};

/// Finds samples whose `raw_content` hashes are identical.
///
/// Hash equality is already an equivalence relation, so samples are grouped
/// by hash directly instead of going through pairwise edges.
pub fn find_exact_duplicates(dataset: &Dataset) -> DedupResult {
    let hashes: Vec<String> = dataset
        .samples()
        .par_iter()
        .map(|sample| sample.content_hash())
        .collect();

    let mut slot_by_hash: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (index, hash) in hashes.iter().enumerate() {
        let slot = *slot_by_hash.entry(hash.as_str()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(index);
    }

    let clusters = groups
        .into_iter()
        .filter(|g| g.len() >= 2)
        .map(|indices| DuplicateCluster {
            indices,
            similarity: 1.0,
            method: DedupMethod::Exact,
        })
        .collect();

    let result = DedupResult::from_clusters(clusters, dataset.sample_count());
    tracing::info!(
        samples = dataset.sample_count(),
        clusters = result.clusters.len(),
        duplicates = result.total_duplicates,
        "Exact dedup finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetFormat, Message, Sample};

    fn dataset(raws: &[&str]) -> Dataset {
        let samples = raws
            .iter()
            .map(|raw| {
                Sample::new(
                    vec![Message::user("q"), Message::assistant("a")],
                    DatasetFormat::ChatMl,
                    *raw,
                    0,
                )
            })
            .collect();
        Dataset::new(samples, DatasetFormat::ChatMl, None)
    }

    #[test]
    fn test_no_duplicates() {
        let result = find_exact_duplicates(&dataset(&["a", "b", "c"]));
        assert_eq!(result.total_duplicates, 0);
        assert!(result.clusters.is_empty());
    }

    #[test]
    fn test_groups_identical_raw_content() {
        let result = find_exact_duplicates(&dataset(&["x", "y", "x", "z", "y", "x"]));
        assert_eq!(result.clusters.len(), 2);
        assert_eq!(result.clusters[0].indices, vec![0, 2, 5]);
        assert_eq!(result.clusters[1].indices, vec![1, 4]);
        assert!(result
            .clusters
            .iter()
            .all(|c| c.similarity == 1.0 && c.method == DedupMethod::Exact));
        assert_eq!(result.total_duplicates, 5);
        assert_eq!(result.estimated_savings(), 3);
    }

    #[test]
    fn test_whitespace_difference_is_not_exact_duplicate() {
        let result = find_exact_duplicates(&dataset(&["{\"a\":1}", "{\"a\": 1}"]));
        assert!(result.clusters.is_empty());
    }
}
