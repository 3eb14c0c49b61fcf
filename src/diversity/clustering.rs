//! Topic clustering over sample embeddings.

use std::collections::HashMap;
use std::time::Duration;

use ndarray::Array2;

use crate::dataset::Dataset;
use crate::error::{FtlintError, Result};
use crate::text;

use super::embeddings::{cosine_similarity, validate_embeddings, EmbeddingProvider};
use super::{DiversityResult, TopicCluster};

/// Default cosine similarity a sample needs to join a cluster leader.
pub const DEFAULT_JOIN_SIMILARITY: f64 = 0.75;

/// Default minimum members for a cluster to survive.
pub const DEFAULT_MIN_CLUSTER_SIZE: usize = 5;

const SUMMARY_CHARS: usize = 80;
const LABEL_WORDS: usize = 3;

/// Cluster assignment returned by a [`TopicClusterer`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterAssignment {
    /// Cluster id per sample, `None` for noise.
    pub labels: Vec<Option<usize>>,
    /// Human-readable label per cluster id.
    pub names: Vec<String>,
    /// Most central sample per cluster id.
    pub centers: Vec<usize>,
}

/// Groups embedded samples into topics.
pub trait TopicClusterer: Send + Sync {
    fn name(&self) -> &str;

    /// Assigns each row of `embeddings` to a cluster or to noise.
    ///
    /// `texts[i]` is the text row `i` was embedded from. Clusters with fewer
    /// than `min_cluster_size` members must be reported as noise.
    fn cluster(
        &self,
        embeddings: &Array2<f64>,
        texts: &[String],
        min_cluster_size: usize,
    ) -> Result<ClusterAssignment>;
}

/// Single-pass leader clustering on cosine similarity.
///
/// Each sample joins the first leader it is at least `join_similarity`
/// similar to, otherwise it starts a new cluster. Labels are the most
/// frequent content words of the cluster's texts.
#[derive(Debug, Clone)]
pub struct GreedyCosineClusterer {
    join_similarity: f64,
}

impl Default for GreedyCosineClusterer {
    fn default() -> Self {
        Self::new(DEFAULT_JOIN_SIMILARITY)
    }
}

impl GreedyCosineClusterer {
    pub fn new(join_similarity: f64) -> Self {
        Self { join_similarity }
    }
}

impl TopicClusterer for GreedyCosineClusterer {
    fn name(&self) -> &str {
        "greedy-cosine"
    }

    fn cluster(
        &self,
        embeddings: &Array2<f64>,
        texts: &[String],
        min_cluster_size: usize,
    ) -> Result<ClusterAssignment> {
        if embeddings.nrows() != texts.len() {
            return Err(FtlintError::provider(
                self.name(),
                format!("{} embeddings for {} texts", embeddings.nrows(), texts.len()),
            ));
        }

        let mut leaders: Vec<usize> = Vec::new();
        let mut members: Vec<Vec<usize>> = Vec::new();
        for i in 0..embeddings.nrows() {
            let row = embeddings.row(i);
            let joined = leaders
                .iter()
                .position(|&l| cosine_similarity(row, embeddings.row(l)) >= self.join_similarity);
            match joined {
                Some(slot) => members[slot].push(i),
                None => {
                    leaders.push(i);
                    members.push(vec![i]);
                }
            }
        }

        let mut assignment = ClusterAssignment {
            labels: vec![None; texts.len()],
            ..Default::default()
        };
        for (leader, group) in leaders.into_iter().zip(members) {
            if group.len() < min_cluster_size.max(1) {
                continue;
            }
            let id = assignment.names.len();
            for &i in &group {
                assignment.labels[i] = Some(id);
            }
            assignment.names.push(label_for(&group, texts, id));
            assignment.centers.push(leader);
        }
        Ok(assignment)
    }
}

fn label_for(group: &[usize], texts: &[String], id: usize) -> String {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = 0;
    for &i in group {
        for word in text::words(&texts[i]) {
            if word.chars().count() < 4 || word.chars().all(|c| c.is_numeric()) {
                continue;
            }
            let entry = counts.entry(word).or_insert((0, order));
            entry.0 += 1;
            order += 1;
        }
    }
    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    let top: Vec<String> = ranked.into_iter().take(LABEL_WORDS).map(|(w, _)| w).collect();
    if top.is_empty() {
        format!("topic-{id}")
    } else {
        top.join(" / ")
    }
}

/// Embeds every sample and clusters the vectors into topics.
///
/// Fails with [`FtlintError::SemanticUnavailable`] before any work when no
/// embedder is supplied.
pub async fn cluster_topics(
    dataset: &Dataset,
    embedder: Option<&dyn EmbeddingProvider>,
    clusterer: &dyn TopicClusterer,
    min_cluster_size: usize,
    timeout: Duration,
) -> Result<DiversityResult> {
    let embedder = embedder.ok_or(FtlintError::SemanticUnavailable)?;

    let texts: Vec<String> = dataset.iter().map(|s| s.text()).collect();
    let embeddings = tokio::time::timeout(timeout, embedder.embed(&texts))
        .await
        .map_err(|_| {
            FtlintError::provider(
                embedder.name(),
                format!("timed out after {}s", timeout.as_secs_f64()),
            )
        })??;
    validate_embeddings(embedder, &embeddings, texts.len())?;

    let assignment = clusterer.cluster(&embeddings, &texts, min_cluster_size)?;

    let mut clusters: Vec<TopicCluster> = assignment
        .names
        .iter()
        .enumerate()
        .map(|(id, name)| TopicCluster {
            label: name.clone(),
            sample_indices: Vec::new(),
            centroid_summary: assignment
                .centers
                .get(id)
                .and_then(|&c| texts.get(c))
                .map(|t| summarize(t))
                .unwrap_or_default(),
        })
        .collect();
    let mut noise = Vec::new();
    for (index, label) in assignment.labels.iter().enumerate() {
        match label.and_then(|id| clusters.get_mut(id)) {
            Some(cluster) => cluster.sample_indices.push(index),
            None => noise.push(index),
        }
    }
    clusters.retain(|c| !c.sample_indices.is_empty());

    let result = DiversityResult::new(clusters, noise);
    tracing::info!(
        samples = dataset.sample_count(),
        clusterer = clusterer.name(),
        clusters = result.clusters.len(),
        noise = result.noise_indices.len(),
        score = result.diversity_score,
        "Topic clustering finished"
    );
    Ok(result)
}

fn summarize(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SUMMARY_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(SUMMARY_CHARS).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetFormat, Message, Sample};
    use crate::diversity::HashEmbedder;
    use ndarray::array;

    fn dataset(prompts: &[&str]) -> Dataset {
        let samples = prompts
            .iter()
            .map(|p| {
                Sample::new(
                    vec![Message::user(*p), Message::assistant("Sure.")],
                    DatasetFormat::ChatMl,
                    *p,
                    0,
                )
            })
            .collect();
        Dataset::new(samples, DatasetFormat::ChatMl, None)
    }

    #[test]
    fn test_greedy_clusterer_groups_by_direction() {
        let m = array![[1.0, 0.0], [0.0, 1.0], [0.95, 0.1], [0.1, 0.95], [0.9, 0.2], [-1.0, 0.0]];
        let texts: Vec<String> = (0..6).map(|i| format!("text {i}")).collect();
        let assignment = GreedyCosineClusterer::default()
            .cluster(&m, &texts, 2)
            .expect("cluster");
        assert_eq!(
            assignment.labels,
            vec![Some(0), Some(1), Some(0), Some(1), Some(0), None]
        );
        assert_eq!(assignment.centers, vec![0, 1]);
    }

    #[test]
    fn test_label_uses_frequent_words() {
        let texts = vec![
            "python lists and python loops".to_string(),
            "python dictionaries".to_string(),
        ];
        assert!(label_for(&[0, 1], &texts, 0).starts_with("python"));
        assert_eq!(label_for(&[0], &["a an".to_string()], 3), "topic-3");
    }

    #[tokio::test]
    async fn test_cluster_topics_requires_embedder() {
        let err = cluster_topics(
            &dataset(&["a"]),
            None,
            &GreedyCosineClusterer::default(),
            1,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FtlintError::SemanticUnavailable));
    }

    #[tokio::test]
    async fn test_cluster_topics_end_to_end() {
        let data = dataset(&[
            "How do I sort a list in Python",
            "How do I sort a list in Python quickly",
            "Give me a recipe for banana bread",
            "Give me a recipe for banana bread please",
            "What is the capital of Mongolia",
        ]);
        let embedder = HashEmbedder::default();
        let result = cluster_topics(
            &data,
            Some(&embedder),
            &GreedyCosineClusterer::default(),
            2,
            Duration::from_secs(5),
        )
        .await
        .expect("clusters");
        assert_eq!(result.clusters.len(), 2);
        assert_eq!(result.clusters[0].sample_indices, vec![0, 1]);
        assert_eq!(result.clusters[1].sample_indices, vec![2, 3]);
        assert_eq!(result.noise_indices, vec![4]);
        assert!(result.diversity_score > 0.0 && result.diversity_score <= 1.0);
    }
}
