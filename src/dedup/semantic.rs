//! Semantic duplicate detection over provider embeddings.

use std::time::Duration;

use crate::dataset::Dataset;
use crate::diversity::embeddings::{similar_rows, validate_embeddings, EmbeddingProvider};
use crate::error::{FtlintError, Result};

use super::{clusters_from_edges, DedupMethod, DedupResult};

/// Default cosine threshold for semantic duplicates.
pub const DEFAULT_THRESHOLD: f64 = 0.9;

/// Embeds every sample once and links pairs with cosine ≥ `threshold`.
///
/// Fails with [`FtlintError::SemanticUnavailable`] before touching the
/// dataset when `provider` is `None`. A provider call exceeding `timeout`
/// or returning malformed vectors fails the whole run.
pub async fn find_semantic_duplicates(
    dataset: &Dataset,
    provider: Option<&dyn EmbeddingProvider>,
    threshold: f64,
    timeout: Duration,
) -> Result<DedupResult> {
    let provider = provider.ok_or(FtlintError::SemanticUnavailable)?;

    let texts: Vec<String> = dataset.iter().map(|s| s.text()).collect();
    let embeddings = tokio::time::timeout(timeout, provider.embed(&texts))
        .await
        .map_err(|_| {
            tracing::warn!(provider = provider.name(), "Embedding call timed out");
            FtlintError::provider(
                provider.name(),
                format!("timed out after {}s", timeout.as_secs_f64()),
            )
        })??;
    validate_embeddings(provider, &embeddings, texts.len())?;

    let threshold = threshold.clamp(-1.0, 1.0);
    let edges = similar_rows(&embeddings, threshold);
    let clusters = clusters_from_edges(dataset.sample_count(), &edges, DedupMethod::Semantic);
    let result = DedupResult::from_clusters(clusters, dataset.sample_count());
    tracing::info!(
        samples = dataset.sample_count(),
        provider = provider.name(),
        threshold,
        clusters = result.clusters.len(),
        "Semantic dedup finished"
    );
    Ok(result)
}
