//! Embedding capability and vector similarity helpers.
//!
//! Semantic dedup and topic clustering both consume an [`EmbeddingProvider`].
//! The crate ships [`HashEmbedder`], a deterministic hash-feature embedder
//! that needs no model. Real model-backed providers implement the same trait.

use async_trait::async_trait;
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::error::{FtlintError, Result};

/// Default embedding dimension for the hash embedder.
pub const DEFAULT_DIMENSION: usize = 128;

/// Produces one fixed-dimension vector per input text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Embeds `texts`. Row `i` of the result is the vector for `texts[i]`.
    async fn embed(&self, texts: &[String]) -> Result<Array2<f64>>;
}

/// Checks that a provider returned one row of the declared width per text.
pub fn validate_embeddings(
    provider: &dyn EmbeddingProvider,
    embeddings: &Array2<f64>,
    expected_rows: usize,
) -> Result<()> {
    if embeddings.nrows() != expected_rows {
        return Err(FtlintError::provider(
            provider.name(),
            format!(
                "returned {} vectors for {} texts",
                embeddings.nrows(),
                expected_rows
            ),
        ));
    }
    if embeddings.ncols() != provider.dimension() {
        return Err(FtlintError::provider(
            provider.name(),
            format!(
                "returned vectors of length {}, expected {}",
                embeddings.ncols(),
                provider.dimension()
            ),
        ));
    }
    Ok(())
}

/// Hash-feature text embedder.
///
/// Half the vector holds hashed word frequencies, a quarter holds hashed
/// character trigrams and the tail holds simple length statistics. Vectors
/// are L2-normalized, so texts with the same words score close to 1.0.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashEmbedder {
    /// Creates an embedder producing vectors of `dimension` (at least 8).
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    /// Embeds a single text. Empty text yields the zero vector.
    pub fn embed_text(&self, text: &str) -> Array1<f64> {
        let mut embedding = Array1::zeros(self.dimension);
        if text.trim().is_empty() {
            return embedding;
        }

        let text_lower = text.to_lowercase();

        let words: Vec<&str> = text_lower.split_whitespace().collect();
        let word_dim = self.dimension / 2;
        for word in &words {
            let pos = hash_to_index(word, word_dim);
            embedding[pos] += 1.0 / words.len() as f64;
        }

        let offset = word_dim;
        let trigram_dim = self.dimension / 4;
        let chars: Vec<char> = text_lower.chars().collect();
        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            let pos = offset + hash_to_index(&trigram, trigram_dim);
            embedding[pos] += 1.0 / (chars.len() - 2) as f64;
        }

        let stats_offset = offset + trigram_dim;
        let remaining = self.dimension - stats_offset;
        if remaining > 0 {
            embedding[stats_offset] = (text.len() as f64 / 1000.0).min(1.0) * 0.1;
        }
        if remaining > 1 {
            embedding[stats_offset + 1] = (words.len() as f64 / 200.0).min(1.0) * 0.1;
        }
        if remaining > 2 {
            let avg_word_len = words.iter().map(|w| w.chars().count()).sum::<usize>() as f64
                / words.len() as f64;
            embedding[stats_offset + 2] = (avg_word_len / 10.0).min(1.0) * 0.1;
        }

        normalize(&mut embedding);
        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Array2<f64>> {
        let rows: Vec<Array1<f64>> = texts.par_iter().map(|t| self.embed_text(t)).collect();
        let mut result = Array2::zeros((texts.len(), self.dimension));
        for (i, row) in rows.iter().enumerate() {
            result.row_mut(i).assign(row);
        }
        Ok(result)
    }
}

fn hash_to_index(input: &str, max_index: usize) -> usize {
    if max_index == 0 {
        return 0;
    }
    let hash_bytes = Sha256::digest(input.as_bytes());
    let hash_val = u32::from_be_bytes([hash_bytes[0], hash_bytes[1], hash_bytes[2], hash_bytes[3]]);
    hash_val as usize % max_index
}

fn normalize(v: &mut Array1<f64>) {
    let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 1e-10 {
        v.mapv_inplace(|x| x / norm);
    }
}

/// Cosine similarity in `[-1, 1]`; 0.0 when either vector is zero.
pub fn cosine_similarity(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let dot_product = a.dot(&b);
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();

    if norm_a < 1e-10 || norm_b < 1e-10 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// All row pairs `(i, j, cosine)` with `i < j` and `cosine ≥ threshold`.
pub fn similar_rows(embeddings: &Array2<f64>, threshold: f64) -> Vec<(usize, usize, f64)> {
    let n = embeddings.nrows();
    (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            let row_i = embeddings.row(i);
            ((i + 1)..n).filter_map(move |j| {
                let sim = cosine_similarity(row_i, embeddings.row(j));
                (sim >= threshold).then_some((i, j, sim))
            })
        })
        .collect()
}
