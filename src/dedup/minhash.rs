//! Near-duplicate detection using MinHash signatures and LSH banding.
//!
//! Each sample's `raw_content` is split into overlapping word shingles.
//! `num_perm` universal hash permutations `(a·h + b) mod (2^61 − 1)` produce
//! a signature whose agreement rate estimates the Jaccard similarity of two
//! shingle sets. Signatures are bucketed band by band; only pairs sharing a
//! bucket are verified against the full signature.

use std::collections::{HashMap, HashSet};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::dataset::Dataset;
use crate::text;

use super::{clusters_from_edges, DedupMethod, DedupResult};

/// Default Jaccard threshold for near-duplicates.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Default number of hash permutations.
pub const DEFAULT_NUM_PERM: usize = 128;

/// Default shingle width in words.
pub const DEFAULT_SHINGLE_SIZE: usize = 3;

/// Seed for permutation coefficients; fixed so signatures are reproducible.
const DEFAULT_SEED: u64 = 1;

/// Below this many samples every pair is compared directly.
const DEFAULT_ALL_PAIRS_LIMIT: usize = 256;

/// Band parameters are optimized for this threshold, or the run threshold
/// when it is lower, so candidate generation does not move with the
/// threshold in the common range.
const CANDIDATE_THRESHOLD: f64 = 0.5;

const MERSENNE_PRIME: u64 = (1 << 61) - 1;
const MAX_HASH: u64 = (1 << 32) - 1;

/// Integration steps used when choosing band parameters.
const INTEGRATION_STEPS: usize = 200;

/// Produces MinHash signatures for text.
#[derive(Debug, Clone)]
pub struct MinHasher {
    shingle_size: usize,
    a: Vec<u64>,
    b: Vec<u64>,
}

impl MinHasher {
    /// Creates a hasher with `num_perm` permutations seeded by `seed`.
    pub fn new(num_perm: usize, shingle_size: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut a = Vec::with_capacity(num_perm);
        let mut b = Vec::with_capacity(num_perm);
        for _ in 0..num_perm {
            a.push(rng.random_range(1..MERSENNE_PRIME));
            b.push(rng.random_range(0..MERSENNE_PRIME));
        }
        Self {
            shingle_size: shingle_size.max(1),
            a,
            b,
        }
    }

    pub fn num_perm(&self) -> usize {
        self.a.len()
    }

    pub fn shingle_size(&self) -> usize {
        self.shingle_size
    }

    /// Distinct word shingles of `text`.
    ///
    /// Texts shorter than the shingle width yield a single shingle of all
    /// their words; empty texts yield none.
    pub fn shingles(&self, text: &str) -> HashSet<String> {
        let words = text::words(text);
        if words.is_empty() {
            return HashSet::new();
        }
        if words.len() < self.shingle_size {
            return HashSet::from([words.join(" ")]);
        }
        text::ngrams(&words, self.shingle_size).into_iter().collect()
    }

    /// Signature of `text`, or `None` when it has no shingles.
    pub fn signature(&self, text: &str) -> Option<Vec<u64>> {
        let shingles = self.shingles(text);
        if shingles.is_empty() {
            return None;
        }
        let mut signature = vec![MAX_HASH; self.num_perm()];
        for shingle in &shingles {
            let h = shingle_hash(shingle) as u128;
            for (slot, (a, b)) in signature.iter_mut().zip(self.a.iter().zip(&self.b)) {
                let permuted =
                    ((*a as u128 * h + *b as u128) % MERSENNE_PRIME as u128) as u64 & MAX_HASH;
                if permuted < *slot {
                    *slot = permuted;
                }
            }
        }
        Some(signature)
    }
}

/// Fraction of positions where two signatures agree.
pub fn estimate_jaccard(a: &[u64], b: &[u64]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let equal = a.iter().zip(b).filter(|(x, y)| x == y).count();
    equal as f64 / a.len() as f64
}

fn shingle_hash(shingle: &str) -> u32 {
    let digest = Sha256::digest(shingle.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Chooses `(bands, rows)` with `bands · rows ≤ num_perm` minimizing the
/// equally weighted false-positive and false-negative areas around
/// `threshold`.
pub fn optimal_band_params(threshold: f64, num_perm: usize) -> (usize, usize) {
    let threshold = threshold.clamp(0.0, 1.0);
    let mut best = (1, num_perm.max(1));
    let mut best_error = f64::INFINITY;
    for bands in 1..=num_perm.max(1) {
        for rows in 1..=(num_perm / bands).max(1) {
            if bands * rows > num_perm.max(1) {
                continue;
            }
            let false_positive = integrate(0.0, threshold, |s| {
                1.0 - (1.0 - s.powi(rows as i32)).powi(bands as i32)
            });
            let false_negative = integrate(threshold, 1.0, |s| {
                (1.0 - s.powi(rows as i32)).powi(bands as i32)
            });
            let error = 0.5 * false_positive + 0.5 * false_negative;
            if error < best_error {
                best_error = error;
                best = (bands, rows);
            }
        }
    }
    best
}

fn integrate(lo: f64, hi: f64, f: impl Fn(f64) -> f64) -> f64 {
    if hi <= lo {
        return 0.0;
    }
    let step = (hi - lo) / INTEGRATION_STEPS as f64;
    (0..INTEGRATION_STEPS)
        .map(|i| f(lo + (i as f64 + 0.5) * step) * step)
        .sum()
}

/// Near-duplicate detector over a dataset.
#[derive(Debug, Clone)]
pub struct MinHashDeduplicator {
    threshold: f64,
    hasher: MinHasher,
    all_pairs_limit: usize,
}

impl Default for MinHashDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl MinHashDeduplicator {
    /// Creates a detector with the default permutation count and shingle width.
    ///
    /// `threshold` is clamped to `[0, 1]`.
    pub fn new(threshold: f64) -> Self {
        Self::with_params(threshold, DEFAULT_NUM_PERM, DEFAULT_SHINGLE_SIZE)
    }

    pub fn with_params(threshold: f64, num_perm: usize, shingle_size: usize) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
            hasher: MinHasher::new(num_perm.max(1), shingle_size, DEFAULT_SEED),
            all_pairs_limit: DEFAULT_ALL_PAIRS_LIMIT,
        }
    }

    /// Sets the dataset size below which every pair is compared directly.
    pub fn with_all_pairs_limit(mut self, limit: usize) -> Self {
        self.all_pairs_limit = limit;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn hasher(&self) -> &MinHasher {
        &self.hasher
    }

    /// Signatures of every sample's `raw_content`, in sample order.
    pub fn signatures(&self, dataset: &Dataset) -> Vec<Option<Vec<u64>>> {
        dataset
            .samples()
            .par_iter()
            .map(|sample| self.hasher.signature(&sample.raw_content))
            .collect()
    }

    /// All pairs `(i, j, estimate)` with `i < j` and `estimate ≥ min_similarity`.
    pub fn similar_pairs(&self, dataset: &Dataset, min_similarity: f64) -> Vec<(usize, usize, f64)> {
        let signatures = self.signatures(dataset);
        self.pairs_above(&signatures, min_similarity)
    }

    fn pairs_above(
        &self,
        signatures: &[Option<Vec<u64>>],
        min_similarity: f64,
    ) -> Vec<(usize, usize, f64)> {
        let candidates = if signatures.len() <= self.all_pairs_limit {
            all_pairs(signatures)
        } else {
            let (bands, rows) = optimal_band_params(
                min_similarity.min(CANDIDATE_THRESHOLD),
                self.hasher.num_perm(),
            );
            lsh_candidates(signatures, bands, rows)
        };

        let mut pairs: Vec<(usize, usize, f64)> = candidates
            .par_iter()
            .filter_map(|&(i, j)| {
                let (Some(a), Some(b)) = (&signatures[i], &signatures[j]) else {
                    return None;
                };
                let estimate = estimate_jaccard(a, b);
                (estimate >= min_similarity).then_some((i, j, estimate))
            })
            .collect();
        pairs.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
        pairs
    }

    /// Finds near-duplicate clusters.
    pub fn find_duplicates(&self, dataset: &Dataset) -> DedupResult {
        let edges = self.similar_pairs(dataset, self.threshold);
        let clusters = clusters_from_edges(dataset.sample_count(), &edges, DedupMethod::MinHash);
        let result = DedupResult::from_clusters(clusters, dataset.sample_count());
        tracing::info!(
            samples = dataset.sample_count(),
            threshold = self.threshold,
            num_perm = self.hasher.num_perm(),
            pairs = edges.len(),
            clusters = result.clusters.len(),
            "MinHash dedup finished"
        );
        result
    }
}

/// Finds near-duplicate samples with the given threshold and permutation count.
pub fn find_minhash_duplicates(dataset: &Dataset, threshold: f64, num_perm: usize) -> DedupResult {
    MinHashDeduplicator::with_params(threshold, num_perm, DEFAULT_SHINGLE_SIZE)
        .find_duplicates(dataset)
}

fn all_pairs(signatures: &[Option<Vec<u64>>]) -> Vec<(usize, usize)> {
    let present: Vec<usize> = signatures
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_some())
        .map(|(i, _)| i)
        .collect();
    let mut pairs = Vec::new();
    for (pos, &i) in present.iter().enumerate() {
        for &j in &present[pos + 1..] {
            pairs.push((i, j));
        }
    }
    pairs
}

fn lsh_candidates(signatures: &[Option<Vec<u64>>], bands: usize, rows: usize) -> Vec<(usize, usize)> {
    let mut candidates: HashSet<(usize, usize)> = HashSet::new();
    for band in 0..bands {
        let range = band * rows..(band + 1) * rows;
        let mut buckets: HashMap<&[u64], Vec<usize>> = HashMap::new();
        for (index, signature) in signatures.iter().enumerate() {
            if let Some(signature) = signature {
                buckets
                    .entry(&signature[range.clone()])
                    .or_default()
                    .push(index);
            }
        }
        for members in buckets.values().filter(|m| m.len() > 1) {
            for (pos, &i) in members.iter().enumerate() {
                for &j in &members[pos + 1..] {
                    candidates.insert((i, j));
                }
            }
        }
    }
    let mut candidates: Vec<(usize, usize)> = candidates.into_iter().collect();
    candidates.sort_unstable();
    candidates
}
