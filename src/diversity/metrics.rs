//! Entropy-based diversity metrics.

use super::DiversityResult;

/// Shannon entropy (natural log) of a count distribution.
///
/// Zero counts are ignored; an empty or all-zero distribution has entropy 0.
pub fn shannon_entropy(counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }

    let total_f = total as f64;

    counts
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total_f;
            -p * p.ln()
        })
        .sum()
}

/// Entropy divided by its maximum `ln(k)` for `k` non-empty buckets, in `[0, 1]`.
pub fn normalized_entropy(counts: &[usize]) -> f64 {
    let buckets = counts.iter().filter(|&&c| c > 0).count();
    let max_entropy = (buckets as f64).ln();

    if max_entropy > 0.0 {
        (shannon_entropy(counts) / max_entropy).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Diversity score of a clustering, in `[0, 1]`.
///
/// Each cluster is one bucket and every noise sample is a bucket of its own,
/// so unclustered samples read as maximally diverse. A single topic scores 0.
pub fn compute_diversity_score(result: &DiversityResult) -> f64 {
    let mut counts: Vec<usize> = result.clusters.iter().map(|c| c.size()).collect();
    counts.extend(std::iter::repeat(1).take(result.noise_indices.len()));
    normalized_entropy(&counts)
}
