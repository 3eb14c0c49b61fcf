//! Optional LLM-as-judge scoring (FT013).

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use tokio::sync::Semaphore;

use crate::dataset::Dataset;
use crate::error::{FtlintError, Result};
use crate::llm::{JudgeProvider, JudgeVerdict};

use super::{QualityIssue, QualityResult, QualityRule, Severity};

/// Seed for choosing which samples to judge.
pub const DEFAULT_SAMPLE_SEED: u64 = 42;

/// Scores at or below this are warnings.
const WARNING_MAX_SCORE: u8 = 2;

/// Scores equal to this are informational.
const INFO_SCORE: u8 = 3;

/// Limits applied to judge calls.
#[derive(Debug, Clone)]
pub struct JudgeSettings {
    /// Identifier passed to the judge.
    pub model: String,
    /// Number of samples to judge; `None` judges all.
    pub sample_size: Option<usize>,
    /// Maximum judge calls in flight.
    pub max_concurrency: usize,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Seed for sample selection.
    pub seed: u64,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            model: crate::llm::DEFAULT_JUDGE_MODEL.to_string(),
            sample_size: None,
            max_concurrency: 4,
            timeout: Duration::from_secs(60),
            seed: DEFAULT_SAMPLE_SEED,
        }
    }
}

/// Indices to judge: all of them, or a seeded random subset in ascending order.
pub fn select_samples(sample_count: usize, sample_size: Option<usize>, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..sample_count).collect();
    match sample_size {
        Some(k) if k < sample_count => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            indices.shuffle(&mut rng);
            indices.truncate(k);
            indices.sort_unstable();
            indices
        }
        _ => indices,
    }
}

fn verdict_issue(index: usize, verdict: &JudgeVerdict, model: &str) -> Option<QualityIssue> {
    let severity = if verdict.score <= WARNING_MAX_SCORE {
        Severity::Warning
    } else if verdict.score == INFO_SCORE {
        Severity::Info
    } else {
        return None;
    };
    let summary = if verdict.reasons.is_empty() {
        String::new()
    } else {
        format!(": {}", verdict.reasons.join("; "))
    };
    Some(
        QualityIssue::new(
            QualityRule::JudgeFlag,
            index,
            format!("Judge scored {}/5{}", verdict.score, summary),
        )
        .with_severity(severity)
        .with_details(json!({
            "score": verdict.score,
            "reasons": verdict.reasons,
            "model": model,
        })),
    )
}

/// Scores samples with an injected judge.
///
/// Fails with [`FtlintError::LlmUnavailable`] before any work when `judge`
/// is `None`. A failed or timed-out call only skips that sample.
pub async fn score_with_llm(
    dataset: &Dataset,
    judge: Option<Arc<dyn JudgeProvider>>,
    settings: &JudgeSettings,
) -> Result<QualityResult> {
    let judge = judge.ok_or(FtlintError::LlmUnavailable)?;

    let selected = select_samples(dataset.sample_count(), settings.sample_size, settings.seed);
    let semaphore = Arc::new(Semaphore::new(settings.max_concurrency.max(1)));

    let mut futures = Vec::with_capacity(selected.len());
    for &index in &selected {
        let Some(sample) = dataset.get(index) else {
            continue;
        };
        let sem = semaphore.clone();
        let judge = judge.clone();
        let model = settings.model.as_str();
        let timeout = settings.timeout;
        futures.push(async move {
            let _permit = sem
                .acquire()
                .await
                .map_err(|e| FtlintError::provider(judge.name(), e))?;
            match tokio::time::timeout(timeout, judge.judge(sample, model)).await {
                Ok(verdict) => verdict.map(|v| (index, v)),
                Err(_) => Err(FtlintError::provider(
                    judge.name(),
                    format!("timed out after {}s", timeout.as_secs_f64()),
                )),
            }
        });
    }
    let outcomes = futures::future::join_all(futures).await;

    let mut result = QualityResult::default();
    let mut failures = 0usize;
    for outcome in outcomes {
        match outcome {
            Ok((index, verdict)) => {
                tracing::debug!(sample = index, score = verdict.score, "Judge verdict");
                result.issues.extend(verdict_issue(index, &verdict, &settings.model));
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(provider = judge.name(), error = %e, "Judge call failed, sample skipped");
            }
        }
    }
    result.sort();

    tracing::info!(
        provider = judge.name(),
        model = %settings.model,
        judged = selected.len() - failures,
        failed = failures,
        flagged = result.issues.len(),
        "LLM judge scoring finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetFormat, Message, Sample};
    use async_trait::async_trait;

    /// Scores a sample by the number at the start of its user message.
    struct DigitJudge;

    #[async_trait]
    impl JudgeProvider for DigitJudge {
        fn name(&self) -> &str {
            "digit"
        }

        async fn judge(&self, sample: &Sample, _model: &str) -> Result<JudgeVerdict> {
            let first = sample.messages[0].content.chars().next().unwrap_or('0');
            match first.to_digit(10) {
                Some(0) => Err(FtlintError::provider("digit", "boom")),
                Some(9) => {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(JudgeVerdict { score: 5, reasons: vec![] })
                }
                Some(d) => Ok(JudgeVerdict {
                    score: d as u8,
                    reasons: vec![format!("digit {d}")],
                }),
                None => Err(FtlintError::provider("digit", "no digit")),
            }
        }
    }

    fn dataset(prompts: &[&str]) -> Dataset {
        let samples = prompts
            .iter()
            .map(|p| {
                Sample::new(
                    vec![Message::user(*p), Message::assistant("ok")],
                    DatasetFormat::ChatMl,
                    *p,
                    0,
                )
            })
            .collect();
        Dataset::new(samples, DatasetFormat::ChatMl, None)
    }

    #[tokio::test]
    async fn test_missing_judge_fails_fast() {
        let err = score_with_llm(&dataset(&["1"]), None, &JudgeSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FtlintError::LlmUnavailable));
    }

    #[tokio::test]
    async fn test_scores_map_to_severities() {
        let data = dataset(&["1", "2", "3", "4", "5"]);
        let result = score_with_llm(&data, Some(Arc::new(DigitJudge)), &JudgeSettings::default())
            .await
            .expect("scores");
        let flagged: Vec<(usize, Severity)> =
            result.issues.iter().map(|i| (i.sample_index, i.severity)).collect();
        assert_eq!(
            flagged,
            vec![(0, Severity::Warning), (1, Severity::Warning), (2, Severity::Info)]
        );
        assert!(result.issues.iter().all(|i| i.rule == QualityRule::JudgeFlag));
        assert!(result.passed());
    }

    #[tokio::test]
    async fn test_failures_and_timeouts_skip_sample() {
        let data = dataset(&["0", "9", "2"]);
        let settings = JudgeSettings {
            timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let result = score_with_llm(&data, Some(Arc::new(DigitJudge)), &settings)
            .await
            .expect("scores");
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].sample_index, 2);
    }

    #[test]
    fn test_select_samples_is_seeded_subset() {
        let a = select_samples(100, Some(10), 7);
        let b = select_samples(100, Some(10), 7);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(select_samples(3, Some(10), 7), vec![0, 1, 2]);
        assert_eq!(select_samples(3, None, 7), vec![0, 1, 2]);
    }
}
