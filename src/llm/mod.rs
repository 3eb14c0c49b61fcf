//! LLM-as-judge capability.
//!
//! The quality engine asks a [`JudgeProvider`] to rate single samples. The
//! crate ships [`ChatJudge`], a client for OpenAI-compatible
//! `/chat/completions` endpoints (OpenAI, OpenRouter, LiteLLM, vLLM).
//!
//! ```ignore
//! use ftlint::llm::ChatJudge;
//!
//! let judge = ChatJudge::from_env()?;
//! let verdict = judge.judge(&sample, "claude-sonnet-4-5-20250929").await?;
//! println!("score {}: {:?}", verdict.score, verdict.reasons);
//! ```

mod chat;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dataset::Sample;
use crate::error::{FtlintError, Result};

pub use chat::{ChatJudge, JUDGE_SYSTEM_PROMPT};

/// Default model identifier for judge requests.
pub const DEFAULT_JUDGE_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Lowest and highest scores a judge may return.
pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

/// A judge's assessment of one sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    /// Overall quality from 1 (unusable) to 5 (excellent).
    pub score: u8,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl JudgeVerdict {
    /// Extracts a verdict from model output.
    ///
    /// Accepts a bare JSON object or one embedded in surrounding prose or a
    /// code fence. Scores outside `1..=5` are rejected.
    pub fn parse(provider: &str, output: &str) -> Result<Self> {
        let start = output.find('{');
        let end = output.rfind('}');
        let json = match (start, end) {
            (Some(s), Some(e)) if s < e => &output[s..=e],
            _ => {
                return Err(FtlintError::provider(
                    provider,
                    "judge reply contains no JSON object",
                ))
            }
        };
        let verdict: JudgeVerdict = serde_json::from_str(json)
            .map_err(|e| FtlintError::provider(provider, format!("invalid judge reply: {e}")))?;
        if !(MIN_SCORE..=MAX_SCORE).contains(&verdict.score) {
            return Err(FtlintError::provider(
                provider,
                format!("judge score {} outside {MIN_SCORE}..={MAX_SCORE}", verdict.score),
            ));
        }
        Ok(verdict)
    }
}

/// Rates the quality of a single training sample.
#[async_trait]
pub trait JudgeProvider: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Judges `sample` with the given model identifier.
    async fn judge(&self, sample: &Sample, model: &str) -> Result<JudgeVerdict>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_json() {
        let verdict = JudgeVerdict::parse("t", r#"{"score": 4, "reasons": ["clear"]}"#).expect("parse");
        assert_eq!(verdict.score, 4);
        assert_eq!(verdict.reasons, vec!["clear"]);
    }

    #[test]
    fn test_parse_fenced_json_without_reasons() {
        let reply = "Here is my rating:\n```json\n{\"score\": 2}\n```";
        let verdict = JudgeVerdict::parse("t", reply).expect("parse");
        assert_eq!(verdict.score, 2);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_parse_rejects_out_of_range_score() {
        let err = JudgeVerdict::parse("t", r#"{"score": 9}"#).unwrap_err();
        assert!(err.to_string().contains("outside"));
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(JudgeVerdict::parse("t", "looks fine to me").is_err());
    }
}
