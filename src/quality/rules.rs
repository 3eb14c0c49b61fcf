//! Deterministic per-sample rule checks.
//!
//! FT001 empty response, FT002 truncation, FT003 encoding, FT004 structure,
//! FT005/FT006 response length and FT011 missing system message.

use rayon::prelude::*;
use serde_json::json;

use crate::dataset::{Dataset, Sample, ROLE_ASSISTANT, ROLE_SYSTEM, ROLE_TOOL, ROLE_USER};
use crate::text;

use super::{QualityIssue, QualityResult, QualityRule, RuleFilter};

/// Default upper bound on response tokens (FT005).
pub const DEFAULT_MAX_RESPONSE_TOKENS: usize = 4096;

/// Default lower bound on response tokens (FT006).
pub const DEFAULT_MIN_RESPONSE_TOKENS: usize = 1;

const DANGLING_ENDINGS: [char; 6] = [',', ':', '(', '[', '{', '-'];

/// Runs the rule-based checks over every sample.
///
/// Rules in `disabled_rules` are never evaluated.
pub fn check_quality_rules(
    dataset: &Dataset,
    disabled_rules: &[QualityRule],
    max_response_tokens: usize,
    min_response_tokens: usize,
) -> QualityResult {
    let filter = RuleFilter::new(disabled_rules.iter().copied());
    let issues: Vec<QualityIssue> = dataset
        .samples()
        .par_iter()
        .flat_map_iter(|sample| {
            check_sample(sample, &filter, max_response_tokens, min_response_tokens)
        })
        .collect();

    let result = QualityResult::new(issues);
    tracing::info!(
        samples = dataset.sample_count(),
        issues = result.issues.len(),
        errors = result.error_count(),
        "Rule checks finished"
    );
    result
}

fn check_sample(
    sample: &Sample,
    filter: &RuleFilter,
    max_response_tokens: usize,
    min_response_tokens: usize,
) -> Vec<QualityIssue> {
    let mut issues = Vec::new();
    let index = sample.index;

    let mut empty_fired = false;
    if filter.is_enabled(QualityRule::EmptyResponse) {
        if let Some(issue) = check_empty_response(sample) {
            empty_fired = true;
            issues.push(issue);
        }
    }

    if filter.is_enabled(QualityRule::Truncated) {
        issues.extend(check_truncation(sample));
    }

    if filter.is_enabled(QualityRule::EncodingError) {
        issues.extend(check_encoding(sample));
    }

    if filter.is_enabled(QualityRule::FormatError) {
        issues.extend(check_structure(sample));
    }

    let has_assistant = sample.assistant_messages().next().is_some();
    let length_rules = filter.is_enabled(QualityRule::ExcessiveLength)
        || filter.is_enabled(QualityRule::ShortResponse);
    if has_assistant && length_rules {
        let tokens: usize = sample
            .assistant_messages()
            .map(|m| text::count_tokens(&m.content))
            .sum();
        if filter.is_enabled(QualityRule::ExcessiveLength) && tokens > max_response_tokens {
            issues.push(
                QualityIssue::new(
                    QualityRule::ExcessiveLength,
                    index,
                    format!("Response has {tokens} tokens, limit is {max_response_tokens}"),
                )
                .with_details(json!({ "tokens": tokens, "limit": max_response_tokens })),
            );
        }
        if filter.is_enabled(QualityRule::ShortResponse)
            && !empty_fired
            && tokens < min_response_tokens
        {
            issues.push(
                QualityIssue::new(
                    QualityRule::ShortResponse,
                    index,
                    format!("Response has {tokens} tokens, minimum is {min_response_tokens}"),
                )
                .with_details(json!({ "tokens": tokens, "minimum": min_response_tokens })),
            );
        }
    }

    if filter.is_enabled(QualityRule::MissingSystem) && !sample.has_system() {
        issues.push(QualityIssue::new(
            QualityRule::MissingSystem,
            index,
            "Sample has no system message",
        ));
    }

    issues
}

fn check_empty_response(sample: &Sample) -> Option<QualityIssue> {
    let empty_turns: Vec<usize> = sample
        .messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_assistant() && m.content.trim().is_empty())
        .map(|(i, _)| i)
        .collect();
    if empty_turns.is_empty() {
        return None;
    }
    Some(
        QualityIssue::new(
            QualityRule::EmptyResponse,
            sample.index,
            "Assistant response is empty",
        )
        .with_details(json!({ "message_indices": empty_turns })),
    )
}

fn check_truncation(sample: &Sample) -> Option<QualityIssue> {
    let raw = sample.raw_content.trim();
    if (raw.starts_with('{') || raw.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(raw).is_err()
    {
        return Some(
            QualityIssue::new(
                QualityRule::Truncated,
                sample.index,
                "Raw record is not a complete JSON value",
            )
            .with_details(json!({ "reason": "incomplete_record" })),
        );
    }

    let last = sample.assistant_messages().last()?;
    let content = last.content.trim_end();
    if content.is_empty() {
        return None;
    }

    let reason = if content.matches("```").count() % 2 == 1 {
        "unclosed_code_fence"
    } else if content.ends_with("...") || content.ends_with('…') {
        "ellipsis"
    } else if content.ends_with(DANGLING_ENDINGS) {
        "dangling_connector"
    } else {
        return None;
    };

    let tail: String = content
        .chars()
        .rev()
        .take(40)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    Some(
        QualityIssue::new(
            QualityRule::Truncated,
            sample.index,
            "Assistant response appears truncated",
        )
        .with_details(json!({ "reason": reason, "tail": tail })),
    )
}

fn is_disallowed_char(c: char) -> bool {
    c == '\u{FFFD}' || (c.is_control() && (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r'))
}

fn check_encoding(sample: &Sample) -> Option<QualityIssue> {
    let bad_turns: Vec<usize> = sample
        .messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.content.chars().any(is_disallowed_char) || m.role.chars().any(is_disallowed_char))
        .map(|(i, _)| i)
        .collect();
    if bad_turns.is_empty() {
        return None;
    }
    let count: usize = sample
        .messages
        .iter()
        .map(|m| m.content.chars().filter(|&c| is_disallowed_char(c)).count())
        .sum();
    Some(
        QualityIssue::new(
            QualityRule::EncodingError,
            sample.index,
            "Content contains replacement or control characters",
        )
        .with_details(json!({ "message_indices": bad_turns, "bad_chars": count })),
    )
}

fn check_structure(sample: &Sample) -> Option<QualityIssue> {
    let mut problems: Vec<String> = Vec::new();
    if sample.messages.is_empty() {
        problems.push("no messages".to_string());
    } else {
        if !sample.messages.iter().any(|m| m.role == ROLE_USER) {
            problems.push("no user turn".to_string());
        }
        if !sample.messages.iter().any(|m| m.role == ROLE_ASSISTANT) {
            problems.push("no assistant turn".to_string());
        }
        for message in &sample.messages {
            let known = [ROLE_SYSTEM, ROLE_USER, ROLE_ASSISTANT, ROLE_TOOL];
            if !known.contains(&message.role.as_str()) {
                problems.push(format!("unknown role '{}'", message.role));
            }
        }
    }
    if problems.is_empty() {
        return None;
    }
    Some(
        QualityIssue::new(
            QualityRule::FormatError,
            sample.index,
            format!("Malformed sample: {}", problems.join(", ")),
        )
        .with_details(json!({ "problems": problems })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetFormat, Message};
    use crate::quality::Severity;

    fn sample(messages: Vec<Message>) -> Sample {
        let raw = serde_json::to_string(&json!({ "messages": messages })).expect("raw");
        Sample::new(messages, DatasetFormat::ChatMl, raw, 0)
    }

    fn run(samples: Vec<Sample>) -> QualityResult {
        let dataset = Dataset::new(samples, DatasetFormat::ChatMl, None);
        check_quality_rules(
            &dataset,
            &[QualityRule::MissingSystem],
            DEFAULT_MAX_RESPONSE_TOKENS,
            DEFAULT_MIN_RESPONSE_TOKENS,
        )
    }

    fn good() -> Sample {
        sample(vec![Message::user("What is Rust?"), Message::assistant("A systems language.")])
    }

    #[test]
    fn test_clean_sample_passes() {
        let result = run(vec![good()]);
        assert!(result.issues.is_empty(), "{:?}", result.issues);
        assert!(result.passed());
    }

    #[test]
    fn test_empty_response_is_single_error() {
        let result = run(vec![good(), sample(vec![Message::user("Hi"), Message::assistant("  ")])]);
        assert_eq!(result.issues.len(), 1);
        let issue = &result.issues[0];
        assert_eq!(issue.rule, QualityRule::EmptyResponse);
        assert_eq!(issue.sample_index, 1);
        assert_eq!(issue.severity, Severity::Error);
        assert!(!result.passed());
    }

    #[test]
    fn test_missing_system_reported_when_enabled() {
        let dataset = Dataset::new(vec![good()], DatasetFormat::ChatMl, None);
        let result = check_quality_rules(&dataset, &[], 4096, 1);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].rule, QualityRule::MissingSystem);
        assert!(result.passed());
    }

    #[test]
    fn test_truncation_reasons() {
        let fence = sample(vec![Message::user("code?"), Message::assistant("```rust\nfn main() {")]);
        let dangling = sample(vec![Message::user("list"), Message::assistant("First, second,")]);
        let ellipsis = sample(vec![Message::user("go on"), Message::assistant("And then...")]);
        let mut broken = good();
        broken.raw_content = r#"{"messages": [{"role": "user""#.to_string();
        let result = run(vec![fence, dangling, ellipsis, broken]);
        let reasons: Vec<&str> = result
            .issues_with(QualityRule::Truncated)
            .map(|i| i.details["reason"].as_str().unwrap_or_default())
            .collect();
        assert_eq!(
            reasons,
            vec!["unclosed_code_fence", "dangling_connector", "ellipsis", "incomplete_record"]
        );
    }

    #[test]
    fn test_encoding_error() {
        let result = run(vec![sample(vec![
            Message::user("bad \u{FFFD} bytes"),
            Message::assistant("ok\u{0007}"),
        ])]);
        let issue = result.issues_with(QualityRule::EncodingError).next().expect("FT003");
        assert_eq!(issue.details["bad_chars"], 2);
        assert_eq!(issue.details["message_indices"], json!([0, 1]));
    }

    #[test]
    fn test_structure_problems() {
        let result = run(vec![
            sample(vec![]),
            sample(vec![Message::user("only a question")]),
            sample(vec![
                Message::user("q"),
                Message::new("narrator", "x"),
                Message::assistant("a"),
            ]),
        ]);
        let messages: Vec<usize> = result
            .issues_with(QualityRule::FormatError)
            .map(|i| i.sample_index)
            .collect();
        assert_eq!(messages, vec![0, 1, 2]);
        assert!(result.issues[0].message.contains("no messages"));
    }

    #[test]
    fn test_length_limits() {
        let long = "word ".repeat(20);
        let dataset = Dataset::new(
            vec![sample(vec![Message::user("q"), Message::assistant(long.trim())]), good()],
            DatasetFormat::ChatMl,
            None,
        );
        let result = check_quality_rules(&dataset, &[QualityRule::MissingSystem], 10, 4);
        let rules: Vec<(usize, QualityRule)> =
            result.issues.iter().map(|i| (i.sample_index, i.rule)).collect();
        assert_eq!(
            rules,
            vec![(0, QualityRule::ExcessiveLength)],
            "'A systems language.' has 4 tokens"
        );
        assert_eq!(result.issues[0].details["tokens"], 20);
    }

    #[test]
    fn test_short_response_suppressed_by_empty_response() {
        let dataset = Dataset::new(
            vec![sample(vec![Message::user("q"), Message::assistant("")])],
            DatasetFormat::ChatMl,
            None,
        );
        let result = check_quality_rules(&dataset, &[QualityRule::MissingSystem], 4096, 1);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].rule, QualityRule::EmptyResponse);

        let without_ft001 = check_quality_rules(
            &dataset,
            &[QualityRule::MissingSystem, QualityRule::EmptyResponse],
            4096,
            1,
        );
        assert_eq!(without_ft001.issues.len(), 1);
        assert_eq!(without_ft001.issues[0].rule, QualityRule::ShortResponse);
    }
}
