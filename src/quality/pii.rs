//! Pattern-based PII detection (FT009).
//!
//! Detection only: matches are counted and previewed in redacted form, the
//! content itself is never modified.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::dataset::{Dataset, Sample};

use super::{QualityIssue, QualityResult, QualityRule};

/// Kinds of PII the scanner recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    ApiKey,
    Email,
    CreditCard,
    Ssn,
    Phone,
}

impl PiiKind {
    /// Scan order. Earlier kinds mask their matches from later ones so a
    /// card number is not also reported as a phone number.
    pub const SCAN_ORDER: [PiiKind; 5] = [
        PiiKind::ApiKey,
        PiiKind::Email,
        PiiKind::CreditCard,
        PiiKind::Ssn,
        PiiKind::Phone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PiiKind::ApiKey => "api_key",
            PiiKind::Email => "email",
            PiiKind::CreditCard => "credit_card",
            PiiKind::Ssn => "ssn",
            PiiKind::Phone => "phone",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            PiiKind::ApiKey => "credential-like token",
            PiiKind::Email => "email address",
            PiiKind::CreditCard => "credit card number",
            PiiKind::Ssn => "social security number",
            PiiKind::Phone => "phone number",
        }
    }

    fn patterns(&self) -> &'static [Regex] {
        static API_KEY: OnceLock<Vec<Regex>> = OnceLock::new();
        static EMAIL: OnceLock<Vec<Regex>> = OnceLock::new();
        static CARD: OnceLock<Vec<Regex>> = OnceLock::new();
        static SSN: OnceLock<Vec<Regex>> = OnceLock::new();
        static PHONE: OnceLock<Vec<Regex>> = OnceLock::new();

        let (cell, sources): (&OnceLock<Vec<Regex>>, &[&str]) = match self {
            PiiKind::ApiKey => (
                &API_KEY,
                &[
                    r"\bsk-(?:proj-|ant-)?[A-Za-z0-9_-]{20,}",
                    r"\bAKIA[0-9A-Z]{16}\b",
                    r"\bgh[pousr]_[A-Za-z0-9]{36,}\b",
                    r"\bxox[bpas]-[A-Za-z0-9-]{10,}",
                    r#"(?i)\b(?:api[_-]?key|secret[_-]?key|access[_-]?token)\s*[:=]\s*["']?[A-Za-z0-9_\-]{16,}"#,
                ],
            ),
            PiiKind::Email => (
                &EMAIL,
                &[r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"],
            ),
            PiiKind::CreditCard => (&CARD, &[r"\b\d(?:[ -]?\d){12,18}\b"]),
            PiiKind::Ssn => (&SSN, &[r"\b\d{3}-\d{2}-\d{4}\b"]),
            PiiKind::Phone => (
                &PHONE,
                &[
                    r"\+\d{1,3}[ .-]?\(?\d{1,4}\)?(?:[ .-]?\d{2,4}){2,3}\b",
                    r"(?:\(\d{3}\)\s?|\b\d{3}[.-])\d{3}[.-]\d{4}\b",
                ],
            ),
        };
        cell.get_or_init(|| {
            sources
                .iter()
                .map(|p| Regex::new(p).expect("PII pattern is valid"))
                .collect()
        })
    }

    /// Extra validation beyond the regex shape.
    fn accepts(&self, matched: &str) -> bool {
        match self {
            PiiKind::CreditCard => luhn_valid(matched),
            PiiKind::Ssn => ssn_valid(matched),
            _ => true,
        }
    }
}

impl fmt::Display for PiiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Luhn checksum over the digits of `candidate`, requiring 13-19 digits.
pub fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

fn ssn_valid(candidate: &str) -> bool {
    let parts: Vec<&str> = candidate.split('-').collect();
    let [area, group, serial] = parts.as_slice() else {
        return false;
    };
    !(*area == "000" || *area == "666" || area.starts_with('9') || *group == "00" || *serial == "0000")
}

/// Keeps the first and last two characters of a match.
pub fn redact(matched: &str) -> String {
    let chars: Vec<char> = matched.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 4))
}

/// Finds PII in `text`, grouped by kind, in scan order.
pub fn scan_text(text: &str) -> BTreeMap<PiiKind, Vec<String>> {
    let mut masked = text.to_string();
    let mut found: BTreeMap<PiiKind, Vec<String>> = BTreeMap::new();
    for kind in PiiKind::SCAN_ORDER {
        let mut spans = Vec::new();
        for pattern in kind.patterns() {
            for m in pattern.find_iter(&masked) {
                if kind.accepts(m.as_str()) {
                    spans.push((m.start(), m.end()));
                    found.entry(kind).or_default().push(m.as_str().to_string());
                }
            }
            for &(start, end) in &spans {
                masked.replace_range(start..end, &" ".repeat(end - start));
            }
            spans.clear();
        }
    }
    found
}

fn scan_sample(sample: &Sample) -> Vec<QualityIssue> {
    let mut by_kind: BTreeMap<PiiKind, (Vec<String>, Vec<usize>)> = BTreeMap::new();
    for (message_index, message) in sample.messages.iter().enumerate() {
        for (kind, matches) in scan_text(&message.content) {
            let entry = by_kind.entry(kind).or_default();
            entry.0.extend(matches);
            entry.1.push(message_index);
        }
    }

    by_kind
        .into_iter()
        .map(|(kind, (matches, messages))| {
            QualityIssue::new(
                QualityRule::PiiDetected,
                sample.index,
                format!("Possible {} found ({} match(es))", kind.description(), matches.len()),
            )
            .with_details(json!({
                "kind": kind.as_str(),
                "count": matches.len(),
                "preview": matches.first().map(|m| redact(m)),
                "message_indices": messages,
            }))
        })
        .collect()
}

/// Scans every message of every sample for PII.
///
/// Emits one warning per (sample, kind).
pub fn detect_pii(dataset: &Dataset) -> QualityResult {
    let issues: Vec<QualityIssue> = dataset
        .samples()
        .par_iter()
        .flat_map_iter(scan_sample)
        .collect();
    let result = QualityResult::new(issues);
    tracing::info!(
        samples = dataset.sample_count(),
        findings = result.issues.len(),
        "PII scan finished"
    );
    result
}
