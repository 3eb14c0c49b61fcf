//! Rule catalog, issues and aggregated quality results.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::config::ConfigError;

/// Quality issue severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    /// Any error fails the dataset.
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in quality rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityRule {
    #[serde(rename = "FT001")]
    EmptyResponse,
    #[serde(rename = "FT002")]
    Truncated,
    #[serde(rename = "FT003")]
    EncodingError,
    #[serde(rename = "FT004")]
    FormatError,
    #[serde(rename = "FT005")]
    ExcessiveLength,
    #[serde(rename = "FT006")]
    ShortResponse,
    #[serde(rename = "FT007")]
    HighRepetition,
    #[serde(rename = "FT008")]
    LanguageMismatch,
    #[serde(rename = "FT009")]
    PiiDetected,
    #[serde(rename = "FT010")]
    ImbalancedTurns,
    #[serde(rename = "FT011")]
    MissingSystem,
    #[serde(rename = "FT012")]
    LowDiversity,
    #[serde(rename = "FT013")]
    JudgeFlag,
}

impl QualityRule {
    pub const ALL: [QualityRule; 13] = [
        QualityRule::EmptyResponse,
        QualityRule::Truncated,
        QualityRule::EncodingError,
        QualityRule::FormatError,
        QualityRule::ExcessiveLength,
        QualityRule::ShortResponse,
        QualityRule::HighRepetition,
        QualityRule::LanguageMismatch,
        QualityRule::PiiDetected,
        QualityRule::ImbalancedTurns,
        QualityRule::MissingSystem,
        QualityRule::LowDiversity,
        QualityRule::JudgeFlag,
    ];

    /// Rule id, e.g. `FT001`.
    pub fn code(&self) -> &'static str {
        match self {
            QualityRule::EmptyResponse => "FT001",
            QualityRule::Truncated => "FT002",
            QualityRule::EncodingError => "FT003",
            QualityRule::FormatError => "FT004",
            QualityRule::ExcessiveLength => "FT005",
            QualityRule::ShortResponse => "FT006",
            QualityRule::HighRepetition => "FT007",
            QualityRule::LanguageMismatch => "FT008",
            QualityRule::PiiDetected => "FT009",
            QualityRule::ImbalancedTurns => "FT010",
            QualityRule::MissingSystem => "FT011",
            QualityRule::LowDiversity => "FT012",
            QualityRule::JudgeFlag => "FT013",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            QualityRule::EmptyResponse => "Empty response",
            QualityRule::Truncated => "Truncated content",
            QualityRule::EncodingError => "Encoding error",
            QualityRule::FormatError => "Format error",
            QualityRule::ExcessiveLength => "Excessive length",
            QualityRule::ShortResponse => "Short response",
            QualityRule::HighRepetition => "High repetition",
            QualityRule::LanguageMismatch => "Language mismatch",
            QualityRule::PiiDetected => "PII detected",
            QualityRule::ImbalancedTurns => "Imbalanced turns",
            QualityRule::MissingSystem => "Missing system message",
            QualityRule::LowDiversity => "Low diversity",
            QualityRule::JudgeFlag => "LLM judge flag",
        }
    }

    /// Severity the rule reports with unless a check says otherwise.
    pub fn default_severity(&self) -> Severity {
        match self {
            QualityRule::EmptyResponse | QualityRule::EncodingError | QualityRule::FormatError => {
                Severity::Error
            }
            QualityRule::Truncated
            | QualityRule::ExcessiveLength
            | QualityRule::ShortResponse
            | QualityRule::HighRepetition
            | QualityRule::PiiDetected
            | QualityRule::JudgeFlag => Severity::Warning,
            QualityRule::LanguageMismatch
            | QualityRule::ImbalancedTurns
            | QualityRule::MissingSystem
            | QualityRule::LowDiversity => Severity::Info,
        }
    }
}

impl fmt::Display for QualityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for QualityRule {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        QualityRule::ALL
            .into_iter()
            .find(|rule| rule.code() == wanted)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "quality.disabled_rules".to_string(),
                message: format!("unknown rule id '{s}'"),
            })
    }
}

/// A single quality finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub rule: QualityRule,
    pub severity: Severity,
    pub message: String,
    pub sample_index: usize,
    /// Structured context, always a JSON object.
    pub details: serde_json::Value,
}

impl QualityIssue {
    /// Creates an issue with the rule's default severity and empty details.
    pub fn new(rule: QualityRule, sample_index: usize, message: impl Into<String>) -> Self {
        Self {
            rule,
            severity: rule.default_severity(),
            message: message.into(),
            sample_index,
            details: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Replaces the details object. Non-object values are wrapped as `{"value": v}`.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = match details {
            serde_json::Value::Object(_) => details,
            other => serde_json::json!({ "value": other }),
        };
        self
    }
}

/// Aggregate quality check results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QualityResult {
    pub issues: Vec<QualityIssue>,
}

impl QualityResult {
    pub fn new(issues: Vec<QualityIssue>) -> Self {
        Self { issues }
    }

    pub fn push(&mut self, issue: QualityIssue) {
        self.issues.push(issue);
    }

    /// Appends `other`'s issues and re-sorts by sample index then rule.
    pub fn merge(&mut self, other: QualityResult) {
        self.issues.extend(other.issues);
        self.sort();
    }

    /// Orders issues by sample index, then rule id. Stable within a rule.
    pub fn sort(&mut self) {
        self.issues
            .sort_by(|a, b| (a.sample_index, a.rule).cmp(&(b.sample_index, b.rule)));
    }

    fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn info_count(&self) -> usize {
        self.count(Severity::Info)
    }

    /// True when there are no error-severity issues.
    pub fn passed(&self) -> bool {
        self.error_count() == 0
    }

    pub fn issues_for(&self, sample_index: usize) -> impl Iterator<Item = &QualityIssue> {
        self.issues
            .iter()
            .filter(move |i| i.sample_index == sample_index)
    }

    pub fn issues_with(&self, rule: QualityRule) -> impl Iterator<Item = &QualityIssue> {
        self.issues.iter().filter(move |i| i.rule == rule)
    }

    pub fn counts_by_rule(&self) -> BTreeMap<QualityRule, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.rule).or_insert(0) += 1;
        }
        counts
    }
}

impl Serialize for QualityResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let by_rule: BTreeMap<&'static str, usize> = self
            .counts_by_rule()
            .into_iter()
            .map(|(rule, n)| (rule.code(), n))
            .collect();
        let mut state = serializer.serialize_struct("QualityResult", 6)?;
        state.serialize_field("issues", &self.issues)?;
        state.serialize_field("error_count", &self.error_count())?;
        state.serialize_field("warning_count", &self.warning_count())?;
        state.serialize_field("info_count", &self.info_count())?;
        state.serialize_field("passed", &self.passed())?;
        state.serialize_field("counts_by_rule", &by_rule)?;
        state.end()
    }
}
