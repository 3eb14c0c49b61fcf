//! Per-sample language detection.

use std::collections::{BTreeMap, HashMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::text;

/// Language code for samples nothing could be detected in.
pub const UNDETERMINED: &str = "und";

/// Detects the language of a piece of text.
pub trait LanguageDetector: Send + Sync {
    fn name(&self) -> &str;

    /// ISO 639-1 code, or `None` when the text gives no signal.
    fn detect(&self, text: &str) -> Option<String>;
}

/// Language distribution over a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageProfile {
    /// Sample count per language code, undetected samples under `und`.
    pub languages: BTreeMap<String, usize>,
    pub primary_language: Option<String>,
    /// Share of samples in the primary language, 0-100.
    pub primary_percentage: f64,
}

const STOPWORDS: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "the", "and", "is", "are", "of", "to", "in", "that", "it", "with", "for", "this",
            "you", "was", "be", "have", "not", "on", "what", "how", "can", "do", "would",
        ],
    ),
    (
        "es",
        &[
            "el", "la", "los", "las", "de", "que", "y", "en", "un", "una", "es", "por", "para",
            "con", "no", "se", "del", "como", "pero", "está", "muy", "porque",
        ],
    ),
    (
        "fr",
        &[
            "le", "la", "les", "de", "des", "et", "est", "un", "une", "que", "qui", "dans",
            "pour", "pas", "sur", "avec", "ce", "je", "vous", "il", "nous", "être", "ne",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "das", "und", "ist", "nicht", "ein", "eine", "zu", "den", "mit", "von",
            "ich", "sie", "auf", "für", "es", "auch", "sich", "dem", "wie", "oder",
        ],
    ),
    (
        "pt",
        &[
            "o", "os", "as", "de", "que", "e", "do", "da", "em", "um", "uma", "é", "não", "para",
            "com", "por", "mais", "como", "dos", "das", "você",
        ],
    ),
    (
        "it",
        &[
            "il", "lo", "gli", "di", "che", "e", "è", "un", "una", "per", "non", "sono", "con",
            "del", "della", "come", "anche", "ma", "questo", "io",
        ],
    ),
    (
        "nl",
        &[
            "de", "het", "een", "en", "van", "is", "dat", "niet", "op", "te", "zijn", "met",
            "voor", "ik", "je", "wat", "ook", "maar", "naar", "er",
        ],
    ),
];

/// Detector scoring text by stop-word hits per language.
///
/// The language with the most hits wins; earlier languages win ties.
pub struct StopwordDetector {
    languages: Vec<(&'static str, HashSet<&'static str>)>,
    min_hits: usize,
}

impl StopwordDetector {
    pub fn new() -> Self {
        Self {
            languages: STOPWORDS
                .iter()
                .map(|(code, words)| (*code, words.iter().copied().collect()))
                .collect(),
            min_hits: 1,
        }
    }

    /// Requires at least `min_hits` stop words before reporting a language.
    pub fn with_min_hits(mut self, min_hits: usize) -> Self {
        self.min_hits = min_hits.max(1);
        self
    }

    pub fn supported_languages(&self) -> Vec<&'static str> {
        self.languages.iter().map(|(code, _)| *code).collect()
    }
}

impl Default for StopwordDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageDetector for StopwordDetector {
    fn name(&self) -> &str {
        "stopwords"
    }

    fn detect(&self, input: &str) -> Option<String> {
        let words = text::words(input);
        let mut best: Option<(&str, usize)> = None;
        for (code, stopwords) in &self.languages {
            let hits = words.iter().filter(|w| stopwords.contains(w.as_str())).count();
            if hits >= self.min_hits && best.map_or(true, |(_, top)| hits > top) {
                best = Some((*code, hits));
            }
        }
        best.map(|(code, _)| code.to_string())
    }
}

/// Builds the language distribution of `dataset` with `detector`.
pub fn detect_languages(dataset: &Dataset, detector: &dyn LanguageDetector) -> LanguageProfile {
    let detected: Vec<String> = dataset
        .samples()
        .par_iter()
        .map(|s| {
            detector
                .detect(&s.text())
                .unwrap_or_else(|| UNDETERMINED.to_string())
        })
        .collect();

    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    let mut languages: BTreeMap<String, usize> = BTreeMap::new();
    for (i, lang) in detected.iter().enumerate() {
        first_seen.entry(lang.as_str()).or_insert(i);
        *languages.entry(lang.clone()).or_default() += 1;
    }

    let primary = languages
        .iter()
        .filter(|(lang, _)| lang.as_str() != UNDETERMINED)
        .max_by(|a, b| {
            a.1.cmp(b.1)
                .then(first_seen[b.0.as_str()].cmp(&first_seen[a.0.as_str()]))
        })
        .map(|(lang, count)| (lang.clone(), *count));

    let profile = match primary {
        Some((lang, count)) => LanguageProfile {
            primary_percentage: count as f64 / detected.len() as f64 * 100.0,
            primary_language: Some(lang),
            languages,
        },
        None => LanguageProfile {
            languages,
            ..Default::default()
        },
    };
    tracing::debug!(
        detector = detector.name(),
        languages = profile.languages.len(),
        primary = ?profile.primary_language,
        "Languages detected"
    );
    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetFormat, Message, Sample};

    #[test]
    fn test_detects_common_languages() {
        let detector = StopwordDetector::new();
        let cases = [
            ("The cat is in the house and it does not want to go outside", "en"),
            ("El gato está en la casa y no quiere salir porque hace mucho frío", "es"),
            ("Le chat est dans la maison et il ne veut pas sortir", "fr"),
            ("Der Hund ist nicht in dem Haus und er will auch nicht raus", "de"),
        ];
        for (text, expected) in cases {
            assert_eq!(detector.detect(text).as_deref(), Some(expected), "{text}");
        }
    }

    #[test]
    fn test_no_signal_is_none() {
        let detector = StopwordDetector::new();
        assert_eq!(detector.detect("42 + 17"), None);
        assert_eq!(detector.detect(""), None);
    }

    #[test]
    fn test_detect_languages_profile() {
        let make = |text: &str| {
            Sample::new(
                vec![Message::user(text), Message::assistant("")],
                DatasetFormat::ChatMl,
                "{}",
                0,
            )
        };
        let dataset = Dataset::new(
            vec![
                make("What is the capital of France and how big is it?"),
                make("Le chat est dans la maison et il ne veut pas sortir"),
                make("Can you explain this to me with an example?"),
                make("12345"),
            ],
            DatasetFormat::ChatMl,
            None,
        );
        let profile = detect_languages(&dataset, &StopwordDetector::new());
        assert_eq!(profile.languages["en"], 2);
        assert_eq!(profile.languages["fr"], 1);
        assert_eq!(profile.languages[UNDETERMINED], 1);
        assert_eq!(profile.primary_language.as_deref(), Some("en"));
        assert!((profile.primary_percentage - 50.0).abs() < 1e-9);
    }
}
