//! Tokenization shared by the profiling, quality, dedup and contamination
//! engines.
//!
//! Tokens are Unicode word runs plus individual punctuation marks. This is a
//! deterministic stand-in for a BPE tokenizer: counts are in the same range
//! for English prose and every engine agrees on them.

use std::sync::OnceLock;

use regex::Regex;

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
static WORD_RE: OnceLock<Regex> = OnceLock::new();

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| Regex::new(r"\w+|[^\w\s]").expect("token pattern is valid"))
}

fn word_re() -> &'static Regex {
    WORD_RE.get_or_init(|| Regex::new(r"\w+").expect("word pattern is valid"))
}

/// Splits text into word and punctuation tokens, preserving case.
pub fn tokenize(text: &str) -> Vec<&str> {
    token_re().find_iter(text).map(|m| m.as_str()).collect()
}

/// Number of tokens in `text`.
pub fn count_tokens(text: &str) -> usize {
    token_re().find_iter(text).count()
}

/// Lower-cased word tokens, punctuation dropped.
pub fn words(text: &str) -> Vec<String> {
    word_re()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Contiguous windows of `n` words joined by single spaces.
///
/// Returns an empty vector when `n` is zero or `words` is shorter than `n`.
pub fn ngrams(words: &[String], n: usize) -> Vec<String> {
    if n == 0 || words.len() < n {
        return Vec::new();
    }
    words.windows(n).map(|window| window.join(" ")).collect()
}
