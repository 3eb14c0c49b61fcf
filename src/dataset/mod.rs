//! Sample and dataset model shared by every analysis engine.
//!
//! A [`Dataset`] is an ordered, immutable collection of [`Sample`]s produced
//! by the [`loader`]. Derived values such as the content hash or the turn
//! count are computed on demand from stored state and never cached.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ftlint::dataset::load_dataset;
//!
//! let dataset = load_dataset("train.jsonl", None)?;
//! println!("{} samples ({})", dataset.sample_count(), dataset.format);
//! ```

pub mod formats;
pub mod loader;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::FtlintError;

pub use formats::{parse_alpaca, parse_chatml, parse_record, parse_sharegpt};
pub use loader::{detect_format, load_dataset};

/// Role of a system prompt message.
pub const ROLE_SYSTEM: &str = "system";
/// Role of a user turn.
pub const ROLE_USER: &str = "user";
/// Role of an assistant turn.
pub const ROLE_ASSISTANT: &str = "assistant";
/// Role of a tool result turn.
pub const ROLE_TOOL: &str = "tool";

/// Number of hex characters kept from the SHA-256 digest.
const CONTENT_HASH_LEN: usize = 16;

/// Supported fine-tuning dataset formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetFormat {
    #[serde(rename = "chatml")]
    ChatMl,
    #[serde(rename = "alpaca")]
    Alpaca,
    #[serde(rename = "sharegpt")]
    ShareGpt,
    #[serde(rename = "jsonl_messages")]
    JsonlMessages,
    #[serde(rename = "parquet")]
    Parquet,
    #[serde(rename = "hf_dataset")]
    HfDataset,
}

impl DatasetFormat {
    /// Returns the canonical lower-case name of the format.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetFormat::ChatMl => "chatml",
            DatasetFormat::Alpaca => "alpaca",
            DatasetFormat::ShareGpt => "sharegpt",
            DatasetFormat::JsonlMessages => "jsonl_messages",
            DatasetFormat::Parquet => "parquet",
            DatasetFormat::HfDataset => "hf_dataset",
        }
    }
}

impl fmt::Display for DatasetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetFormat {
    type Err = FtlintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chatml" => Ok(DatasetFormat::ChatMl),
            "alpaca" => Ok(DatasetFormat::Alpaca),
            "sharegpt" => Ok(DatasetFormat::ShareGpt),
            "jsonl_messages" | "messages" => Ok(DatasetFormat::JsonlMessages),
            "parquet" => Ok(DatasetFormat::Parquet),
            "hf_dataset" | "hf" => Ok(DatasetFormat::HfDataset),
            other => Err(FtlintError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }
}

/// A single message within a training sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Normalized role (`system`, `user`, `assistant`, or a passthrough label).
    pub role: String,
    /// Message text.
    pub content: String,
}

impl Message {
    /// Creates a message with an arbitrary role.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ROLE_SYSTEM, content)
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ROLE_USER, content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ROLE_ASSISTANT, content)
    }

    /// Returns true for assistant turns.
    pub fn is_assistant(&self) -> bool {
        self.role == ROLE_ASSISTANT
    }
}

/// A single training example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Messages in conversational order.
    pub messages: Vec<Message>,
    /// Format the sample was parsed from.
    pub format: DatasetFormat,
    /// The original serialized record, used for hashing.
    pub raw_content: String,
    /// Fields of the record that are not part of the conversation.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Zero-based position in the owning dataset.
    pub index: usize,
}

impl Sample {
    /// Creates a sample without metadata.
    pub fn new(
        messages: Vec<Message>,
        format: DatasetFormat,
        raw_content: impl Into<String>,
        index: usize,
    ) -> Self {
        Self {
            messages,
            format,
            raw_content: raw_content.into(),
            metadata: serde_json::Map::new(),
            index,
        }
    }

    /// First 16 hex characters of the SHA-256 digest of `raw_content`.
    pub fn content_hash(&self) -> String {
        content_hash(&self.raw_content)
    }

    /// Number of messages in this sample.
    pub fn turn_count(&self) -> usize {
        self.messages.len()
    }

    /// Whether any message has the `system` role.
    pub fn has_system(&self) -> bool {
        self.messages.iter().any(|m| m.role == ROLE_SYSTEM)
    }

    /// Iterates over assistant turns.
    pub fn assistant_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_assistant())
    }

    /// All non-assistant turns joined by newlines.
    pub fn prompt_text(&self) -> String {
        join_contents(self.messages.iter().filter(|m| !m.is_assistant()))
    }

    /// All assistant turns joined by newlines.
    pub fn response_text(&self) -> String {
        join_contents(self.assistant_messages())
    }

    /// Every message's content joined by newlines.
    pub fn text(&self) -> String {
        join_contents(self.messages.iter())
    }
}

fn join_contents<'a>(messages: impl Iterator<Item = &'a Message>) -> String {
    messages
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Computes the truncated SHA-256 content hash used for exact dedup.
pub fn content_hash(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(CONTENT_HASH_LEN);
    encoded
}

/// An ordered collection of samples in a single declared format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    samples: Vec<Sample>,
    /// Declared format of the source.
    pub format: DatasetFormat,
    /// Source path, if the dataset was loaded from disk.
    pub path: Option<PathBuf>,
}

impl Dataset {
    /// Creates a dataset, renumbering sample indices to their positions.
    pub fn new(mut samples: Vec<Sample>, format: DatasetFormat, path: Option<PathBuf>) -> Self {
        for (position, sample) in samples.iter_mut().enumerate() {
            sample.index = position;
        }
        Self {
            samples,
            format,
            path,
        }
    }

    /// Total number of samples.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in file order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Source path rendered for diagnostics, or `<memory>`.
    pub fn display_path(&self) -> String {
        self.path
            .as_deref()
            .map(Path::display)
            .map(|p| p.to_string())
            .unwrap_or_else(|| "<memory>".to_string())
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
