//! ftlint: quality analysis for LLM fine-tuning datasets.
//!
//! This library loads conversational datasets (ChatML, Alpaca, ShareGPT)
//! and profiles, deduplicates, quality-checks, contamination-checks and
//! diversity-scores them.

// Core modules
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod contamination;
pub mod dataset;
pub mod dedup;
pub mod diversity;
pub mod error;
pub mod llm;
pub mod profiling;
pub mod quality;
pub mod text;

// Re-export commonly used types
pub use analyzer::{AnalysisSettings, Analyzer, ProfileReport};
pub use config::{load_config, ConfigError, FtlintConfig};
pub use dataset::{load_dataset, Dataset, DatasetFormat, Message, Sample};
pub use error::{FtlintError, Result};
