//! Error types for ftlint operations.
//!
//! Loading and capability failures are fatal and surface here. Defects that
//! belong to a single sample never become errors: they are reported as
//! [`crate::quality::QualityIssue`]s instead.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the analysis engines.
#[derive(Debug, Error)]
pub enum FtlintError {
    #[error("Failed to load {path}: {reason}")]
    DatasetLoad { path: String, reason: String },

    #[error("Cannot detect format for {path}")]
    FormatDetection { path: String },

    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Dataset is empty: {path}")]
    EmptyDataset { path: String },

    #[error("Unknown benchmark: {name}")]
    BenchmarkNotFound { name: String },

    #[error("Semantic analysis requires an embedding provider, none is configured")]
    SemanticUnavailable,

    #[error("LLM judge scoring requires a judge provider, none is configured")]
    LlmUnavailable,

    #[error("Provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl FtlintError {
    /// Builds a [`FtlintError::DatasetLoad`] from any displayable reason.
    pub fn load(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::DatasetLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Builds a [`FtlintError::Provider`] for a failed capability call.
    pub fn provider(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.to_string(),
        }
    }
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, FtlintError>;
