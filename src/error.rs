//! Error types for the analysis pipeline
//!
//! Each stage has its own error enum next to its code; [`PipelineError`]
//! wraps them and records which stage failed, so callers can tell an
//! embedding failure from a clustering failure.

use crate::pipeline::Stage;
use crate::vector::{ClusteringError, EmbeddingError};
use thiserror::Error;

/// Top-level error for an analysis run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Rejected before any network call
    #[error("Invalid input: {reason}\nSuggestion: Provide a non-empty list of comments")]
    InvalidInput { reason: String },

    #[error("Invalid configuration: {reason}\nSuggestion: Run 'chorus config' to inspect the effective settings")]
    Config { reason: String },

    #[error("Embedding failed: {0}")]
    Embedding(EmbeddingError),

    /// Every item degraded to an empty embedding
    #[error(
        "Processing failed: none of the {requested} comments could be embedded ({skipped} empty, {failed} failed)\nSuggestion: Check the embedding service key and endpoint, then retry"
    )]
    NoValidEmbeddings {
        requested: usize,
        skipped: usize,
        failed: usize,
    },

    #[error("Clustering failed: {0}")]
    Clustering(#[from] ClusteringError),

    #[error("Analysis cancelled during {stage}")]
    Cancelled { stage: Stage },
}

impl From<EmbeddingError> for PipelineError {
    fn from(error: EmbeddingError) -> Self {
        match error {
            EmbeddingError::Cancelled => Self::Cancelled {
                stage: Stage::Embedding,
            },
            EmbeddingError::InvalidConfig(reason) => Self::Config { reason },
            other => Self::Embedding(other),
        }
    }
}

impl PipelineError {
    /// Stage the run was in when it failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidInput { .. } | Self::Config { .. } => Stage::Validating,
            Self::Embedding(_) | Self::NoValidEmbeddings { .. } => Stage::Embedding,
            Self::Clustering(_) => Stage::Clustering,
            Self::Cancelled { stage } => *stage,
        }
    }

    /// Get a stable status code for this error type.
    ///
    /// Used in JSON responses for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::NoValidEmbeddings { .. } => "PROCESSING_FAILED",
            Self::Clustering(_) => "CLUSTERING_ERROR",
            Self::Cancelled { .. } => "CANCELLED",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::InvalidInput { .. } => vec![
                "The input file must contain a JSON array of comments",
                "Each comment needs at least an 'id' and a 'text' field",
            ],
            Self::Config { .. } => vec![
                "batch_size, max_attempts and max_chars must all be at least 1",
                "Run 'chorus init --force' to regenerate a default settings file",
            ],
            Self::Embedding(_) => vec![
                "Verify the embedding endpoint URL in settings.toml",
                "Check network connectivity to the embedding service",
            ],
            Self::NoValidEmbeddings { .. } => vec![
                "Make sure the API key environment variable is set",
                "The service may be rate limiting, wait a minute and retry",
            ],
            Self::Clustering(_) => vec![
                "All embeddings must come from the same model",
                "Run with RUST_LOG=debug for clustering details",
            ],
            Self::Cancelled { .. } => vec!["A newer analysis replaced this one"],
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
