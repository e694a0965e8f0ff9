//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success
//! - `1`: General error
//! - `2`: Blocking error, automation should halt
//! - `3-125`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::error::PipelineError;

/// Standard exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Critical error that should halt automation (code 2)
    BlockingError = 2,

    /// Input was empty or malformed (code 3)
    InvalidInput = 3,

    /// Embedding service failure (code 4)
    EmbeddingFailed = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Clustering failed after embeddings were retrieved (code 7)
    ClusteringFailed = 7,

    /// Run was cancelled (code 8)
    Cancelled = 8,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

impl ExitCode {
    /// Convert a `PipelineError` to the appropriate exit code.
    pub fn from_error(error: &PipelineError) -> Self {
        match error {
            PipelineError::InvalidInput { .. } => ExitCode::InvalidInput,
            PipelineError::Config { .. } => ExitCode::ConfigError,
            PipelineError::Embedding(_) => ExitCode::EmbeddingFailed,
            // Nothing usable came back at all
            PipelineError::NoValidEmbeddings { .. } => ExitCode::BlockingError,
            PipelineError::Clustering(_) => ExitCode::ClusteringFailed,
            PipelineError::Cancelled { .. } => ExitCode::Cancelled,
        }
    }

    /// Check if this exit code indicates a blocking error.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError)
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::BlockingError => "Blocking error - automation should halt",
            ExitCode::InvalidInput => "Invalid input",
            ExitCode::EmbeddingFailed => "Embedding failed",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::ClusteringFailed => "Clustering failed",
            ExitCode::Cancelled => "Cancelled",
        }
    }
}
