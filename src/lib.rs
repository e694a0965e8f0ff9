//! Semantic clustering of short social comments.
//!
//! Comments are embedded through an external service, clustered with cosine
//! k-means at a fine and a coarse granularity, scored for coherence and
//! scanned for dissenting members. See [`pipeline::Pipeline`] for the full
//! staged run.

pub mod config;
pub mod display;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod text;
pub mod types;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{AnalysisReport, AnalysisSupervisor, AnalysisTicket, Pipeline, Stage};
pub use types::{Corpus, TextItem, ValidSubset};
