//! Pipeline stages and the caller-owned observer hooks.

use crate::vector::{BatchObserver, FetchStats, NoopObserver};
use serde::Serialize;
use std::fmt;

/// Phase of an analysis run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validating,
    Embedding,
    Clustering,
    Naming,
    Claims,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validating => "validating",
            Stage::Embedding => "embedding",
            Stage::Clustering => "clustering",
            Stage::Naming => "naming",
            Stage::Claims => "claims",
            Stage::Done => "done",
        }
    }

    /// Short progress label for terminals.
    pub fn description(&self) -> &'static str {
        match self {
            Stage::Validating => "Checking input",
            Stage::Embedding => "Embedding comments",
            Stage::Clustering => "Clustering",
            Stage::Naming => "Naming clusters",
            Stage::Claims => "Writing claims",
            Stage::Done => "Done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress hooks for an analysis run. Every method defaults to a no-op.
pub trait PipelineObserver: BatchObserver {
    /// Called when `stage` begins.
    fn on_stage(&self, _stage: Stage) {}

    /// Called once embedding retrieval has finished.
    fn on_finished(&self, _stats: &FetchStats) {}
}

impl PipelineObserver for NoopObserver {}
