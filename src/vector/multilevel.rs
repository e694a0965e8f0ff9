//! Two-granularity clustering of the same corpus.
//!
//! Fine and coarse results are independent k-means runs over the same
//! embeddings; coarse is not a merge of fine.

use crate::vector::clustering::{ClusterEngine, ClusteringError};
use crate::vector::types::ClusterResult;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maps a corpus size to a cluster count: `clamp(n / divisor, min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelBounds {
    pub divisor: usize,
    pub min: usize,
    pub max: usize,
}

impl LevelBounds {
    #[must_use]
    pub const fn new(divisor: usize, min: usize, max: usize) -> Self {
        Self { divisor, min, max }
    }

    /// Target cluster count for `n` items.
    ///
    /// The lower bound wins if `min > max`; a zero divisor yields `min`.
    #[must_use]
    pub fn target(&self, n: usize) -> usize {
        let scaled = n.checked_div(self.divisor).unwrap_or(0);
        scaled.min(self.max).max(self.min)
    }
}

/// Bounds for both granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterLevels {
    pub fine: LevelBounds,
    pub coarse: LevelBounds,
}

impl Default for ClusterLevels {
    fn default() -> Self {
        Self {
            fine: LevelBounds::new(5, 3, 15),
            coarse: LevelBounds::new(15, 2, 7),
        }
    }
}

impl ClusterLevels {
    #[must_use]
    pub fn fine_target(&self, n: usize) -> usize {
        self.fine.target(n)
    }

    #[must_use]
    pub fn coarse_target(&self, n: usize) -> usize {
        self.coarse.target(n)
    }
}

/// The two clusterings consumed downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiLevelClusters {
    pub fine: ClusterResult,
    pub coarse: ClusterResult,
}

/// Runs the fine and coarse clusterings with counts derived from corpus size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiLevelClusterer {
    engine: ClusterEngine,
    levels: ClusterLevels,
}

impl MultiLevelClusterer {
    #[must_use]
    pub fn new(engine: ClusterEngine, levels: ClusterLevels) -> Self {
        Self { engine, levels }
    }

    #[must_use]
    pub fn engine(&self) -> &ClusterEngine {
        &self.engine
    }

    #[must_use]
    pub fn levels(&self) -> &ClusterLevels {
        &self.levels
    }

    /// Clusters `embeddings` at both granularities.
    ///
    /// Both runs draw from one random source, so each gets its own seeding
    /// while a pinned engine seed still makes the pair reproducible.
    pub fn cluster(&self, embeddings: &[Vec<f32>]) -> Result<MultiLevelClusters, ClusteringError> {
        let n = embeddings.len();
        let fine_k = self.levels.fine_target(n);
        let coarse_k = self.levels.coarse_target(n);
        debug!(items = n, fine_k, coarse_k, "multi-level clustering");

        let mut rng = self.engine.rng();
        let fine = self.engine.cluster_with_rng(embeddings, fine_k, &mut rng)?;
        let coarse = self.engine.cluster_with_rng(embeddings, coarse_k, &mut rng)?;

        Ok(MultiLevelClusters { fine, coarse })
    }
}
