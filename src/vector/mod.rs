//! Embeddings and cosine clustering.
//!
//! # Architecture
//! [`EmbeddingFetcher`] turns comment text into vectors through an
//! [`EmbeddingService`]. [`ClusterEngine`] partitions the valid vectors with
//! farthest-point seeded k-means, and [`MultiLevelClusterer`] runs it twice
//! at two granularities. Confidence and dissent scoring read cosine distances
//! from a precomputed [`DistanceMatrix`].

mod clustering;
mod embedding;
mod multilevel;
mod scoring;
mod similarity;
mod types;

pub use clustering::{ClusterEngine, ClusteringError, DEFAULT_MAX_ITERATIONS, nearest_centroid};
#[cfg(test)]
pub use embedding::{ScriptedEmbeddingService, ScriptedReply};
pub use embedding::{
    BatchObserver, BatchOutcome, BatchReport, DEFAULT_BACKOFF, DEFAULT_BATCH_SIZE,
    DEFAULT_INTER_BATCH_DELAY, DEFAULT_MAX_ATTEMPTS, EmbeddingError, EmbeddingFetcher,
    EmbeddingService, FetchConfig, FetchReport, FetchStats, HttpEmbeddingService, NoopObserver,
    ServiceError,
};
pub use multilevel::{ClusterLevels, LevelBounds, MultiLevelClusterer, MultiLevelClusters};
pub use scoring::{DEFAULT_DISSENT_THRESHOLD, cluster_confidence, find_dissenting};
pub use similarity::{DistanceMatrix, cosine_distance, cosine_similarity, distance_matrix};
pub use types::{Cluster, ClusterId, ClusterResult, Score, VectorDimension, VectorError};
