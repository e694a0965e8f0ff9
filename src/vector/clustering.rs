//! K-means clustering over cosine similarity for comment embeddings.
//!
//! This module provides a pure Rust K-means tuned for a few hundred
//! embeddings and sub-second turnaround. It is approximate and single-pass:
//! one seeding, at most [`DEFAULT_MAX_ITERATIONS`] Lloyd rounds, no restarts.
//!
//! # Algorithm Details
//! - Similarity: cosine similarity (not Euclidean distance)
//! - Seeding: one uniformly random pick, then farthest-point selection
//! - Centroids: plain component-wise means, never renormalized
//! - Empty clusters keep their previous centroid for the rest of the run
//! - Convergence: stop when no assignment changes
//!
//! # Determinism
//! The only randomness is the first seed pick. Pin it with
//! [`ClusterEngine::with_seed`] or pass your own RNG to
//! [`ClusterEngine::cluster_with_rng`].

use crate::vector::scoring::cluster_confidence;
use crate::vector::similarity::{cosine_distance, cosine_similarity, distance_matrix};
use crate::vector::types::{Cluster, ClusterId, ClusterResult, Score, VectorDimension};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::debug;

/// Maximum number of Lloyd iterations per run.
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Errors that can occur during clustering operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ClusteringError {
    #[error("Invalid cluster count: {0}\nSuggestion: Request at least one cluster")]
    InvalidClusterCount(usize),

    #[error(
        "Dimension mismatch at index {index}: expected {expected}, got {actual}\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error(
        "Empty embedding at index {0}\nSuggestion: Filter out unavailable embeddings before clustering"
    )]
    EmptyVector(usize),
}

/// K-means engine with cosine assignment and farthest-point seeding.
///
/// ```
/// use chorus::vector::ClusterEngine;
///
/// let data = vec![
///     vec![1.0, 0.0],
///     vec![0.9, 0.1],
///     vec![0.0, 1.0],
///     vec![0.1, 0.9],
/// ];
/// let result = ClusterEngine::new().with_seed(7).cluster(&data, 2).unwrap();
/// assert_eq!(result.assignments[0], result.assignments[1]);
/// assert_ne!(result.assignments[0], result.assignments[2]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterEngine {
    max_iterations: usize,
    seed: Option<u64>,
}

impl Default for ClusterEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterEngine {
    /// Engine with [`DEFAULT_MAX_ITERATIONS`] and randomized seeding.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed: None,
        }
    }

    /// Sets the iteration cap (at least one round always runs).
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Pins the random source so runs are reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    #[must_use]
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// A fresh RNG: seeded when a seed is pinned, from the thread RNG otherwise.
    pub(crate) fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Clusters `embeddings` into at most `k` groups.
    ///
    /// A `k` of zero is rejected instead of being read as one cluster; ask
    /// for `k = 1` to get a single cluster holding every item.
    ///
    /// # Errors
    /// Returns an error if `k` is zero for a non-empty input, or if the
    /// vectors are empty or of differing dimensions.
    #[must_use = "clustering results should be used or the computation is wasted"]
    pub fn cluster(
        &self,
        embeddings: &[Vec<f32>],
        k: usize,
    ) -> Result<ClusterResult, ClusteringError> {
        let mut rng = self.rng();
        self.cluster_with_rng(embeddings, k, &mut rng)
    }

    /// Same as [`cluster`](Self::cluster) with a caller-supplied random source.
    pub fn cluster_with_rng<R: Rng + ?Sized>(
        &self,
        embeddings: &[Vec<f32>],
        k_requested: usize,
        rng: &mut R,
    ) -> Result<ClusterResult, ClusteringError> {
        if embeddings.is_empty() {
            return Ok(ClusterResult::empty());
        }
        // Never coerced to one cluster
        if k_requested == 0 {
            return Err(ClusteringError::InvalidClusterCount(0));
        }
        validate_dimensions(embeddings)?;

        let k = k_requested.min(embeddings.len());
        if embeddings.len() <= k {
            return Ok(singleton_clusters(embeddings));
        }

        let seeds = farthest_point_seeds(embeddings, k, rng);
        let mut centroids: Vec<Vec<f32>> = seeds.iter().map(|&i| embeddings[i].clone()).collect();
        let mut assignments = vec![0usize; embeddings.len()];
        let mut iterations = 0;

        for _ in 0..self.max_iterations {
            iterations += 1;

            let next: Vec<usize> = embeddings
                .iter()
                .map(|embedding| nearest_centroid(embedding, &centroids))
                .collect();

            let changed = next != assignments;
            assignments = next;
            if !changed {
                break;
            }

            update_centroids(embeddings, &assignments, &mut centroids);
        }

        let result = build_result(embeddings, &assignments, &centroids);
        debug!(
            items = embeddings.len(),
            k,
            iterations,
            clusters = result.len(),
            "k-means finished"
        );
        Ok(result)
    }
}

/// Returns the index of the centroid most similar to `vector`.
///
/// Ties go to the lowest index.
pub fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best_similarity = f32::NEG_INFINITY;
    let mut best_cluster = 0;

    for (i, centroid) in centroids.iter().enumerate() {
        let similarity = cosine_similarity(vector, centroid);
        if similarity > best_similarity {
            best_similarity = similarity;
            best_cluster = i;
        }
    }

    best_cluster
}

fn validate_dimensions(embeddings: &[Vec<f32>]) -> Result<(), ClusteringError> {
    let dimension =
        VectorDimension::new(embeddings[0].len()).map_err(|_| ClusteringError::EmptyVector(0))?;

    for (index, embedding) in embeddings.iter().enumerate() {
        if embedding.is_empty() {
            return Err(ClusteringError::EmptyVector(index));
        }
        if dimension.validate_vector(embedding).is_err() {
            return Err(ClusteringError::DimensionMismatch {
                index,
                expected: dimension.get(),
                actual: embedding.len(),
            });
        }
    }
    Ok(())
}

/// Every item becomes its own cluster with confidence 1.0.
fn singleton_clusters(embeddings: &[Vec<f32>]) -> ClusterResult {
    let clusters = embeddings
        .iter()
        .enumerate()
        .map(|(i, embedding)| Cluster {
            id: ClusterId::from_index(i),
            members: vec![i],
            centroid: Some(embedding.clone()),
            confidence: Score::one(),
        })
        .collect();

    ClusterResult {
        clusters,
        assignments: (0..embeddings.len()).map(ClusterId::from_index).collect(),
    }
}

/// Picks `k` distinct seed indices: the first at random, each next one the
/// point whose nearest already-chosen seed is farthest away.
///
/// Ties go to the lowest index, so the result is fully determined by the
/// first pick.
fn farthest_point_seeds<R: Rng + ?Sized>(
    embeddings: &[Vec<f32>],
    k: usize,
    rng: &mut R,
) -> Vec<usize> {
    let n = embeddings.len();
    let mut chosen = Vec::with_capacity(k);
    let mut is_chosen = vec![false; n];

    let first = rng.random_range(0..n);
    chosen.push(first);
    is_chosen[first] = true;

    // Distance from each point to its nearest chosen seed
    let mut nearest_seed_distance: Vec<f32> = embeddings
        .iter()
        .map(|embedding| cosine_distance(embedding, &embeddings[first]))
        .collect();

    while chosen.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for (i, &distance) in nearest_seed_distance.iter().enumerate() {
            if is_chosen[i] {
                continue;
            }
            if best.is_none_or(|(_, best_distance)| distance > best_distance) {
                best = Some((i, distance));
            }
        }

        let Some((next, _)) = best else { break };
        chosen.push(next);
        is_chosen[next] = true;

        for (i, embedding) in embeddings.iter().enumerate() {
            let distance = cosine_distance(embedding, &embeddings[next]);
            if distance < nearest_seed_distance[i] {
                nearest_seed_distance[i] = distance;
            }
        }
    }

    chosen
}

/// Moves each centroid to the mean of its members.
///
/// A cluster that lost all its members keeps its previous centroid.
fn update_centroids(embeddings: &[Vec<f32>], assignments: &[usize], centroids: &mut [Vec<f32>]) {
    let dimension = embeddings[0].len();
    let mut sums = vec![vec![0.0f32; dimension]; centroids.len()];
    let mut counts = vec![0usize; centroids.len()];

    for (embedding, &cluster) in embeddings.iter().zip(assignments.iter()) {
        for (sum, value) in sums[cluster].iter_mut().zip(embedding.iter()) {
            *sum += value;
        }
        counts[cluster] += 1;
    }

    for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
        if count == 0 {
            continue;
        }
        let size = count as f32;
        *centroid = sum.into_iter().map(|value| value / size).collect();
    }
}

/// Groups final assignments into scored clusters ranked by size.
fn build_result(
    embeddings: &[Vec<f32>],
    assignments: &[usize],
    centroids: &[Vec<f32>],
) -> ClusterResult {
    let distances = distance_matrix(embeddings);

    // Raw cluster ids in order of first appearance
    let mut order = Vec::new();
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); centroids.len()];
    for (index, &cluster) in assignments.iter().enumerate() {
        if members[cluster].is_empty() {
            order.push(cluster);
        }
        members[cluster].push(index);
    }

    let mut clusters: Vec<Cluster> = order
        .into_iter()
        .map(|raw| {
            let indices = std::mem::take(&mut members[raw]);
            let confidence = cluster_confidence(&indices, &distances);
            Cluster {
                id: ClusterId::from_index(raw),
                members: indices,
                centroid: Some(centroids[raw].clone()),
                confidence,
            }
        })
        .collect();

    // Stable: equal-sized clusters keep first-appearance order
    clusters.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut remap = vec![ClusterId::new(0); centroids.len()];
    for (rank, cluster) in clusters.iter_mut().enumerate() {
        let dense = ClusterId::from_index(rank);
        remap[cluster.id.as_index()] = dense;
        cluster.id = dense;
    }

    ClusterResult {
        clusters,
        assignments: assignments.iter().map(|&raw| remap[raw]).collect(),
    }
}
