//! Post-processing over a finished clustering: coherence and dissent.

use crate::vector::similarity::{DistanceMatrix, cosine_distance};
use crate::vector::types::{Cluster, Score};

/// Default distance-to-centroid above which a member counts as dissenting.
pub const DEFAULT_DISSENT_THRESHOLD: f32 = 0.3;

/// Coherence of a cluster from its members' pairwise distances.
///
/// Singletons (and empty member lists) score 1.0. Larger clusters score
/// `max(0, 1 - mean pairwise distance)`, capped at 1.0.
pub fn cluster_confidence(members: &[usize], distances: &DistanceMatrix) -> Score {
    match distances.mean_pairwise(members) {
        Some(mean) => Score::clamped(1.0 - mean),
        None => Score::one(),
    }
}

/// Members of `cluster` whose distance to its centroid exceeds `threshold`.
///
/// Returns an empty list when the cluster has no centroid or at most one
/// member. Member indices outside `embeddings` are ignored.
pub fn find_dissenting(cluster: &Cluster, embeddings: &[Vec<f32>], threshold: f32) -> Vec<usize> {
    let Some(centroid) = cluster.centroid.as_deref() else {
        return Vec::new();
    };
    if cluster.len() <= 1 {
        return Vec::new();
    }

    cluster
        .members
        .iter()
        .copied()
        .filter(|&index| {
            embeddings
                .get(index)
                .is_some_and(|embedding| cosine_distance(embedding, centroid) > threshold)
        })
        .collect()
}
