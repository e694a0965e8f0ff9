//! Type-safe wrappers and value types for clustering results.
//!
//! Cluster ids, confidence scores and vector dimensions are newtypes so that
//! a member index can never be confused with a cluster id and a confidence
//! can never leave the `[0.0, 1.0]` range.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dense identifier of a cluster inside one [`ClusterResult`].
///
/// Ids run `0..k` after ranking, so id 0 is always the largest cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(u32);

impl ClusterId {
    /// Creates a new `ClusterId`.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Creates a `ClusterId` from a position in a cluster list.
    ///
    /// Positions past `u32::MAX` saturate; a cluster list never gets that
    /// long since every cluster holds at least one item.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        debug_assert!(u32::try_from(index).is_ok(), "cluster index {index} exceeds u32");
        Self::try_from_index(index).unwrap_or(Self(u32::MAX))
    }

    /// Creates a `ClusterId` from a position, or `None` if it does not fit.
    #[must_use]
    pub fn try_from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }

    /// Returns the underlying u32 value.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Returns the id as a slice index.
    #[must_use]
    pub const fn as_index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-safe wrapper for coherence scores.
///
/// Scores live in `[0.0, 1.0]`:
/// - 1.0 means every member is identical (or the cluster is a singleton)
/// - 0.0 means members are on average orthogonal or worse
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(f32);

impl Score {
    /// Creates a new `Score` with validation.
    ///
    /// Returns an error if the score is not in the range [0.0, 1.0] or is NaN.
    pub fn new(value: f32) -> Result<Self, VectorError> {
        if value.is_nan() {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score cannot be NaN",
            });
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score must be in range [0.0, 1.0]",
            });
        }
        Ok(Self(value))
    }

    /// Creates a score by clamping `value` into `[0.0, 1.0]`.
    ///
    /// NaN maps to 0.0.
    #[must_use]
    pub fn clamped(value: f32) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    /// Creates a score of 0.0.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0.0)
    }

    /// Creates a score of 1.0.
    #[must_use]
    pub const fn one() -> Self {
        Self(1.0)
    }

    /// Returns the underlying f32 value.
    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }

    /// Returns the score as a whole percentage, e.g. `0.874` -> `87`.
    #[must_use]
    pub fn percent(&self) -> u32 {
        (self.0 * 100.0).round() as u32
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// The dimension is whatever the embedding service returns for a corpus;
/// zero is reserved for the "embedding unavailable" sentinel and is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// One group of semantically close items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    /// Dense id, unique within the owning [`ClusterResult`].
    pub id: ClusterId,

    /// Indices into the valid-subset embedding array. Order carries no meaning.
    pub members: Vec<usize>,

    /// Component-wise mean of the members' vectors.
    #[serde(skip_serializing)]
    pub centroid: Option<Vec<f32>>,

    /// Coherence of the cluster, see [`crate::vector::cluster_confidence`].
    pub confidence: Score,
}

impl Cluster {
    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// True when the cluster holds exactly one member.
    #[must_use]
    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }

    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.members.contains(&index)
    }
}

/// Output of one clustering run.
///
/// Every valid-subset index appears in exactly one cluster, and
/// `assignments[i]` is the id of that cluster. Clusters are ordered by
/// non-increasing member count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterResult {
    pub clusters: Vec<Cluster>,
    pub assignments: Vec<ClusterId>,
}

impl ClusterResult {
    /// A result with no clusters and no assignments.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of clusters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Looks up a cluster by id.
    #[must_use]
    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(id.as_index()).filter(|c| c.id == id)
    }

    /// Cluster id of the item at valid-subset `index`.
    #[must_use]
    pub fn assignment(&self, index: usize) -> Option<ClusterId> {
        self.assignments.get(index).copied()
    }

    /// Number of clustered items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.assignments.len()
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid score value: {value}\nReason: {reason}")]
    InvalidScore { value: f32, reason: &'static str },
}
