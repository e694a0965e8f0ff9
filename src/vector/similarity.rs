//! Cosine similarity and pairwise distance math.

/// Computes cosine similarity between two vectors.
///
/// Returns 0.0 when the lengths differ, either vector is empty, or either
/// vector has zero norm. Absent embeddings are treated as "unrelated" rather
/// than as an error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        0.0
    } else {
        dot_product / denominator
    }
}

/// Cosine distance, `1 - cosine_similarity(a, b)`.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Symmetric N x N matrix of cosine distances, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    size: usize,
    values: Vec<f32>,
}

impl DistanceMatrix {
    /// Number of rows (and columns).
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Distance between items `i` and `j`.
    ///
    /// # Panics
    /// Panics if either index is out of bounds.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        assert!(i < self.size && j < self.size, "index out of bounds");
        self.values[i * self.size + j]
    }

    /// Row `i` of the matrix.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.values[i * self.size..(i + 1) * self.size]
    }

    /// Mean distance over all unordered pairs of `members`.
    ///
    /// Returns `None` when fewer than two members are given.
    #[must_use]
    pub fn mean_pairwise(&self, members: &[usize]) -> Option<f32> {
        if members.len() < 2 {
            return None;
        }

        let mut total = 0.0f32;
        let mut count = 0usize;
        for (pos, &i) in members.iter().enumerate() {
            for &j in &members[pos + 1..] {
                total += self.get(i, j);
                count += 1;
            }
        }
        Some(total / count as f32)
    }
}

/// Builds the pairwise distance matrix `1 - cosine_similarity(v[i], v[j])`.
///
/// The diagonal is exactly 0 and each pair is computed once.
pub fn distance_matrix(vectors: &[Vec<f32>]) -> DistanceMatrix {
    let size = vectors.len();
    let mut values = vec![0.0f32; size * size];

    for i in 0..size {
        for j in (i + 1)..size {
            let distance = cosine_distance(&vectors[i], &vectors[j]);
            values[i * size + j] = distance;
            values[j * size + i] = distance;
        }
    }

    DistanceMatrix { size, values }
}
