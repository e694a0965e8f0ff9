//! Property tests for the clustering core.

use chorus::vector::{
    Cluster, ClusterEngine, ClusterId, ClusterResult, Score, cosine_similarity, find_dissenting,
};
use proptest::prelude::*;

fn embeddings(max_items: usize) -> impl Strategy<Value = Vec<Vec<f32>>> {
    (1usize..6).prop_flat_map(move |dim| {
        prop::collection::vec(prop::collection::vec(-1.0f32..1.0, dim), 0..max_items)
    })
}

fn assert_partition(result: &ClusterResult, n: usize) {
    assert_eq!(result.assignments.len(), n);

    let mut seen = vec![0usize; n];
    for cluster in &result.clusters {
        for &member in &cluster.members {
            seen[member] += 1;
            assert_eq!(result.assignments[member], cluster.id);
        }
    }
    assert!(seen.iter().all(|&count| count == 1), "not a partition: {seen:?}");
}

proptest! {
    #[test]
    fn clustering_is_a_complete_partition(data in embeddings(40), k in 1usize..10, seed in any::<u64>()) {
        let result = ClusterEngine::new().with_seed(seed).cluster(&data, k).unwrap();

        assert_partition(&result, data.len());
        prop_assert!(result.len() <= k);
    }

    #[test]
    fn clusters_are_sorted_with_dense_ids(data in embeddings(40), k in 1usize..10, seed in any::<u64>()) {
        let result = ClusterEngine::new().with_seed(seed).cluster(&data, k).unwrap();

        for (position, cluster) in result.clusters.iter().enumerate() {
            prop_assert_eq!(cluster.id, ClusterId::from_index(position));
            prop_assert!(!cluster.is_empty());
        }
        for pair in result.clusters.windows(2) {
            prop_assert!(pair[0].len() >= pair[1].len());
        }
    }

    #[test]
    fn confidence_stays_in_unit_range(data in embeddings(40), k in 1usize..10, seed in any::<u64>()) {
        let result = ClusterEngine::new().with_seed(seed).cluster(&data, k).unwrap();

        for cluster in &result.clusters {
            let value = cluster.confidence.get();
            prop_assert!((0.0..=1.0).contains(&value), "confidence {value}");
        }
    }

    #[test]
    fn small_inputs_become_singletons(data in embeddings(8), extra in 0usize..4) {
        let k = data.len() + extra;
        prop_assume!(k > 0);
        let result = ClusterEngine::new().cluster(&data, k).unwrap();

        prop_assert_eq!(result.len(), data.len());
        for cluster in &result.clusters {
            prop_assert!(cluster.is_singleton());
            prop_assert_eq!(cluster.confidence, Score::one());
        }
    }

    #[test]
    fn pinned_seed_is_reproducible(data in embeddings(30), k in 1usize..6, seed in any::<u64>()) {
        let engine = ClusterEngine::new().with_seed(seed);
        prop_assert_eq!(engine.cluster(&data, k).unwrap(), engine.cluster(&data, k).unwrap());
    }

    #[test]
    fn cosine_similarity_is_symmetric(
        pair in (1usize..8).prop_flat_map(|dim| (
            prop::collection::vec(-10.0f32..10.0, dim),
            prop::collection::vec(-10.0f32..10.0, dim),
        ))
    ) {
        let (a, b) = pair;
        prop_assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));

        if a.iter().any(|x| x.abs() > 1e-3) {
            prop_assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-4);
        }
    }
}

#[test]
fn empty_input_gives_empty_result() {
    let result = ClusterEngine::new().cluster(&[], 4).unwrap();
    assert!(result.is_empty());
    assert!(result.assignments.is_empty());
}

#[test]
fn two_tight_groups_split_cleanly() {
    let data = vec![
        vec![1.0, 0.0, 0.0],
        vec![0.99, 0.01, 0.0],
        vec![0.98, 0.02, 0.01],
        vec![0.0, 1.0, 0.0],
        vec![0.01, 0.99, 0.0],
        vec![0.02, 0.98, 0.01],
    ];

    for seed in 0..20 {
        let result = ClusterEngine::new().with_seed(seed).cluster(&data, 2).unwrap();
        assert_eq!(result.len(), 2);
        for cluster in &result.clusters {
            assert_eq!(cluster.len(), 3);
            assert!(cluster.confidence.get() > 0.9);
        }
        assert_eq!(result.assignments[0], result.assignments[2]);
        assert_ne!(result.assignments[0], result.assignments[3]);
    }
}

#[test]
fn dissent_depends_on_threshold() {
    let data = vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.6, 0.8]];
    let centroid = vec![
        (1.0 + 1.0 + 0.6) / 3.0,
        (0.0 + 0.0 + 0.8) / 3.0,
    ];
    let cluster = Cluster {
        id: ClusterId::new(0),
        members: vec![0, 1, 2],
        centroid: Some(centroid),
        confidence: Score::one(),
    };

    assert!(find_dissenting(&cluster, &data, 0.3).is_empty());
    assert_eq!(find_dissenting(&cluster, &data, 0.0), vec![0, 1, 2]);

    let identical = Cluster {
        id: ClusterId::new(1),
        members: vec![0, 1],
        centroid: Some(vec![1.0, 0.0]),
        confidence: Score::one(),
    };
    assert!(find_dissenting(&identical, &data, 0.3).is_empty());
    assert!(find_dissenting(&identical, &data, 0.0).is_empty());
}
