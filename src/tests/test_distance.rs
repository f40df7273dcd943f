// src/tests/test_distance.rs

use approx::assert_relative_eq;
use nalgebra::DMatrix;

use crate::distance::{
    DistanceParams, DropMode, PNorm, RelaxationParams, affinity_distance, algebraic_distance,
    distance_strength, relaxation_vectors,
};
use crate::tests::init;
use crate::tests::test_data::{
    block_poisson, grid_coordinates, pattern, poisson_1d, poisson_2d,
};
use soc_core::SparseGraph;
use soc_core::ops::spmv;

#[test]
fn test_uniform_grid_keeps_every_neighbour() {
    init();
    let a = poisson_2d(3);
    let graph = SparseGraph::from_matrix(&a).unwrap();
    let s = distance_strength(&graph, &grid_coordinates(3), &DistanceParams::default()).unwrap();

    assert_eq!(pattern(&s.matrix), pattern(&a));
    // neighbours at distance 1, self distance 1 + 1 after the identity shift
    assert_relative_eq!(s.get(4, 1), 1.0);
    assert_relative_eq!(s.get(4, 4), 0.5);
    assert!(s.verify_against(&graph, 1e-12).is_valid);
}

#[test]
fn test_relative_drop_on_uneven_spacing() {
    init();
    let graph = SparseGraph::from_matrix(&poisson_1d(3)).unwrap();
    let v = DMatrix::from_column_slice(3, 1, &[0.0, 1.0, 10.0]);
    let s = distance_strength(&graph, &v, &DistanceParams::default()).unwrap();

    // row 1: 9 > 2 * 1 is dropped
    assert_eq!(s.get(1, 2), 0.0);
    assert_relative_eq!(s.get(1, 0), 1.0);
    // row 2 keeps its only neighbour, 1/9 against a diagonal of 1/2
    assert_relative_eq!(s.get(2, 1), 2.0 / 9.0, epsilon = 1e-12);
    assert_relative_eq!(s.get(2, 2), 1.0);
}

#[test]
fn test_absolute_drop() {
    init();
    let graph = SparseGraph::from_matrix(&poisson_2d(3)).unwrap();
    let params = DistanceParams {
        theta: 0.5,
        drop: DropMode::Absolute,
    };
    let s = distance_strength(&graph, &grid_coordinates(3), &params).unwrap();

    assert_eq!(s.nnz(), 9);
    assert!((0..9).all(|i| s.get(i, i) == 1.0));
}

#[test]
fn test_block_coordinates_are_per_supernode() {
    init();
    let graph = SparseGraph::from_matrix(&block_poisson(4))
        .unwrap()
        .with_block_size(2)
        .unwrap();
    let v = DMatrix::from_column_slice(4, 1, &[0.0, 1.0, 2.0, 3.0]);
    let s = distance_strength(&graph, &v, &DistanceParams::default()).unwrap();

    assert_eq!(s.nnodes, 4);
    assert!(s.verify_against(&graph, 1e-12).is_valid);

    let wrong = DMatrix::from_column_slice(8, 1, &[0.0; 8]);
    assert!(distance_strength(&graph, &wrong, &DistanceParams::default()).is_err());
}

#[test]
fn test_relaxation_vectors_are_seeded_and_smoothed() {
    init();
    let a = poisson_1d(50);

    let first = relaxation_vectors(&a, 3, 20, 0.5, 7);
    let second = relaxation_vectors(&a, 3, 20, 0.5, 7);
    assert_eq!(first, second);
    assert_eq!(first.shape(), (50, 3));

    let raw = relaxation_vectors(&a, 3, 0, 0.5, 7);
    for r in 0..3 {
        let before: Vec<f64> = raw.column(r).iter().copied().collect();
        let after: Vec<f64> = first.column(r).iter().copied().collect();
        let residual_before: f64 = spmv(&a, &before).iter().map(|v| v * v).sum();
        let residual_after: f64 = spmv(&a, &after).iter().map(|v| v * v).sum();
        assert!(residual_after < residual_before);
    }
    assert!(raw.iter().all(|&v| (-0.5..0.5).contains(&v)));
}

#[test]
fn test_affinity_and_algebraic_contract() {
    init();
    let graph = SparseGraph::from_matrix(&poisson_2d(6)).unwrap();

    let affinity = affinity_distance(&graph, &RelaxationParams::affinity()).unwrap();
    let validation = affinity.verify_against(&graph, 1e-12);
    assert!(validation.is_valid, "affinity: {:?}", validation);

    for p in [PNorm::Finite(1.0), PNorm::Finite(2.0), PNorm::Infinity] {
        let algebraic = algebraic_distance(&graph, &RelaxationParams::algebraic(), p).unwrap();
        let validation = algebraic.verify_against(&graph, 1e-12);
        assert!(validation.is_valid, "p={}: {:?}", p, validation);
    }
}

#[test]
fn test_relaxation_measures_are_reproducible() {
    init();
    let graph = SparseGraph::from_matrix(&poisson_2d(5)).unwrap();
    let params = RelaxationParams::algebraic();

    let first = algebraic_distance(&graph, &params, PNorm::default()).unwrap();
    let second = algebraic_distance(&graph, &params, PNorm::default()).unwrap();
    assert_eq!(first.matrix, second.matrix);
}

#[test]
fn test_invalid_relaxation_arguments() {
    init();
    let graph = SparseGraph::from_matrix(&poisson_1d(5)).unwrap();

    let no_vectors = RelaxationParams {
        vectors: 0,
        ..RelaxationParams::affinity()
    };
    assert!(affinity_distance(&graph, &no_vectors).is_err());

    let small_epsilon = RelaxationParams {
        epsilon: 0.5,
        ..RelaxationParams::algebraic()
    };
    assert!(algebraic_distance(&graph, &small_epsilon, PNorm::default()).is_err());

    assert!(
        algebraic_distance(&graph, &RelaxationParams::algebraic(), PNorm::Finite(0.5)).is_err()
    );
    assert_eq!("inf".parse::<PNorm>().unwrap(), PNorm::Infinity);
    assert_eq!("3".parse::<PNorm>().unwrap(), PNorm::Finite(3.0));
    assert_eq!("absolute".parse::<DropMode>().unwrap(), DropMode::Absolute);
}
