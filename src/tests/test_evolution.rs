// src/tests/test_evolution.rs

use approx::assert_relative_eq;
use nalgebra::DMatrix;
use num_complex::Complex64;
use sprs::CsMat;

use crate::evolution::{
    EvolutionParams, ProjectionType, approximate_evolution, evolution_mask, evolution_strength,
    jacobi_step_operator, preconditioned_operator,
};
use crate::tests::init;
use crate::tests::test_data::{
    block_poisson, csr_from_dense, get, pattern, poisson_1d, poisson_2d,
};
use soc_core::ops::{eliminate_zeros, multiply, restrict_to_pattern};
use soc_core::{Advisory, SparseGraph};

fn assert_same_matrix(left: &CsMat<f64>, right: &CsMat<f64>) {
    assert_eq!(pattern(left), pattern(right));
    for (i, row) in left.outer_iterator().enumerate() {
        for (j, &v) in row.iter() {
            assert_relative_eq!(v, get(right, i, j), epsilon = 1e-12);
        }
    }
}

fn poisson_step(n: usize) -> (SparseGraph, CsMat<f64>) {
    let graph = SparseGraph::from_matrix(&poisson_1d(n)).unwrap();
    let (step, advisories) = jacobi_step_operator(&graph, 0.5, false).unwrap();
    assert!(advisories.is_empty());
    (graph, step)
}

#[test]
fn test_step_operator_is_transposed_weighted_jacobi() {
    init();
    let (_, step) = poisson_step(4);

    // I - 0.5 * D⁻¹A with D = 2: 0.5 on the diagonal, 0.25 off it
    assert_relative_eq!(get(&step, 0, 0), 0.5);
    assert_relative_eq!(get(&step, 1, 0), 0.25);
    assert_relative_eq!(get(&step, 0, 1), 0.25);
    assert_eq!(get(&step, 0, 2), 0.0);
}

#[test]
fn test_single_step_is_the_masked_step_operator() {
    init();
    let (graph, step) = poisson_step(6);
    let mask = evolution_mask(&graph);

    let (atilde, advisories) = approximate_evolution(&step, 1, &mask).unwrap();
    assert!(advisories.is_empty());
    assert_same_matrix(&atilde, &eliminate_zeros(&restrict_to_pattern(&step, &mask)));
}

#[test]
fn test_four_steps_by_squaring_match_sequential_products() {
    init();
    let (graph, step) = poisson_step(8);
    let mask = evolution_mask(&graph);

    let (atilde, advisories) = approximate_evolution(&step, 4, &mask).unwrap();
    assert!(advisories.is_empty());

    let mut sequential = step.clone();
    for _ in 0..3 {
        sequential = multiply(&sequential, &step);
    }
    let expected = eliminate_zeros(&restrict_to_pattern(&sequential, &mask));
    assert_same_matrix(&atilde, &expected);
}

#[test]
fn test_non_power_of_two_steps_take_the_exact_path() {
    init();
    let (graph, step) = poisson_step(8);
    let mask = evolution_mask(&graph);

    let (atilde, advisories) = approximate_evolution(&step, 3, &mask).unwrap();
    assert_eq!(advisories, vec![Advisory::NonPowerOfTwoSteps { steps: 3 }]);

    let cubed = multiply(&multiply(&step, &step), &step);
    assert_same_matrix(&atilde, &eliminate_zeros(&restrict_to_pattern(&cubed, &mask)));

    assert!(approximate_evolution(&step, 0, &mask).is_err());
}

#[test]
fn test_block_mask_keeps_matching_degrees_of_freedom() {
    init();
    let graph = SparseGraph::from_matrix(&block_poisson(3))
        .unwrap()
        .with_block_size(2)
        .unwrap();
    let mask = evolution_mask(&graph);

    assert_eq!(mask.outer_view(0).unwrap().indices(), &[0, 2]);
    assert_eq!(mask.outer_view(3).unwrap().indices(), &[1, 3, 5]);
    assert!(mask.data().iter().all(|&v| v == 1.0));
}

#[test]
fn test_block_preconditioning_requires_blocks() {
    init();
    let graph = SparseGraph::from_matrix(&poisson_1d(4)).unwrap();
    assert!(preconditioned_operator(&graph, true).is_err());

    let blocked = SparseGraph::from_matrix(&block_poisson(3))
        .unwrap()
        .with_block_size(2)
        .unwrap();
    let (dinv_a, advisories) = preconditioned_operator(&blocked, true).unwrap();
    assert!(advisories.is_empty());
    // every diagonal block of D⁻¹A is the identity
    for i in 0..6 {
        assert_relative_eq!(get(&dinv_a, i, i), 1.0, epsilon = 1e-12);
        let partner = i ^ 1;
        assert_relative_eq!(get(&dinv_a, i, partner), 0.0, epsilon = 1e-12);
    }
}

#[test]
fn test_evolution_strength_on_poisson_2d() {
    init();
    let graph = SparseGraph::from_matrix(&poisson_2d(5)).unwrap();
    let s = evolution_strength::<f64>(&graph, None, &EvolutionParams::default()).unwrap();

    assert_eq!(s.shape(), (25, 25));
    let validation = s.verify_against(&graph, 1e-12);
    assert!(validation.is_valid, "{:?}", validation);
    assert!(validation.empty_rows.is_empty());
}

#[test]
fn test_complex_near_null_space_matches_real() {
    init();
    let graph = SparseGraph::from_matrix(&poisson_2d(4)).unwrap();
    let params = EvolutionParams::default();

    let real = DMatrix::<f64>::from_element(16, 1, 1.0);
    let complex = DMatrix::<Complex64>::from_element(16, 1, Complex64::new(1.0, 0.0));

    let from_real = evolution_strength(&graph, Some(&real), &params).unwrap();
    let from_complex = evolution_strength(&graph, Some(&complex), &params).unwrap();
    assert_same_matrix(&from_real.matrix, &from_complex.matrix);
}

#[test]
fn test_multiple_test_vectors_and_projection() {
    init();
    let graph = SparseGraph::from_matrix(&poisson_2d(5)).unwrap();
    // constant and linear-in-x
    let b = DMatrix::<f64>::from_fn(25, 2, |i, c| if c == 0 { 1.0 } else { (i % 5) as f64 });

    for projection in [ProjectionType::L2, ProjectionType::DA] {
        let params = EvolutionParams {
            projection,
            steps: 4,
            ..Default::default()
        };
        let s = evolution_strength(&graph, Some(&b), &params).unwrap();
        let validation = s.verify_against(&graph, 1e-12);
        assert!(validation.is_valid, "{}: {:?}", projection, validation);
    }
}

#[test]
fn test_block_operator_is_amalgamated() {
    init();
    let graph = SparseGraph::from_matrix(&block_poisson(5))
        .unwrap()
        .with_block_size(2)
        .unwrap();

    for block_flag in [false, true] {
        let params = EvolutionParams {
            block_flag,
            ..Default::default()
        };
        let s = evolution_strength::<f64>(&graph, None, &params).unwrap();
        assert_eq!(s.nnodes, 5);
        let validation = s.verify_against(&graph, 1e-12);
        assert!(validation.is_valid, "block_flag={}: {:?}", block_flag, validation);
    }
}

#[test]
fn test_invalid_evolution_arguments() {
    init();
    let graph = SparseGraph::from_matrix(&poisson_1d(4)).unwrap();

    let small_epsilon = EvolutionParams {
        epsilon: 0.5,
        ..Default::default()
    };
    assert!(evolution_strength::<f64>(&graph, None, &small_epsilon).is_err());

    let no_steps = EvolutionParams {
        steps: 0,
        ..Default::default()
    };
    assert!(evolution_strength::<f64>(&graph, None, &no_steps).is_err());

    let wrong_rows = DMatrix::<f64>::from_element(3, 1, 1.0);
    assert!(evolution_strength(&graph, Some(&wrong_rows), &EvolutionParams::default()).is_err());

    assert_eq!(
        "D_A".parse::<ProjectionType>().unwrap(),
        ProjectionType::DA
    );
    assert!("l1".parse::<ProjectionType>().is_err());
}

#[test]
fn test_infinite_epsilon_keeps_every_scored_entry() {
    init();
    let graph = SparseGraph::from_matrix(&poisson_2d(4)).unwrap();
    let keep_all = EvolutionParams {
        epsilon: f64::INFINITY,
        ..Default::default()
    };
    let filtered = evolution_strength::<f64>(&graph, None, &EvolutionParams::default()).unwrap();
    let unfiltered = evolution_strength::<f64>(&graph, None, &keep_all).unwrap();

    assert!(unfiltered.nnz() >= filtered.nnz());
    assert!(unfiltered.verify_against(&graph, 1e-12).is_valid);
}

#[test]
fn test_symmetrized_measure_stays_on_the_pattern_of_a() {
    init();
    // (1, 0) and (2, 1) are not stored, their transposes are
    let a = csr_from_dense(&[
        &[2.0, -1.0, -1.0],
        &[0.0, 2.0, -1.0],
        &[-1.0, 0.0, 2.0],
    ]);
    let graph = SparseGraph::from_matrix(&a).unwrap();

    for steps in [2, 3, 4] {
        for symmetrize in [true, false] {
            let params = EvolutionParams {
                steps,
                symmetrize,
                epsilon: f64::INFINITY,
                ..Default::default()
            };
            let s = evolution_strength::<f64>(&graph, None, &params).unwrap();
            let validation = s.verify_against(&graph, 1e-12);
            assert!(
                validation.is_valid,
                "steps={steps}, symmetrize={symmetrize}: {:?}",
                validation
            );
            assert_eq!(s.get(1, 0), 0.0);
            assert_eq!(s.get(2, 1), 0.0);
        }
    }
}
