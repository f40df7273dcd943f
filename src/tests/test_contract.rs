// src/tests/test_contract.rs
//! Properties every measure shares: unit row maxima, diagonal presence,
//! support inside A, no coupling between disconnected components.

use nalgebra::DMatrix;
use sprs::CsMat;

use crate::builder::StrengthBuilder;
use crate::graph::MeasureKind;
use crate::tests::init;
use crate::tests::test_data::{
    block_poisson, grid_coordinates, pattern, poisson_2d, two_disconnected_blocks,
};
use soc_core::SparseGraph;
use soc_core::ops::scale_rows_by_largest_entry;

const MEASURES: [MeasureKind; 8] = [
    MeasureKind::Classical,
    MeasureKind::Symmetric,
    MeasureKind::Pairwise,
    MeasureKind::Evolution,
    MeasureKind::Distance,
    MeasureKind::Affinity,
    MeasureKind::Algebraic,
    MeasureKind::Energy,
];

fn builder_for(measure: MeasureKind, coordinates: DMatrix<f64>) -> StrengthBuilder {
    let builder = StrengthBuilder::new()
        .with_measure(measure)
        .with_coordinates(coordinates);
    match measure {
        // make every row an owner
        MeasureKind::Pairwise => builder.with_theta(3.0),
        _ => builder,
    }
}

#[test]
fn test_every_measure_honours_the_contract() {
    init();
    let a = poisson_2d(6);
    let graph = SparseGraph::from_matrix(&a).unwrap();

    for measure in MEASURES {
        let s = builder_for(measure, grid_coordinates(6)).build(&a).unwrap();
        let validation = s.verify_against(&graph, 1e-12);
        assert!(validation.is_valid, "{}: {:?}", measure, validation);
        assert!(validation.empty_rows.is_empty(), "{}", measure);
    }
}

#[test]
fn test_row_normalisation_is_idempotent() {
    init();
    let a = poisson_2d(5);

    for measure in MEASURES {
        let s = builder_for(measure, grid_coordinates(5)).build(&a).unwrap();
        let again = scale_rows_by_largest_entry(&s.matrix);
        assert_eq!(again, s.matrix, "{}", measure);
    }
}

#[test]
fn test_disconnected_components_stay_apart() {
    init();
    let a = two_disconnected_blocks(4);
    let coordinates = DMatrix::from_fn(8, 1, |i, _| i as f64);

    for measure in MEASURES {
        let s = builder_for(measure, coordinates.clone()).build(&a).unwrap();
        for (i, j) in pattern(&s.matrix) {
            assert_eq!(i / 4, j / 4, "{}: cross-block entry ({}, {})", measure, i, j);
        }
        for i in 0..8 {
            assert!(s.get(i, i) > 0.0, "{}: missing diagonal {}", measure, i);
        }
    }
}

#[test]
fn test_block_operators_reduce_to_supernodes() {
    init();
    let a: CsMat<f64> = block_poisson(5);
    let graph = SparseGraph::from_matrix(&a)
        .unwrap()
        .with_block_size(2)
        .unwrap();
    let coordinates = DMatrix::from_fn(5, 1, |i, _| i as f64);

    for measure in [
        MeasureKind::Classical,
        MeasureKind::Symmetric,
        MeasureKind::Evolution,
        MeasureKind::Distance,
        MeasureKind::Energy,
    ] {
        let s = builder_for(measure, coordinates.clone())
            .with_block_size(2)
            .build(&a)
            .unwrap();
        assert_eq!(s.nnodes, 5, "{}", measure);
        let validation = s.verify_against(&graph, 1e-12);
        assert!(validation.is_valid, "{}: {:?}", measure, validation);
    }
}
