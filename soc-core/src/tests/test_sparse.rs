// soc-core/src/tests/test_sparse.rs

use crate::advisory::Advisory;
use crate::error::StrengthError;
use crate::sparse::SparseGraph;
use crate::tests::{csr_from_dense, poisson_1d};

#[test]
fn test_from_parts_sorts_rows_and_finds_diagonal() {
    crate::init();

    // row 0 stored as (1, 0) out of order, row 1 has no diagonal
    let graph = SparseGraph::from_parts(
        vec![-1.0, 4.0, -2.0, 3.0],
        vec![1, 0, 0, 2],
        vec![0, 2, 3, 4],
        (3, 3),
    )
    .unwrap();

    assert_eq!(graph.indices(), &[0, 1, 0, 2]);
    assert_eq!(graph.data(), &[4.0, -1.0, -2.0, 3.0]);
    assert_eq!(graph.diagonal_index(0), Some(0));
    assert_eq!(graph.diagonal_index(1), None);
    assert_eq!(graph.diagonal_index(2), Some(3));
    assert_eq!(graph.diagonal_values(), vec![4.0, 0.0, 3.0]);
}

#[test]
fn test_non_square_rejected() {
    crate::init();
    let a = csr_from_dense(&[&[1.0, 2.0, 0.0], &[0.0, 1.0, 3.0]]);
    let err = SparseGraph::from_matrix(&a).unwrap_err();
    assert!(matches!(err, StrengthError::InvalidArgument(_)));
}

#[test]
fn test_bad_parts_are_structure_errors() {
    crate::init();
    // indptr shorter than rows + 1
    let err = SparseGraph::from_parts(vec![1.0], vec![0], vec![0, 1], (2, 2)).unwrap_err();
    assert!(matches!(err, StrengthError::Structure(_)), "got {:?}", err);

    // column index out of bounds
    let err = SparseGraph::from_parts(vec![1.0], vec![5], vec![0, 1, 1], (2, 2)).unwrap_err();
    assert!(matches!(err, StrengthError::Structure(_)), "got {:?}", err);
}

#[test]
fn test_csc_input_is_converted_with_advisory() {
    crate::init();
    let a = poisson_1d(4).to_csc();
    let graph = SparseGraph::from_matrix(&a).unwrap();

    assert_eq!(graph.nnz(), 10);
    assert_eq!(
        graph.advisories(),
        &[Advisory::ImplicitConversion {
            from: "csc".to_string()
        }]
    );
    let (start, end) = graph.row_range(1);
    let cols: Vec<usize> = (start..end).map(|k| graph.column_at(k)).collect();
    assert_eq!(cols, vec![0, 1, 2]);
}

#[test]
fn test_block_size_must_divide_rows() {
    crate::init();
    let graph = SparseGraph::from_matrix(&poisson_1d(6)).unwrap();
    assert!(graph.clone().with_block_size(4).is_err());
    assert!(graph.clone().with_block_size(0).is_err());

    let blocked = graph.with_block_size(3).unwrap();
    assert_eq!(blocked.block_size(), 3);
    assert_eq!(blocked.num_nodes(), 2);
}

#[test]
fn test_without_explicit_zeros_keeps_block_size() {
    crate::init();
    let graph = SparseGraph::from_parts(
        vec![1.0, 0.0, 0.0, 1.0],
        vec![0, 1, 0, 1],
        vec![0, 2, 4],
        (2, 2),
    )
    .unwrap()
    .with_block_size(2)
    .unwrap();

    let cleaned = graph.without_explicit_zeros();
    assert_eq!(cleaned.nnz(), 2);
    assert_eq!(cleaned.block_size(), 2);
    assert_eq!(cleaned.diagonal_index(1), Some(1));
}

#[test]
fn test_round_trip_to_csmat() {
    crate::init();
    let a = poisson_1d(5);
    let graph = SparseGraph::from_matrix(&a).unwrap();
    assert_eq!(graph.to_csmat(), a);
    assert!((graph.sparsity() - (1.0 - 13.0 / 25.0)).abs() < 1e-12);
}
