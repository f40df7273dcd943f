// soc-core/src/blocks.rs
//! Block (multi-degree-of-freedom) helpers.
//!
//! Block inputs are stored as point CSR with a uniform block size m. A block
//! (I, J) is the set of stored entries with `row / m == I` and `col / m == J`.
//! Amalgamation collapses every stored block to one scalar between supernodes.

use std::str::FromStr;

use dashmap::DashMap;
use log::{debug, info, trace};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};

use crate::advisory::Advisory;
use crate::error::StrengthError;
use crate::sparse::SparseGraph;

/// Reduction applied to the entries of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockNorm {
    /// Largest magnitude entry
    Abs,
    /// Smallest (most negative) entry
    Min,
    /// Frobenius norm
    Fro,
}

impl FromStr for BlockNorm {
    type Err = StrengthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abs" => Ok(BlockNorm::Abs),
            "min" => Ok(BlockNorm::Min),
            "fro" => Ok(BlockNorm::Fro),
            other => Err(StrengthError::invalid(format!(
                "Invalid choice of norm: {:?}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for BlockNorm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BlockNorm::Abs => "abs",
            BlockNorm::Min => "min",
            BlockNorm::Fro => "fro",
        };
        write!(f, "{}", name)
    }
}

impl BlockNorm {
    fn seed(&self, v: f64) -> f64 {
        match self {
            BlockNorm::Abs => v.abs(),
            BlockNorm::Min => v,
            BlockNorm::Fro => v * v,
        }
    }

    fn accumulate(&self, acc: f64, v: f64) -> f64 {
        match self {
            BlockNorm::Abs => acc.max(v.abs()),
            BlockNorm::Min => acc.min(v),
            BlockNorm::Fro => acc + v * v,
        }
    }

    fn finish(&self, acc: f64) -> f64 {
        match self {
            BlockNorm::Fro => acc.sqrt(),
            _ => acc,
        }
    }
}

/// Collapse `m` (point CSR, block size `block_size`) to one value per stored
/// block using `norm`.
pub fn amalgamate(m: &CsMat<f64>, block_size: usize, norm: BlockNorm) -> CsMat<f64> {
    reduce_blocks(m, block_size, |acc, v| match acc {
        None => norm.seed(v),
        Some(acc) => norm.accumulate(acc, v),
    }, |acc| norm.finish(acc))
}

/// Collapse `m` to the supernode pattern with unit values
pub fn amalgamate_pattern(m: &CsMat<f64>, block_size: usize) -> CsMat<f64> {
    reduce_blocks(m, block_size, |_, _| 1.0, |acc| acc)
}

fn reduce_blocks(
    m: &CsMat<f64>,
    block_size: usize,
    fold: impl Fn(Option<f64>, f64) -> f64 + Sync,
    finish: impl Fn(f64) -> f64 + Sync,
) -> CsMat<f64> {
    assert!(block_size > 0, "block size must be positive");
    let (rows, cols) = m.shape();
    assert!(
        rows % block_size == 0 && cols % block_size == 0,
        "block size {} does not divide {}x{}",
        block_size,
        rows,
        cols
    );
    let (n_rows, n_cols) = (rows / block_size, cols / block_size);

    info!(
        "Amalgamating {}x{} matrix into {}x{} supernodes",
        rows, cols, n_rows, n_cols
    );
    let start = std::time::Instant::now();

    // Concurrent block map keyed by supernode pair
    let blocks: DashMap<(usize, usize), f64> = DashMap::with_capacity(m.nnz());

    (0..rows).into_par_iter().for_each(|i| {
        if let Some(row) = m.outer_view(i) {
            let bi = i / block_size;
            for (j, &v) in row.iter() {
                blocks
                    .entry((bi, j / block_size))
                    .and_modify(|acc| *acc = fold(Some(*acc), v))
                    .or_insert_with(|| fold(None, v));
            }
        }
    });

    let mut reduced: Vec<((usize, usize), f64)> = blocks.into_iter().collect();
    reduced.par_sort_unstable_by_key(|&((i, j), _)| (i, j));
    trace!("Reduced {} blocks in {:?}", reduced.len(), start.elapsed());

    let mut trimat = TriMat::with_capacity((n_rows, n_cols), reduced.len());
    for ((i, j), acc) in reduced {
        trimat.add_triplet(i, j, finish(acc));
    }

    debug!("Amalgamation time: {:?}", start.elapsed());
    trimat.to_csr()
}

/// Inverse of every diagonal block as a block-diagonal CSR matrix.
///
/// Singular blocks are pseudo-inverted and reported.
pub fn block_diagonal_inverse(graph: &SparseGraph) -> (CsMat<f64>, Vec<Advisory>) {
    let m = graph.block_size();
    let n = graph.rows();
    let nodes = graph.num_nodes();

    let inverses: Vec<(DMatrix<f64>, Option<Advisory>)> = (0..nodes)
        .into_par_iter()
        .map(|node| {
            let base = node * m;
            let mut block = DMatrix::<f64>::zeros(m, m);
            for p in 0..m {
                let (start, end) = graph.row_range(base + p);
                for k in start..end {
                    let j = graph.column_at(k);
                    if j >= base && j < base + m {
                        block[(p, j - base)] = graph.value_at(k);
                    }
                }
            }
            match block.clone().try_inverse() {
                Some(inv) => (inv, None),
                None => {
                    let pinv = block
                        .pseudo_inverse(1e-12)
                        .unwrap_or_else(|_| DMatrix::<f64>::zeros(m, m));
                    (pinv, Some(Advisory::SingularDiagonalBlock { node }))
                }
            }
        })
        .collect();

    let mut advisories = Vec::new();
    let mut trimat = TriMat::with_capacity((n, n), nodes * m * m);
    for (node, (inv, advisory)) in inverses.into_iter().enumerate() {
        if let Some(advisory) = advisory {
            advisory.log();
            advisories.push(advisory);
        }
        let base = node * m;
        for p in 0..m {
            for q in 0..m {
                let v = inv[(p, q)];
                if v != 0.0 {
                    trimat.add_triplet(base + p, base + q, v);
                }
            }
        }
    }

    (trimat.to_csr(), advisories)
}
