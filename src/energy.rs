//! Energy-based strength measure.
//!
//! `steps + 1` weighted-Jacobi sweeps from a zero guess, with
//! `ω = 1 / ρ(D⁻¹A)`, give an approximate inverse Z. Column i of Z is a
//! smooth error v for node i. Removing entry j of v changes its energy, and
//! the relative change
//!
//! ```text
//! ||v - v_j e_j||_A / ||v||_A - 1
//! ```
//!
//! is the strength of (i, j). Changes below `WEAK_CHANGE` count as weak.
//! The values are thresholded with the classical measure, given a unit
//! diagonal, amalgamated for block operators and scaled per row.

use log::{debug, info, trace};
use rayon::prelude::*;
use sprs::CsMat;

use soc_core::blocks::amalgamate_pattern;
use soc_core::ops::{
    add_diagonal, diagonal, multiply, scale_rows, scale_rows_by_largest_entry, spmv,
};
use soc_core::spectral::approximate_spectral_radius;
use soc_core::{SparseGraph, StrengthError, StrengthResult};

use crate::classical::{ClassicalParams, classical_strength};
use crate::graph::{MeasureKind, StrengthGraph};

/// Energy changes below this are weak connections
const WEAK_CHANGE: f64 = -0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyParams {
    /// Classical drop threshold in [0, 1]
    pub theta: f64,
    /// Relaxation steps; `steps + 1` sweeps are applied
    pub steps: usize,
}

impl Default for EnergyParams {
    fn default() -> Self {
        Self {
            theta: 0.0,
            steps: 2,
        }
    }
}

impl EnergyParams {
    pub fn validate(&self) -> StrengthResult<()> {
        if !(0.0..=1.0).contains(&self.theta) {
            return Err(StrengthError::invalid(format!(
                "expected theta in [0,1], got {}",
                self.theta
            )));
        }
        Ok(())
    }
}

/// `Z ← Z + ω D⁻¹ (I - A Z)` applied `steps + 1` times from `Z = 0`.
///
/// Rows with a zero diagonal get no update.
pub fn approximate_inverse(a: &CsMat<f64>, steps: usize) -> CsMat<f64> {
    let n = a.rows();
    let dinv: Vec<f64> = diagonal(a)
        .iter()
        .map(|&d| if d != 0.0 { 1.0 / d } else { 0.0 })
        .collect();
    let rho = approximate_spectral_radius(&scale_rows(a, &dinv));
    let omega = if rho > 0.0 { 1.0 / rho } else { 1.0 };
    debug!("rho(D⁻¹A) = {:.6}, omega = {:.6}", rho, omega);

    let weights: Vec<f64> = dinv.iter().map(|&d| omega * d).collect();
    let identity: CsMat<f64> = CsMat::eye(n);
    let mut z: CsMat<f64> = CsMat::zero((n, n));
    for sweep in 0..=steps {
        let residual: CsMat<f64> = &identity - &multiply(a, &z);
        let update = scale_rows(&residual, &weights);
        z = &z + &update;
        trace!("sweep {}: {} non-zeros in Z", sweep, z.nnz());
    }
    z
}

/// Energy change of every stored entry of A, on the pattern of A.
///
/// Row i is computed from column i of `z`. A column with no positive energy
/// gives a zero row.
pub fn energy_changes(a: &CsMat<f64>, z: &CsMat<f64>) -> CsMat<f64> {
    let n = a.rows();
    let columns: CsMat<f64> = z.transpose_view().to_csr();
    let a_t: CsMat<f64> = a.transpose_view().to_csr();
    let diag = diagonal(a);

    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut v = vec![0.0; n];
            if let Some(column) = columns.outer_view(i) {
                for (j, &x) in column.iter() {
                    v[j] = x;
                }
            }
            let av = spmv(a, &v);
            let atv = spmv(&a_t, &v);
            let energy: f64 = v.iter().zip(av.iter()).map(|(x, y)| x * y).sum();

            let Some(row) = a.outer_view(i) else {
                return Vec::new();
            };
            if !(energy > 0.0) {
                return vec![0.0; row.nnz()];
            }
            let norm = energy.sqrt();
            row.iter()
                .map(|(c, _)| {
                    let vc = v[c];
                    // vᵀAv with v_c removed
                    let reduced = energy - vc * (av[c] + atv[c]) + vc * vc * diag[c];
                    let change = reduced.sqrt() / norm - 1.0;
                    // a negative reduced energy gives NaN, dropped as weak
                    if change > WEAK_CHANGE { change.abs() } else { 0.0 }
                })
                .collect()
        })
        .collect();

    let data: Vec<f64> = rows.into_iter().flatten().collect();
    CsMat::new(
        a.shape(),
        a.proper_indptr().to_vec(),
        a.indices().to_vec(),
        data,
    )
}

/// Energy-based strength graph.
pub fn energy_strength(
    graph: &SparseGraph,
    params: &EnergyParams,
) -> StrengthResult<StrengthGraph> {
    params.validate()?;
    let n = graph.rows();
    let m = graph.block_size();
    info!(
        "Energy strength: {}x{} operator, block size {}, steps={}, theta={}",
        n, n, m, params.steps, params.theta
    );
    let start = std::time::Instant::now();

    let a = graph.to_csmat();
    let z = approximate_inverse(&a, params.steps);
    let changes = energy_changes(&a, &z);

    // point-wise drop, whatever the block size
    let points = SparseGraph::from_matrix(&changes)?;
    let dropped = classical_strength(
        &points,
        &ClassicalParams {
            theta: params.theta,
            ..Default::default()
        },
    )?;

    let mut strength = add_diagonal(&dropped.matrix, &vec![1.0; n]);
    if m > 1 {
        strength = amalgamate_pattern(&strength, m);
    }
    let matrix = scale_rows_by_largest_entry(&strength);

    info!(
        "Energy strength done: {} non-zeros in {:?}",
        matrix.nnz(),
        start.elapsed()
    );
    Ok(StrengthGraph::new(
        matrix,
        MeasureKind::Energy,
        graph.advisories().to_vec(),
    ))
}
