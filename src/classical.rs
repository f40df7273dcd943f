//! Threshold measures: classical (Ruge-Stüben) and symmetric (Vaněk).
//!
//! Both keep the diagonal and every off-diagonal entry that is large
//! relative to the row (classical) or to the geometric mean of the two
//! diagonals (symmetric), then take magnitudes and scale each row to peak
//! at 1.

use log::{debug, info};
use sprs::CsMat;

use soc_core::blocks::{BlockNorm, amalgamate, amalgamate_pattern};
use soc_core::ops::{diagonal, eliminate_zeros, map_values, scale_rows_by_largest_entry};
use soc_core::{SparseGraph, StrengthError, StrengthResult};

use crate::graph::{MeasureKind, StrengthGraph};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassicalParams {
    /// Threshold in [0, 1]
    pub theta: f64,
    /// Reduce blocks before thresholding (otherwise threshold points and
    /// amalgamate the result)
    pub block: bool,
    pub norm: BlockNorm,
}

impl Default for ClassicalParams {
    fn default() -> Self {
        Self {
            theta: 0.1,
            block: true,
            norm: BlockNorm::Abs,
        }
    }
}

pub fn classical_strength(
    graph: &SparseGraph,
    params: &ClassicalParams,
) -> StrengthResult<StrengthGraph> {
    if !(0.0..=1.0).contains(&params.theta) {
        return Err(StrengthError::invalid(format!(
            "expected theta in [0,1], got {}",
            params.theta
        )));
    }
    let m = graph.block_size();
    info!(
        "Classical strength: {}x{} operator, block size {}, theta={}, norm={}",
        graph.rows(),
        graph.rows(),
        m,
        params.theta,
        params.norm
    );

    let a = graph.to_csmat();
    let reduced = if m > 1 && params.block {
        // drop round-off from the reduction
        map_values(&amalgamate(&a, m, params.norm), |v| {
            if v.abs() < 1e-16 { 0.0 } else { v }
        })
    } else {
        a
    };

    let kept = match params.norm {
        BlockNorm::Abs | BlockNorm::Fro => threshold_rows(&reduced, params.theta, f64::abs),
        BlockNorm::Min => threshold_rows(&reduced, params.theta, |v| -v),
    };

    let magnitude = map_values(&kept, f64::abs);
    let scaled = eliminate_zeros(&scale_rows_by_largest_entry(&magnitude));

    let matrix = if m > 1 && !params.block {
        amalgamate_pattern(&scaled, m)
    } else {
        scaled
    };

    debug!("Classical strength: {} non-zeros", matrix.nnz());
    Ok(StrengthGraph::new(
        matrix,
        MeasureKind::Classical,
        graph.advisories().to_vec(),
    ))
}

/// Keep the diagonal and every off-diagonal entry with
/// `measure(a_ij) >= theta * max_{k != i} measure(a_ik)`.
fn threshold_rows(m: &CsMat<f64>, theta: f64, measure: impl Fn(f64) -> f64) -> CsMat<f64> {
    let (rows, cols) = m.shape();
    let mut indptr = Vec::with_capacity(rows + 1);
    let mut indices = Vec::with_capacity(m.nnz());
    let mut data = Vec::with_capacity(m.nnz());
    indptr.push(0);
    for (i, row) in m.outer_iterator().enumerate() {
        let largest = row
            .iter()
            .filter(|&(j, _)| j != i)
            .map(|(_, &v)| measure(v))
            .fold(0.0, f64::max);
        let threshold = theta * largest;
        for (j, &v) in row.iter() {
            if j == i || measure(v) >= threshold {
                indices.push(j);
                data.push(v);
            }
        }
        indptr.push(indices.len());
    }
    CsMat::new((rows, cols), indptr, indices, data)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetricParams {
    pub theta: f64,
}

impl Default for SymmetricParams {
    fn default() -> Self {
        Self { theta: 0.0 }
    }
}

pub fn symmetric_strength(
    graph: &SparseGraph,
    params: &SymmetricParams,
) -> StrengthResult<StrengthGraph> {
    if !(params.theta >= 0.0) {
        return Err(StrengthError::invalid("expected a positive theta"));
    }
    let m = graph.block_size();
    info!(
        "Symmetric strength: {}x{} operator, block size {}, theta={}",
        graph.rows(),
        graph.rows(),
        m,
        params.theta
    );

    let a = graph.to_csmat();
    let s = if m > 1 && params.theta == 0.0 {
        amalgamate_pattern(&a, m)
    } else {
        let reduced = if m > 1 {
            amalgamate(&a, m, BlockNorm::Fro)
        } else {
            a
        };
        let diag = diagonal(&reduced);
        let theta_sq = params.theta * params.theta;

        let (rows, cols) = reduced.shape();
        let mut indptr = Vec::with_capacity(rows + 1);
        let mut indices = Vec::with_capacity(reduced.nnz());
        let mut data = Vec::with_capacity(reduced.nnz());
        indptr.push(0);
        for (i, row) in reduced.outer_iterator().enumerate() {
            for (j, &v) in row.iter() {
                if i == j || v * v >= theta_sq * (diag[i] * diag[j]).abs() {
                    indices.push(j);
                    data.push(v);
                }
            }
            indptr.push(indices.len());
        }
        CsMat::new((rows, cols), indptr, indices, data)
    };

    let magnitude = map_values(&s, f64::abs);
    let matrix = eliminate_zeros(&scale_rows_by_largest_entry(&magnitude));
    debug!("Symmetric strength: {} non-zeros", matrix.nnz());
    Ok(StrengthGraph::new(
        matrix,
        MeasureKind::Symmetric,
        graph.advisories().to_vec(),
    ))
}
