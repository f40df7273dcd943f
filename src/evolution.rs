//! Evolution-based strength measure.
//!
//! The operator exponential of the Jacobi-preconditioned system is
//! approximated by `steps` weighted-relaxation steps `J = I - ω D⁻¹A` with
//! `ω = 1 / ρ(D⁻¹A)`. The transpose is kept in CSR so that row i of the
//! result is the evolved point source δ_i.
//!
//! With `steps = 2^q + r`:
//! - `q > 0, r = 0`: q-1 full squarings, then one masked product
//! - `r > 0`: q squarings, r more products by the step operator, mask at the end
//! - `steps = 1`: the step operator itself, masked
//!
//! The evolved operator is then scored against the near-null-space vectors,
//! filtered, symmetrised, amalgamated and inverted into a strength graph.

use std::fmt;
use std::str::FromStr;

use log::{debug, info, trace};
use nalgebra::{ComplexField, DMatrix};
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};

use soc_core::blocks::{BlockNorm, amalgamate, block_diagonal_inverse};
use soc_core::ops::{
    apply_distance_filter, eliminate_zeros, incomplete_multiply, map_values, multiply,
    restrict_to_pattern, scale_rows, scale_rows_by_largest_entry, set_diagonal, symmetrize,
};
use soc_core::spectral::approximate_spectral_radius;
use soc_core::{Advisory, SparseGraph, StrengthError, StrengthResult};

use crate::graph::{MeasureKind, StrengthGraph};
use crate::scoring::{default_tolerance, score};

/// Norm of the constrained minimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectionType {
    #[default]
    L2,
    /// Weighted by the diagonal of A, scale invariant
    DA,
}

impl FromStr for ProjectionType {
    type Err = StrengthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "l2" => Ok(ProjectionType::L2),
            "D_A" | "d_a" => Ok(ProjectionType::DA),
            other => Err(StrengthError::invalid(format!(
                "proj_type must be \"l2\" or \"D_A\", got {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for ProjectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionType::L2 => write!(f, "l2"),
            ProjectionType::DA => write!(f, "D_A"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvolutionParams {
    /// Relative drop tolerance, `f64::INFINITY` keeps everything
    pub epsilon: f64,
    /// Number of relaxation steps k
    pub steps: usize,
    pub projection: ProjectionType,
    /// Precondition with the inverse of each diagonal block
    pub block_flag: bool,
    /// Symmetrise as (S + Sᵀ) / 2
    pub symmetrize: bool,
    /// Reduction used to amalgamate block outputs
    pub norm: BlockNorm,
    /// Error below which a connection counts as exactly reproduced
    pub tolerance: f64,
}

impl Default for EvolutionParams {
    fn default() -> Self {
        Self {
            epsilon: 4.0,
            steps: 2,
            projection: ProjectionType::L2,
            block_flag: false,
            symmetrize: true,
            norm: BlockNorm::Min,
            tolerance: default_tolerance(),
        }
    }
}

impl EvolutionParams {
    pub fn validate(&self) -> StrengthResult<()> {
        if !(self.epsilon >= 1.0) {
            return Err(StrengthError::invalid(format!(
                "expected epsilon >= 1.0, got {}",
                self.epsilon
            )));
        }
        if self.steps == 0 {
            return Err(StrengthError::invalid("number of time steps must be > 0"));
        }
        if !(self.tolerance >= 0.0) {
            return Err(StrengthError::invalid(format!(
                "expected a non-negative tolerance, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// D⁻¹A with the point diagonal (zeros replaced by one) or, when `block` is
/// set, the inverse of each diagonal block.
pub fn preconditioned_operator(
    graph: &SparseGraph,
    block: bool,
) -> StrengthResult<(CsMat<f64>, Vec<Advisory>)> {
    let a = graph.to_csmat();
    if block {
        if graph.block_size() < 2 {
            return Err(StrengthError::invalid(
                "block preconditioning requires a block size greater than one",
            ));
        }
        let (dinv, advisories) = block_diagonal_inverse(graph);
        return Ok((multiply(&dinv, &a), advisories));
    }

    let dinv: Vec<f64> = graph
        .diagonal_values()
        .iter()
        .map(|&d| if d != 0.0 { 1.0 / d } else { 1.0 })
        .collect();
    Ok((scale_rows(&a, &dinv), Vec::new()))
}

/// `(I - weight * dinv_a)ᵀ` in CSR
pub fn step_from_preconditioned(dinv_a: &CsMat<f64>, weight: f64) -> CsMat<f64> {
    let n = dinv_a.rows();
    let mut trimat = TriMat::with_capacity((n, n), dinv_a.nnz() + n);
    for i in 0..n {
        trimat.add_triplet(i, i, 1.0);
    }
    for (i, row) in dinv_a.outer_iterator().enumerate() {
        for (j, &v) in row.iter() {
            // transposed on the fly, duplicates on the diagonal are summed
            trimat.add_triplet(j, i, -weight * v);
        }
    }
    trimat.to_csr()
}

/// Transposed weighted-Jacobi step operator of A
pub fn jacobi_step_operator(
    graph: &SparseGraph,
    weight: f64,
    block: bool,
) -> StrengthResult<(CsMat<f64>, Vec<Advisory>)> {
    let (dinv_a, advisories) = preconditioned_operator(graph, block)?;
    Ok((step_from_preconditioned(&dinv_a, weight), advisories))
}

/// Pattern of A with unit values; for block size m > 1 row i keeps only the
/// columns of the same degree of freedom (`j mod m == i mod m`).
pub fn evolution_mask(graph: &SparseGraph) -> CsMat<f64> {
    let m = graph.block_size();
    let n = graph.rows();
    let mut indptr = Vec::with_capacity(n + 1);
    let mut indices = Vec::with_capacity(graph.nnz());
    indptr.push(0);
    for i in 0..n {
        let (start, end) = graph.row_range(i);
        for k in start..end {
            let j = graph.column_at(k);
            if graph.value_at(k) != 0.0 && j % m == i % m {
                indices.push(j);
            }
        }
        indptr.push(indices.len());
    }
    let data = vec![1.0; indices.len()];
    CsMat::new((n, n), indptr, indices, data)
}

/// `step^steps` evaluated on the pattern of `mask`.
pub fn approximate_evolution(
    step: &CsMat<f64>,
    steps: usize,
    mask: &CsMat<f64>,
) -> StrengthResult<(CsMat<f64>, Vec<Advisory>)> {
    if steps == 0 {
        return Err(StrengthError::invalid("number of time steps must be > 0"));
    }
    let nsquare = steps.ilog2() as usize;
    let ninc = steps - (1usize << nsquare);
    debug!(
        "Evolution steps={}: {} squarings, {} incremental products",
        steps, nsquare, ninc
    );

    let mut advisories = Vec::new();

    let atilde = if nsquare == 0 {
        restrict_to_pattern(step, mask)
    } else if ninc == 0 {
        let mut atilde = step.clone();
        for s in 0..(nsquare - 1) {
            atilde = multiply(&atilde, &atilde);
            trace!("squaring {}: {} non-zeros", s, atilde.nnz());
        }
        incomplete_multiply(&atilde, &atilde, mask)
    } else {
        let advisory = Advisory::NonPowerOfTwoSteps { steps };
        advisory.log();
        advisories.push(advisory);

        let mut atilde = step.clone();
        for _ in 0..nsquare {
            atilde = multiply(&atilde, &atilde);
        }
        for _ in 0..ninc {
            atilde = multiply(&atilde, step);
        }
        restrict_to_pattern(&atilde, mask)
    };

    Ok((eliminate_zeros(&atilde), advisories))
}

/// Evolution strength graph.
///
/// `b` holds the near-null-space vectors (N×K), the all-ones column when
/// `None`. Real and complex scalars are both accepted.
pub fn evolution_strength<T>(
    graph: &SparseGraph,
    b: Option<&DMatrix<T>>,
    params: &EvolutionParams,
) -> StrengthResult<StrengthGraph>
where
    T: ComplexField<RealField = f64> + Copy,
{
    params.validate()?;
    let n = graph.rows();
    let m = graph.block_size();

    let ones;
    let b = match b {
        Some(b) => b,
        None => {
            ones = DMatrix::<T>::from_element(n, 1, T::from_real(1.0));
            &ones
        }
    };
    if b.nrows() != n || b.ncols() == 0 {
        return Err(StrengthError::invalid(format!(
            "near-null-space must be {}xK with K >= 1, got {}x{}",
            n,
            b.nrows(),
            b.ncols()
        )));
    }

    info!(
        "Evolution strength: {}x{} operator, block size {}, K={}, steps={}, epsilon={}, proj={}",
        n,
        n,
        m,
        b.ncols(),
        params.steps,
        params.epsilon,
        params.projection
    );
    let start = std::time::Instant::now();

    let graph = graph.without_explicit_zeros();
    let mut advisories = graph.advisories().to_vec();

    let (dinv_a, block_advisories) = preconditioned_operator(&graph, params.block_flag)?;
    advisories.extend(block_advisories);

    let rho = approximate_spectral_radius(&dinv_a);
    let weight = if rho > 0.0 { 1.0 / rho } else { 1.0 };
    debug!("rho(D⁻¹A) = {:.6}, step size {:.6}", rho, weight);

    let step = step_from_preconditioned(&dinv_a, weight);
    let mask = evolution_mask(&graph);
    let (atilde, step_advisories) = approximate_evolution(&step, params.steps, &mask)?;
    advisories.extend(step_advisories);

    let weights = match params.projection {
        ProjectionType::L2 => vec![1.0; n],
        ProjectionType::DA => graph.diagonal_values(),
    };
    let (scores, score_advisories) = score(&atilde, b, &weights, params.tolerance);
    advisories.extend(score_advisories);

    let mut strength = scores;
    if params.epsilon != f64::INFINITY {
        strength = eliminate_zeros(&apply_distance_filter(strength, params.epsilon));
    }
    if params.symmetrize {
        // Sᵀ brings in the pattern of Aᵀ on non-symmetric operators
        strength = restrict_to_pattern(&symmetrize(&strength), &mask);
    }
    // every point is strongly connected to itself
    strength = set_diagonal(&strength, 1.0);

    if m > 1 {
        strength = amalgamate(&eliminate_zeros(&strength), m, params.norm);
    }

    // small distance means strong connection
    let inverted = map_values(&strength, |v| 1.0 / v);
    let matrix = scale_rows_by_largest_entry(&inverted);

    info!(
        "Evolution strength done: {} non-zeros in {:?}",
        matrix.nnz(),
        start.elapsed()
    );
    Ok(StrengthGraph::new(matrix, MeasureKind::Evolution, advisories))
}
