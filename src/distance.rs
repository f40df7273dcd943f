//! Distance-based strength measures.
//!
//! All three measures compute a distance per stored entry of A (small means
//! strong), drop far neighbours relative to the nearest one, and invert:
//! - coordinate distance: Euclidean distance between node coordinates
//! - affinity: `1 - cos²` between relaxed test vectors
//! - algebraic distance: p-norm of the difference of relaxed test vectors
//!
//! The relaxed test vectors are smoothed random vectors; the generator is
//! seeded so the result is reproducible.

use std::fmt;
use std::str::FromStr;

use log::{debug, info, trace};
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sprs::CsMat;

use soc_core::blocks::amalgamate_pattern;
use soc_core::ops::{
    add_diagonal, apply_absolute_distance_filter, apply_distance_filter, eliminate_zeros,
    map_values, scale_rows_by_largest_entry,
};
use soc_core::relax::jacobi;
use soc_core::{SparseGraph, StrengthError, StrengthResult};

use crate::graph::{MeasureKind, StrengthGraph};

/// Smallest coordinate distance, so coincident nodes stay connected
const MIN_DISTANCE: f64 = 1e-6;

/// How the coordinate-distance drop tolerance is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DropMode {
    /// Drop entries farther than theta times the nearest neighbour
    #[default]
    Relative,
    /// Drop entries farther than theta
    Absolute,
}

impl FromStr for DropMode {
    type Err = StrengthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relative" => Ok(DropMode::Relative),
            "absolute" => Ok(DropMode::Absolute),
            other => Err(StrengthError::invalid(format!(
                "unknown drop mode: {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for DropMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropMode::Relative => write!(f, "relative"),
            DropMode::Absolute => write!(f, "absolute"),
        }
    }
}

/// Norm of the algebraic distance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PNorm {
    Finite(f64),
    Infinity,
}

impl Default for PNorm {
    fn default() -> Self {
        PNorm::Finite(2.0)
    }
}

impl FromStr for PNorm {
    type Err = StrengthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inf" | "infinity" => Ok(PNorm::Infinity),
            other => other
                .parse::<f64>()
                .map(|p| {
                    if p.is_infinite() {
                        PNorm::Infinity
                    } else {
                        PNorm::Finite(p)
                    }
                })
                .map_err(|_| StrengthError::invalid(format!("invalid p-norm: {:?}", other))),
        }
    }
}

impl fmt::Display for PNorm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PNorm::Finite(p) => write!(f, "{}", p),
            PNorm::Infinity => write!(f, "inf"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceParams {
    pub theta: f64,
    pub drop: DropMode,
}

impl Default for DistanceParams {
    fn default() -> Self {
        Self {
            theta: 2.0,
            drop: DropMode::Relative,
        }
    }
}

/// Relaxation test-vector parameters shared by affinity and algebraic
/// distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaxationParams {
    /// Jacobi weight
    pub alpha: f64,
    /// Number of test vectors R
    pub vectors: usize,
    /// Jacobi sweeps per vector
    pub iterations: usize,
    /// Relative drop tolerance
    pub epsilon: f64,
    pub seed: u64,
}

impl RelaxationParams {
    pub fn affinity() -> Self {
        Self {
            alpha: 0.5,
            vectors: 5,
            iterations: 20,
            epsilon: 4.0,
            seed: 42,
        }
    }

    pub fn algebraic() -> Self {
        Self {
            epsilon: 2.0,
            ..Self::affinity()
        }
    }

    pub fn validate(&self) -> StrengthResult<()> {
        if !(self.alpha >= 0.0) {
            return Err(StrengthError::invalid("expected alpha>0"));
        }
        if self.vectors == 0 {
            return Err(StrengthError::invalid("expected integer R>0"));
        }
        if self.iterations == 0 {
            return Err(StrengthError::invalid("expected integer k>0"));
        }
        if !(self.epsilon >= 1.0) {
            return Err(StrengthError::invalid("expected epsilon>1.0"));
        }
        Ok(())
    }
}

/// Strength from node coordinates `v` (one row per node, or per supernode
/// for block operators).
pub fn distance_strength(
    graph: &SparseGraph,
    v: &DMatrix<f64>,
    params: &DistanceParams,
) -> StrengthResult<StrengthGraph> {
    if !(params.theta >= 0.0) {
        return Err(StrengthError::invalid(format!(
            "expected a non-negative theta, got {}",
            params.theta
        )));
    }

    let pattern = if graph.block_size() > 1 {
        amalgamate_pattern(&graph.to_csmat(), graph.block_size())
    } else {
        graph.to_csmat()
    };
    if v.nrows() != pattern.rows() {
        return Err(StrengthError::invalid(format!(
            "expected {} coordinate rows, got {}",
            pattern.rows(),
            v.nrows()
        )));
    }
    info!(
        "Distance strength: {} nodes, {} dimensions, theta={}, drop={}",
        pattern.rows(),
        v.ncols(),
        params.theta,
        params.drop
    );

    let c = pattern_values(&pattern, |i, j| {
        let d = v
            .row(i)
            .iter()
            .zip(v.row(j).iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        d.max(MIN_DISTANCE)
    });

    let c = match params.drop {
        DropMode::Relative if params.theta != f64::INFINITY => {
            apply_distance_filter(c, params.theta)
        }
        DropMode::Relative => c,
        DropMode::Absolute => apply_absolute_distance_filter(c, params.theta),
    };
    let c = eliminate_zeros(&c);
    let c = add_diagonal(&c, &vec![1.0; c.rows()]);

    let inverted = map_values(&c, |d| 1.0 / d);
    let matrix = scale_rows_by_largest_entry(&inverted);
    debug!("Distance strength: {} non-zeros", matrix.nnz());
    Ok(StrengthGraph::new(
        matrix,
        MeasureKind::Distance,
        graph.advisories().to_vec(),
    ))
}

/// R random vectors in [-0.5, 0.5), each smoothed by `iterations` weighted
/// Jacobi sweeps on `A x = 0`. Returns an N×R matrix.
pub fn relaxation_vectors(
    a: &CsMat<f64>,
    vectors: usize,
    iterations: usize,
    alpha: f64,
    seed: u64,
) -> DMatrix<f64> {
    let n = a.rows();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    // column-major: vector r occupies entries r*n .. (r+1)*n
    let mut x = DMatrix::<f64>::from_fn(n, vectors, |_, _| 0.0);
    for value in x.iter_mut() {
        *value = rng.random_range(-0.5..0.5);
    }

    let zeros = vec![0.0; n];
    x.as_mut_slice()
        .par_chunks_mut(n.max(1))
        .enumerate()
        .for_each(|(r, column)| {
            jacobi(a, column, &zeros, iterations, alpha);
            trace!("relaxation vector {} smoothed", r);
        });
    x
}

/// Shared tail of the relaxation-vector measures: distances on the pattern
/// of A, self distances dropped, relative filter, inversion, unit diagonal,
/// row scaling.
pub fn distance_measure_common(
    graph: &SparseGraph,
    x: &DMatrix<f64>,
    epsilon: f64,
    measure: MeasureKind,
    distance: impl Fn(&DMatrix<f64>, usize, usize) -> f64 + Sync,
) -> StrengthResult<StrengthGraph> {
    let pattern = graph.to_csmat();
    let c = pattern_values(&pattern, |i, j| if i == j { 0.0 } else { distance(x, i, j) });
    let c = eliminate_zeros(&c);

    let c = eliminate_zeros(&apply_distance_filter(c, epsilon));
    let inverted = map_values(&c, |d| 1.0 / d);
    let with_identity = add_diagonal(&inverted, &vec![1.0; inverted.rows()]);
    let matrix = scale_rows_by_largest_entry(&with_identity);

    debug!("{} strength: {} non-zeros", measure, matrix.nnz());
    Ok(StrengthGraph::new(
        matrix,
        measure,
        graph.advisories().to_vec(),
    ))
}

/// Affinity: `1 - (x_i·x_j)² / (|x_i|² |x_j|²)` over the test vectors.
pub fn affinity_distance(
    graph: &SparseGraph,
    params: &RelaxationParams,
) -> StrengthResult<StrengthGraph> {
    params.validate()?;
    info!(
        "Affinity strength: {} rows, R={}, k={}, alpha={}, epsilon={}",
        graph.rows(),
        params.vectors,
        params.iterations,
        params.alpha,
        params.epsilon
    );
    let graph = graph.without_explicit_zeros();
    let x = relaxation_vectors(
        &graph.to_csmat(),
        params.vectors,
        params.iterations,
        params.alpha,
        params.seed,
    );
    distance_measure_common(&graph, &x, params.epsilon, MeasureKind::Affinity, |x, i, j| {
        let (xi, xj) = (x.row(i), x.row(j));
        let denominator = xi.norm_squared() * xj.norm_squared();
        if denominator == 0.0 {
            return 0.0;
        }
        let dot = xi.dot(&xj);
        // round-off can push cos² past one
        (1.0 - dot * dot / denominator).max(0.0)
    })
}

/// Algebraic distance: `(Σ_r |x_ir - x_jr|^p / R)^(1/p)`, or the largest
/// difference for the infinity norm.
pub fn algebraic_distance(
    graph: &SparseGraph,
    params: &RelaxationParams,
    p: PNorm,
) -> StrengthResult<StrengthGraph> {
    params.validate()?;
    if let PNorm::Finite(value) = p {
        if !(value >= 1.0) {
            return Err(StrengthError::invalid("expected p>1 or equal to infinity"));
        }
    }
    info!(
        "Algebraic distance strength: {} rows, R={}, k={}, alpha={}, epsilon={}, p={}",
        graph.rows(),
        params.vectors,
        params.iterations,
        params.alpha,
        params.epsilon,
        p
    );
    let graph = graph.without_explicit_zeros();
    let x = relaxation_vectors(
        &graph.to_csmat(),
        params.vectors,
        params.iterations,
        params.alpha,
        params.seed,
    );
    let r = params.vectors as f64;
    distance_measure_common(&graph, &x, params.epsilon, MeasureKind::Algebraic, move |x, i, j| {
        let differences = x.row(i) - x.row(j);
        match p {
            PNorm::Finite(p) => {
                let total: f64 = differences.iter().map(|d| d.abs().powf(p)).sum();
                (total / r).powf(1.0 / p)
            }
            PNorm::Infinity => differences.iter().fold(0.0_f64, |acc, d| acc.max(d.abs())),
        }
    })
}

/// Evaluate `f(i, j)` on every stored position of `pattern`, in parallel
/// over rows.
fn pattern_values(pattern: &CsMat<f64>, f: impl Fn(usize, usize) -> f64 + Sync) -> CsMat<f64> {
    let indptr = pattern.proper_indptr();
    let indices = pattern.indices();
    let rows: Vec<Vec<f64>> = (0..pattern.rows())
        .into_par_iter()
        .map(|i| (indptr[i]..indptr[i + 1]).map(|k| f(i, indices[k])).collect())
        .collect();
    CsMat::new(
        pattern.shape(),
        indptr.to_vec(),
        indices.to_vec(),
        rows.into_iter().flatten().collect(),
    )
}
