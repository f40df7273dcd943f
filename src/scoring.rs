//! Constrained-minimization scorer for the evolution measure.
//!
//! Row i of `atilde` holds z, the evolved point source at node i, on the
//! retained pattern. Each row is approximated from the near-null-space
//! vectors B:
//!
//! ```text
//! min ‖z - B x‖_D   subject to   (B x)_i = z_i
//! ```
//!
//! and every retained entry is scored by the relative point-wise error
//! `|1 - (Bx)_j / z_j|`. Connections whose approximation points away from z
//! (negative inner product) or whose ratio is tiny are weak and score 0.
//!
//! Arithmetic is generic over the scalar field of B so complex test vectors
//! go through the same code; scores are real on output.

use log::{debug, info, trace};
use nalgebra::{ComplexField, DMatrix, DVector};
use rayon::prelude::*;
use sprs::CsMat;

use soc_core::Advisory;
use soc_core::ops::eliminate_zeros;

/// Ratios below this magnitude mark a weak connection
const WEAK_RATIO: f64 = 1e-4;
/// Value given to near-perfect connections so they stay stored
const PERFECT_FLOOR: f64 = 1e-4;

/// Tolerance under which an error counts as exact
pub fn default_tolerance() -> f64 {
    1e6 * f64::EPSILON
}

/// Score every stored entry of `atilde`.
///
/// `weights` is the diagonal of the projection norm: ones for l2, the
/// diagonal of A for the D_A norm.
pub fn score<T>(
    atilde: &CsMat<f64>,
    b: &DMatrix<T>,
    weights: &[f64],
    tolerance: f64,
) -> (CsMat<f64>, Vec<Advisory>)
where
    T: ComplexField<RealField = f64> + Copy,
{
    if b.ncols() == 1 {
        score_single_vector(atilde, b)
    } else {
        (score_constrained(atilde, b, weights, tolerance), Vec::new())
    }
}

/// Closed form for one test vector:
/// the best approximation of z in span(b) under the constraint at i is
/// `(atilde_ii / b_i) * b_j`. Zero entries of b are replaced by one.
pub fn score_single_vector<T>(atilde: &CsMat<f64>, b: &DMatrix<T>) -> (CsMat<f64>, Vec<Advisory>)
where
    T: ComplexField<RealField = f64> + Copy,
{
    info!(
        "Scoring {} entries against a single test vector",
        atilde.nnz()
    );
    let n = atilde.rows();
    let one = T::from_real(1.0);
    let zero = T::from_real(0.0);

    let mut zeros = 0usize;
    let scaling: Vec<T> = (0..n)
        .map(|i| {
            let v = b[(i, 0)];
            if v == zero {
                zeros += 1;
                one
            } else {
                v
            }
        })
        .collect();

    let mut advisories = Vec::new();
    if zeros > 0 {
        let advisory = Advisory::ZeroTestVectorEntries { count: zeros };
        advisory.log();
        advisories.push(advisory);
    }

    let diag = soc_core::ops::diagonal(atilde);
    let diag_div_b: Vec<T> = diag
        .iter()
        .zip(scaling.iter())
        .map(|(&d, &bi)| T::from_real(d) / bi)
        .collect();

    let indptr = atilde.proper_indptr();
    let indices = atilde.indices();
    let data = atilde.data();
    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (indptr[i]..indptr[i + 1])
                .map(|p| entry_score(diag_div_b[i] * scaling[indices[p]], data[p]))
                .collect()
        })
        .collect();

    let scored = with_values(atilde, rows);
    (floor_near_perfect(eliminate_zeros(&scored)), advisories)
}

/// Score of one entry from its approximation and its true value.
fn entry_score<T>(approx: T, z: f64) -> f64
where
    T: ComplexField<RealField = f64> + Copy,
{
    // angle between z and its approximation beyond 90 degrees
    if approx.real() * z < 0.0 || z == 0.0 {
        return 0.0;
    }
    let ratio = approx.unscale(z);
    if ratio.modulus() < WEAK_RATIO {
        return 0.0;
    }
    (T::from_real(1.0) - ratio).modulus()
}

/// General case, K > 1 test vectors.
///
/// The D-weighted Gram products `2 conj(B[c,p]) d_c B[c,q]` (p <= q) are
/// tabulated once per node and summed over each row's pattern to build the
/// KKT system, solved with an SVD pseudo-inverse.
pub fn score_constrained<T>(
    atilde: &CsMat<f64>,
    b: &DMatrix<T>,
    weights: &[f64],
    tolerance: f64,
) -> CsMat<f64>
where
    T: ComplexField<RealField = f64> + Copy,
{
    let n = atilde.rows();
    let k = b.ncols();
    assert_eq!(b.nrows(), n, "B must have one row per node");
    assert_eq!(weights.len(), n, "projection weights length mismatch");
    info!(
        "Scoring {} entries with {} test vectors (tolerance {:.2e})",
        atilde.nnz(),
        k,
        tolerance
    );
    let start = std::time::Instant::now();

    let table_width = k * (k + 1) / 2;
    let two = T::from_real(2.0);
    let gram: Vec<Vec<T>> = (0..n)
        .into_par_iter()
        .map(|c| {
            let mut entries = Vec::with_capacity(table_width);
            let d = T::from_real(weights[c]);
            for p in 0..k {
                for q in p..k {
                    entries.push(two * b[(c, p)].conjugate() * d * b[(c, q)]);
                }
            }
            entries
        })
        .collect();

    let indptr = atilde.proper_indptr();
    let indices = atilde.indices();
    let data = atilde.data();

    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let (rs, re) = (indptr[i], indptr[i + 1]);
            let cols = &indices[rs..re];
            let z = &data[rs..re];
            score_row(i, cols, z, b, weights, &gram, tolerance)
        })
        .collect();

    let scored = with_values(atilde, rows);
    let result = floor_near_perfect(eliminate_zeros(&scored));
    debug!(
        "Constrained scoring: {} of {} entries kept in {:?}",
        result.nnz(),
        atilde.nnz(),
        start.elapsed()
    );
    result
}

fn score_row<T>(
    i: usize,
    cols: &[usize],
    z: &[f64],
    b: &DMatrix<T>,
    weights: &[f64],
    gram: &[Vec<T>],
    tolerance: f64,
) -> Vec<f64>
where
    T: ComplexField<RealField = f64> + Copy,
{
    let k = b.ncols();
    let length = cols.len();
    // too few entries: B reproduces z exactly
    if length <= k {
        return vec![0.0; length];
    }
    let Some(local_i) = cols.iter().position(|&c| c == i) else {
        return vec![0.0; length];
    };

    let zero = T::from_real(0.0);
    let two = T::from_real(2.0);
    let mut lhs = DMatrix::<T>::from_element(k + 1, k + 1, zero);
    let mut rhs = DVector::<T>::from_element(k + 1, zero);

    for (&c, &zc) in cols.iter().zip(z.iter()) {
        let mut t = 0;
        for p in 0..k {
            for q in p..k {
                lhs[(p, q)] += gram[c][t];
                t += 1;
            }
            rhs[p] += two * b[(c, p)].conjugate() * T::from_real(weights[c] * zc);
        }
    }
    for p in 0..k {
        for q in (p + 1)..k {
            lhs[(q, p)] = lhs[(p, q)].conjugate();
        }
        lhs[(k, p)] = b[(i, p)];
        lhs[(p, k)] = b[(i, p)].conjugate();
    }
    rhs[k] = T::from_real(z[local_i]);

    let x = match lhs.pseudo_inverse(1e-14) {
        Ok(pinv) => pinv * rhs,
        Err(e) => {
            trace!("row {}: pseudo-inverse failed ({}), all weak", i, e);
            return vec![0.0; length];
        }
    };

    cols.iter()
        .zip(z.iter())
        .map(|(&c, &zc)| {
            let mut approx = zero;
            for q in 0..k {
                approx += b[(c, q)] * x[q];
            }
            let error = entry_score(approx, zc);
            if error < tolerance { 0.0 } else { error }
        })
        .collect()
}

fn with_values(pattern: &CsMat<f64>, rows: Vec<Vec<f64>>) -> CsMat<f64> {
    let data: Vec<f64> = rows.into_iter().flatten().collect();
    CsMat::new(
        pattern.shape(),
        pattern.proper_indptr().to_vec(),
        pattern.indices().to_vec(),
        data,
    )
}

/// Survivors below sqrt(eps) are near-perfect connections: keep them stored
fn floor_near_perfect(m: CsMat<f64>) -> CsMat<f64> {
    let threshold = f64::EPSILON.sqrt();
    m.map(|&v| if v < threshold { PERFECT_FLOOR } else { v })
}
