//! Pairwise-aggregation strength measure.
//!
//! Every owner row i in U walks its upper half (columns after the diagonal).
//! For each `(i, j)` the mirror slot `(j, i)` is found with a forward cursor
//! over row j, and one compatibility value is written into both slots.
//!
//! Rows of the output are sorted because `SparseGraph` sorts on construction;
//! the cursor relies on it.
//!
//! Small values of mu mean strong coupling in the aggregation literature; the
//! reciprocal form (default) flips this so that large means strong.

use std::fmt;
use std::str::FromStr;

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use sprs::CsMat;

use soc_core::ops::{add_diagonal, diagonal, eliminate_zeros, scale_rows_by_largest_entry};
use soc_core::{Advisory, SparseGraph, StrengthError, StrengthResult};

use crate::classify::{RowClassification, classify};
use crate::graph::{MeasureKind, StrengthGraph};

/// Compatibility coefficient of the pair (i, j).
///
/// Returns 0 for a zero diagonal or a degenerate denominator.
pub fn compute_mu(
    a_ii: f64,
    a_jj: f64,
    a_ij: f64,
    a_ji: f64,
    s_i: f64,
    s_j: f64,
    reciprocal: bool,
) -> f64 {
    if a_ii == 0.0 || a_jj == 0.0 {
        return 0.0;
    }
    let denominator = a_ii + a_jj - s_i - s_j;
    if denominator == 0.0 {
        return 0.0;
    }

    let b = (a_ii * a_jj) / (a_ii + a_jj);
    let c = ((a_ii - s_i) * (a_jj - s_j)) / denominator;
    let d = (a_ji + a_ij) / 2.0;

    if c - d == 0.0 || b == 0.0 {
        return 0.0;
    }

    if reciprocal {
        (c - d) / (2.0 * b)
    } else {
        1.0 - (2.0 * b) / (c - d)
    }
}

/// What to write into a pair whose compatibility is not well defined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PairwiseFallback {
    /// Zero both slots
    #[default]
    Zero,
    /// Average the stored value with mu, then take the magnitude
    Smooth,
    /// Divide the stored value by the row's deficiency, then take the magnitude
    ReplaceZeros,
}

impl FromStr for PairwiseFallback {
    type Err = StrengthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zero" | "none" => Ok(PairwiseFallback::Zero),
            "smooth" => Ok(PairwiseFallback::Smooth),
            "replacezeros" | "replace_zeros" => Ok(PairwiseFallback::ReplaceZeros),
            other => Err(StrengthError::invalid(format!(
                "unknown pairwise fallback: {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for PairwiseFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PairwiseFallback::Zero => "zero",
            PairwiseFallback::Smooth => "smooth",
            PairwiseFallback::ReplaceZeros => "replacezeros",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairwiseParams {
    /// Classification threshold for U
    pub theta: f64,
    pub reciprocal: bool,
    pub fallback: PairwiseFallback,
}

impl Default for PairwiseParams {
    fn default() -> Self {
        Self {
            theta: 0.5,
            reciprocal: true,
            fallback: PairwiseFallback::Zero,
        }
    }
}

impl PairwiseParams {
    pub fn validate(&self) -> StrengthResult<()> {
        if !self.theta.is_finite() {
            return Err(StrengthError::invalid(format!(
                "expected a finite theta, got {}",
                self.theta
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairwiseStats {
    /// Upper-half pairs visited
    pub candidates: usize,
    /// Pairs that fell back
    pub undefined: usize,
    /// Pairs whose mirror slot held another column
    pub mismatched: usize,
}

/// Raw engine output: mu on the pattern of A
#[derive(Debug, Clone)]
pub struct PairwiseOutput {
    pub mu: CsMat<f64>,
    pub stats: PairwiseStats,
    pub advisories: Vec<Advisory>,
}

/// Values overwritten while a pair is processed, restored when it is done.
#[derive(Debug, Default)]
struct UndoLog {
    saved: Vec<(usize, f64)>,
}

impl UndoLog {
    fn record(&mut self, position: usize, value: f64) {
        self.saved.push((position, value));
    }

    fn restore(&mut self, values: &mut [f64]) {
        for (position, value) in self.saved.drain(..).rev() {
            values[position] = value;
        }
    }
}

/// Forward scan of row j for column i, bounded by row j's diagonal (or its
/// last entry when there is none). The cursor only moves forward: owners are
/// visited in ascending order, so entries before it have columns below any
/// later owner.
fn mirror_slot(graph: &SparseGraph, cursors: &mut [usize], j: usize, i: usize) -> Option<usize> {
    let (start, end) = graph.row_range(j);
    if start == end {
        return None;
    }
    let limit = graph.diagonal_index(j).unwrap_or(end - 1);
    let mut k = cursors[j].max(start);
    while k < limit && graph.column_at(k) < i {
        k += 1;
    }
    cursors[j] = k;
    Some(k)
}

/// Mirrored compatibility traversal over the owners in U.
///
/// Rows in notU and entries in columns in notU come out exactly zero. The
/// diagonal slot of every owner is set to one. A slot no pair writes (a lower
/// entry whose transpose is not stored, or a restored mismatched mirror) is
/// zeroed, so no raw value of A survives.
pub fn pairwise_compat(
    graph: &SparseGraph,
    classes: &RowClassification,
    reciprocal: bool,
    fallback: PairwiseFallback,
) -> PairwiseOutput {
    let n = graph.rows();
    let s = &classes.deficiency;
    let mut mu = graph.data().to_vec();
    let mut assigned = vec![false; mu.len()];
    let mut stats = PairwiseStats::default();
    let mut undo = UndoLog::default();
    let mut cursors: Vec<usize> = graph.indptr()[..n].to_vec();

    // zero out rows that are never owners
    for &i in &classes.non_dominant {
        let (start, end) = graph.row_range(i);
        mu[start..end].iter_mut().for_each(|v| *v = 0.0);
    }

    for &i in &classes.dominant {
        let (_, end_i) = graph.row_range(i);
        let Some(d_i) = classes.diagonal[i] else {
            continue;
        };

        // lower half of the owner row
        let (start_i, _) = graph.row_range(i);
        for k in start_i..d_i {
            if !classes.in_u[graph.column_at(k)] {
                mu[k] = 0.0;
            }
        }

        let a_ii = graph.value_at(d_i);
        mu[d_i] = 1.0;
        assigned[d_i] = true;
        let s_i = s[i];

        for kupper in (d_i + 1)..end_i {
            let j = graph.column_at(kupper);
            let s_j = s[j];
            stats.candidates += 1;

            let klower = mirror_slot(graph, &mut cursors, j, i);
            let matched = klower.is_some_and(|k| graph.column_at(k) == i);

            let (a_ji, a_jj) = if matched {
                let a_jj = match classes.diagonal[j] {
                    Some(d_j) => {
                        if classes.in_u[j] {
                            mu[d_j] = 1.0;
                        }
                        graph.value_at(d_j)
                    }
                    None => 0.0,
                };
                (klower.map(|k| graph.value_at(k)).unwrap_or(0.0), a_jj)
            } else {
                if let Some(k) = klower {
                    undo.record(k, mu[k]);
                    stats.mismatched += 1;
                }
                (0.0, 0.0)
            };

            let a_ij = graph.value_at(kupper);
            let mu_k = compute_mu(a_ii, a_jj, a_ij, a_ji, s_i, s_j, reciprocal);
            assigned[kupper] = true;
            if let Some(k) = klower.filter(|_| matched) {
                assigned[k] = true;
            }
            let ssum = s_i.abs() + s_j.abs();

            let well_defined = a_ji != 0.0
                && a_ij != 0.0
                && a_ii + a_jj - s_i - s_j >= 0.0
                && mu_k != 0.0
                && ssum != 0.0;

            if well_defined {
                let value = (mu_k / ssum).abs();
                mu[kupper] = value;
                if let Some(k) = klower {
                    mu[k] = value;
                }
            } else {
                stats.undefined += 1;
                match fallback {
                    PairwiseFallback::Smooth => {
                        mu[kupper] = (mu[kupper] + mu_k).abs() / 2.0;
                        if let Some(k) = klower {
                            mu[k] = (mu[k] + mu_k).abs() / 2.0;
                        }
                    }
                    PairwiseFallback::ReplaceZeros => {
                        mu[kupper] = divide_magnitude(mu[kupper], s_i);
                        if let Some(k) = klower {
                            mu[k] = divide_magnitude(mu[k], s_j);
                        }
                    }
                    PairwiseFallback::Zero => {
                        mu[kupper] = 0.0;
                        if let Some(k) = klower {
                            mu[k] = 0.0;
                        }
                    }
                }
            }

            // order matters: notU upper, restore mismatched lower, notU lower
            if !classes.in_u[j] {
                mu[kupper] = 0.0;
            }
            undo.restore(&mut mu);
            if let Some(k) = klower {
                if !classes.in_u[graph.column_at(k)] {
                    mu[k] = 0.0;
                }
                // the mirror lives in row j
                if !classes.in_u[j] {
                    mu[k] = 0.0;
                }
            }

            trace!(
                "pair ({}, {}): mu_k={:.6e}, defined={}, matched={}",
                i,
                j,
                mu_k,
                well_defined,
                matched
            );
        }
    }

    for (value, &done) in mu.iter_mut().zip(&assigned) {
        if !done {
            *value = 0.0;
        }
    }

    let mut advisories = Vec::new();
    if stats.undefined * 2 > stats.candidates {
        let advisory = Advisory::UndefinedPairs {
            undefined: stats.undefined,
            candidates: stats.candidates,
        };
        advisory.log();
        advisories.push(advisory);
    }

    debug!(
        "Pairwise traversal: {} candidates, {} undefined, {} mismatched mirrors",
        stats.candidates, stats.undefined, stats.mismatched
    );

    let matrix = CsMat::new(
        graph.shape(),
        graph.indptr().to_vec(),
        graph.indices().to_vec(),
        mu,
    );

    PairwiseOutput {
        mu: matrix,
        stats,
        advisories,
    }
}

fn divide_magnitude(value: f64, by: f64) -> f64 {
    if by == 0.0 {
        value.abs()
    } else {
        (value / by).abs()
    }
}

/// Pairwise strength graph.
///
/// The engine output is cleaned of zeros, gets a unit diagonal on every row
/// whose diagonal in A is nonzero, and is scaled so each row peaks at 1.
pub fn pairwise_strength(
    graph: &SparseGraph,
    params: &PairwiseParams,
) -> StrengthResult<StrengthGraph> {
    params.validate()?;
    info!(
        "Pairwise strength: {}x{} operator, theta={}, reciprocal={}, fallback={}",
        graph.rows(),
        graph.rows(),
        params.theta,
        params.reciprocal,
        params.fallback
    );
    let start = std::time::Instant::now();

    let classes = classify(graph, params.theta);
    let output = pairwise_compat(graph, &classes, params.reciprocal, params.fallback);

    let cleaned = eliminate_zeros(&output.mu);
    let a_diagonal = graph.diagonal_values();
    let current = diagonal(&cleaned);
    let correction: Vec<f64> = a_diagonal
        .iter()
        .zip(current.iter())
        .map(|(&a, &c)| if a != 0.0 { 1.0 - c } else { 0.0 })
        .collect();
    let with_diagonal = eliminate_zeros(&add_diagonal(&cleaned, &correction));
    let matrix = scale_rows_by_largest_entry(&with_diagonal);

    let mut advisories = graph.advisories().to_vec();
    advisories.extend(output.advisories);

    info!(
        "Pairwise strength done: {} non-zeros in {:?}",
        matrix.nnz(),
        start.elapsed()
    );
    Ok(StrengthGraph::new(matrix, MeasureKind::Pairwise, advisories))
}
