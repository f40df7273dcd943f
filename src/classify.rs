//! Row classification for the pairwise measure.
//!
//! One pass over the stored entries accumulates signed and absolute row and
//! column sums (diagonal excluded). From them:
//! - the deficiency `s[i] = -(rowsum_i + colsum_i) / 2`
//! - the partition U / notU: row i is in U iff it stores a diagonal entry and
//!   `a_ii < theta * (absrowsum_i + abscolsum_i) / 2`
//!
//! A small diagonal relative to the off-diagonal mass makes a row eligible as
//! a pairwise owner. Rows without a diagonal are never in U.

use log::{debug, trace};

use soc_core::SparseGraph;

#[derive(Debug, Clone, PartialEq)]
pub struct RowClassification {
    /// Rows in U, ascending
    pub dominant: Vec<usize>,
    /// Rows in notU, ascending
    pub non_dominant: Vec<usize>,
    /// Membership mask for U, indexed by row
    pub in_u: Vec<bool>,
    /// Deficiency score s
    pub deficiency: Vec<f64>,
    /// Position of each row's diagonal entry in the value array
    pub diagonal: Vec<Option<usize>>,
}

impl RowClassification {
    pub fn is_dominant(&self, i: usize) -> bool {
        self.in_u[i]
    }

    pub fn len(&self) -> usize {
        self.in_u.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_u.is_empty()
    }
}

pub fn classify(graph: &SparseGraph, theta: f64) -> RowClassification {
    let n = graph.rows();
    let mut rowsum = vec![0.0; n];
    let mut colsum = vec![0.0; n];
    let mut absrowsum = vec![0.0; n];
    let mut abscolsum = vec![0.0; n];

    for i in 0..n {
        let (start, end) = graph.row_range(i);
        for k in start..end {
            let j = graph.column_at(k);
            if j == i {
                continue;
            }
            let e = graph.value_at(k);
            rowsum[i] += e;
            colsum[j] += e;
            absrowsum[i] += e.abs();
            abscolsum[j] += e.abs();
        }
    }

    let mut dominant = Vec::new();
    let mut non_dominant = Vec::new();
    let mut in_u = vec![false; n];
    let mut deficiency = vec![0.0; n];
    let mut diagonal = Vec::with_capacity(n);

    for i in 0..n {
        deficiency[i] = -(rowsum[i] + colsum[i]) / 2.0;
        let mass = (absrowsum[i] + abscolsum[i]) / 2.0;
        let d = graph.diagonal_index(i);
        diagonal.push(d);

        let eligible = d.is_some_and(|k| graph.value_at(k) < theta * mass);
        if eligible {
            in_u[i] = true;
            dominant.push(i);
        } else {
            non_dominant.push(i);
        }
        trace!(
            "row {}: s={:.6e}, mass={:.6e}, in U: {}",
            i,
            deficiency[i],
            mass,
            eligible
        );
    }

    debug!(
        "Classified {} rows (theta={}): |U|={}, |notU|={}",
        n,
        theta,
        dominant.len(),
        non_dominant.len()
    );

    RowClassification {
        dominant,
        non_dominant,
        in_u,
        deficiency,
        diagonal,
    }
}
