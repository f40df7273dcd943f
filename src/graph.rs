//! Strength graph returned by every measure.
//!
//! A `StrengthGraph` wraps the CSR strength matrix together with the measure
//! that produced it and the advisories raised on the way. The matrix obeys
//! one contract whatever the measure:
//! - square, node dimension (rows of A, or supernodes for block inputs)
//! - non-negative real entries
//! - each non-empty row peaks at exactly 1.0
//! - a diagonal entry wherever A has a nonzero diagonal
//! - support inside the support of A plus the diagonal
//!
//! `verify_contract` and `verify_against` check these properties and are what
//! the test-suite leans on.

use std::fmt;
use std::str::FromStr;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use sprs::CsMat;

use soc_core::blocks::amalgamate_pattern;
use soc_core::{Advisory, SparseGraph, StrengthError};

/// Which measure produced a strength graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasureKind {
    Classical,
    Symmetric,
    Pairwise,
    Evolution,
    Distance,
    Affinity,
    Algebraic,
    Energy,
}

impl MeasureKind {
    /// Default drop tolerance (theta or epsilon) of the measure
    pub fn default_theta(&self) -> f64 {
        match self {
            MeasureKind::Classical => 0.1,
            MeasureKind::Symmetric => 0.0,
            MeasureKind::Pairwise => 0.5,
            MeasureKind::Evolution => 4.0,
            MeasureKind::Distance => 2.0,
            MeasureKind::Affinity => 4.0,
            MeasureKind::Algebraic => 2.0,
            MeasureKind::Energy => 0.0,
        }
    }
}

impl FromStr for MeasureKind {
    type Err = StrengthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "classical" => Ok(MeasureKind::Classical),
            "symmetric" => Ok(MeasureKind::Symmetric),
            "pairwise" => Ok(MeasureKind::Pairwise),
            "evolution" => Ok(MeasureKind::Evolution),
            "distance" => Ok(MeasureKind::Distance),
            "affinity" => Ok(MeasureKind::Affinity),
            "algebraic_distance" | "algebraic" => Ok(MeasureKind::Algebraic),
            "energy_based" | "energy" => Ok(MeasureKind::Energy),
            other => Err(StrengthError::invalid(format!(
                "unrecognized strength of connection method: {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for MeasureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MeasureKind::Classical => "classical",
            MeasureKind::Symmetric => "symmetric",
            MeasureKind::Pairwise => "pairwise",
            MeasureKind::Evolution => "evolution",
            MeasureKind::Distance => "distance",
            MeasureKind::Affinity => "affinity",
            MeasureKind::Algebraic => "algebraic_distance",
            MeasureKind::Energy => "energy_based",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct StrengthGraph {
    pub matrix: CsMat<f64>,
    // node dimension of the output
    pub nnodes: usize,
    pub measure: MeasureKind,
    pub advisories: Vec<Advisory>,
}

impl StrengthGraph {
    pub fn new(matrix: CsMat<f64>, measure: MeasureKind, advisories: Vec<Advisory>) -> Self {
        let matrix = if matrix.is_csr() {
            matrix
        } else {
            matrix.to_csr()
        };
        let nnodes = matrix.rows();
        Self {
            matrix,
            nnodes,
            measure,
            advisories,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.matrix.shape()
    }

    /// Entry (i, j), zero when not stored
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.matrix.get(i, j).copied().unwrap_or(0.0)
    }

    /// Stored entries of row i as (column, value)
    pub fn row(&self, i: usize) -> Vec<(usize, f64)> {
        self.matrix
            .outer_view(i)
            .map(|row| row.iter().map(|(j, &v)| (j, v)).collect())
            .unwrap_or_default()
    }

    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    pub fn sparsity(&self) -> f64 {
        let (rows, cols) = self.matrix.shape();
        1.0 - (self.matrix.nnz() as f64) / ((rows * cols).max(1) as f64)
    }

    pub fn matrix(&self) -> &CsMat<f64> {
        &self.matrix
    }

    pub fn advisories(&self) -> &[Advisory] {
        &self.advisories
    }

    pub fn into_matrix(self) -> CsMat<f64> {
        self.matrix
    }

    pub fn statistics(&self) -> StrengthStats {
        trace!("Computing strength graph statistics");
        let row_nnz: Vec<usize> = self
            .matrix
            .outer_iterator()
            .map(|row| row.nnz())
            .collect();
        let min_row_nnz = row_nnz.iter().copied().min().unwrap_or(0);
        let max_row_nnz = row_nnz.iter().copied().max().unwrap_or(0);
        let mean_row_nnz = if row_nnz.is_empty() {
            0.0
        } else {
            row_nnz.iter().sum::<usize>() as f64 / row_nnz.len() as f64
        };
        let min_value = self
            .matrix
            .data()
            .iter()
            .fold(f64::INFINITY, |acc, &x| acc.min(x));

        let stats = StrengthStats {
            shape: self.matrix.shape(),
            nnz: self.matrix.nnz(),
            sparsity: self.sparsity(),
            min_row_nnz,
            max_row_nnz,
            mean_row_nnz,
            min_value: if min_value.is_finite() { min_value } else { 0.0 },
            measure: self.measure,
            advisories: self.advisories.len(),
        };

        debug!(
            "Computed statistics: shape {:?}, {} non-zeros, {:.2}% sparse, row nnz [{}, {}]",
            stats.shape,
            stats.nnz,
            stats.sparsity * 100.0,
            stats.min_row_nnz,
            stats.max_row_nnz
        );
        stats
    }

    /// Check the properties that hold for the strength matrix on its own:
    /// square shape, non-negative entries, each non-empty row peaking at 1.
    pub fn verify_contract(&self, tolerance: f64) -> ContractValidation {
        let mut validation = ContractValidation::new();
        let (rows, cols) = self.matrix.shape();
        validation.is_square = rows == cols;

        for (i, row) in self.matrix.outer_iterator().enumerate() {
            if row.nnz() == 0 {
                validation.empty_rows.push(i);
                continue;
            }
            let mut largest = f64::NEG_INFINITY;
            for (j, &v) in row.iter() {
                if v < 0.0 || !v.is_finite() {
                    validation.invalid_entries.push((i, j, v));
                }
                largest = largest.max(v);
            }
            if (largest - 1.0).abs() > tolerance {
                validation.row_max_violations.push((i, largest));
            }
        }

        validation.is_valid = validation.is_square
            && validation.invalid_entries.is_empty()
            && validation.row_max_violations.is_empty();

        debug!("Strength contract validation results:");
        debug!("  Valid: {}", validation.is_valid);
        debug!("  Row max violations: {}", validation.row_max_violations.len());
        debug!("  Invalid entries: {}", validation.invalid_entries.len());
        debug!("  Empty rows: {}", validation.empty_rows.len());

        if !validation.is_valid {
            warn!("Strength graph violates the output contract");
        }
        validation
    }

    /// `verify_contract` plus the properties that relate S to the operator:
    /// diagonal presence and support. Block operators are compared against
    /// their supernode pattern.
    pub fn verify_against(&self, a: &SparseGraph, tolerance: f64) -> ContractValidation {
        let mut validation = self.verify_contract(tolerance);

        let point_level = self.nnodes == a.rows();
        let pattern = if point_level {
            a.to_csmat()
        } else {
            amalgamate_pattern(&a.to_csmat(), a.block_size())
        };
        if pattern.rows() != self.nnodes {
            validation.is_valid = false;
            warn!(
                "Strength graph has {} nodes, operator has {} rows",
                self.nnodes,
                a.rows()
            );
            return validation;
        }

        let a_diagonal = a.diagonal_values();
        for i in 0..self.nnodes {
            let needs_diagonal = if point_level {
                a_diagonal[i] != 0.0
            } else {
                let m = a.block_size();
                (i * m..(i + 1) * m).any(|p| a_diagonal[p] != 0.0)
            };
            if needs_diagonal && self.get(i, i) <= 0.0 {
                validation.missing_diagonal.push(i);
            }
        }

        for (i, row) in self.matrix.outer_iterator().enumerate() {
            for (j, _) in row.iter() {
                if i != j && pattern.get(i, j).is_none() {
                    validation.support_violations.push((i, j));
                }
            }
        }

        validation.is_valid = validation.is_valid
            && validation.missing_diagonal.is_empty()
            && validation.support_violations.is_empty();
        if !validation.is_valid {
            warn!(
                "Strength graph inconsistent with operator: {} missing diagonals, {} entries outside support",
                validation.missing_diagonal.len(),
                validation.support_violations.len()
            );
        }
        validation
    }
}

/// Structure to hold contract validation results
#[derive(Debug, Clone)]
pub struct ContractValidation {
    pub is_valid: bool,
    pub is_square: bool,
    pub row_max_violations: Vec<(usize, f64)>,
    pub invalid_entries: Vec<(usize, usize, f64)>,
    pub empty_rows: Vec<usize>,
    pub missing_diagonal: Vec<usize>,
    pub support_violations: Vec<(usize, usize)>,
}

impl ContractValidation {
    fn new() -> Self {
        Self {
            is_valid: false,
            is_square: false,
            row_max_violations: Vec::new(),
            invalid_entries: Vec::new(),
            empty_rows: Vec::new(),
            missing_diagonal: Vec::new(),
            support_violations: Vec::new(),
        }
    }
}

/// Structure to hold strength graph statistics
#[derive(Debug, Clone)]
pub struct StrengthStats {
    pub shape: (usize, usize),
    pub nnz: usize,
    pub sparsity: f64,
    pub min_row_nnz: usize,
    pub max_row_nnz: usize,
    pub mean_row_nnz: f64,
    pub min_value: f64,
    pub measure: MeasureKind,
    pub advisories: usize,
}

/// Pretty printing implementation
impl fmt::Display for StrengthGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "StrengthGraph [{}] ({}×{}):",
            self.measure,
            self.nnodes,
            self.nnodes
        )?;
        let stats = self.statistics();
        writeln!(
            f,
            "Non-zero entries: {} ({:.2}% dense)",
            stats.nnz,
            (1.0 - stats.sparsity) * 100.0
        )?;
        writeln!(
            f,
            "Row non-zeros: [{}, {}], mean: {:.2}",
            stats.min_row_nnz, stats.max_row_nnz, stats.mean_row_nnz
        )?;
        for advisory in &self.advisories {
            writeln!(f, "Advisory: {}", advisory)?;
        }
        Ok(())
    }
}

impl fmt::Display for StrengthStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Strength Statistics:")?;
        writeln!(f, "  Measure: {}", self.measure)?;
        writeln!(f, "  Shape: {:?}", self.shape)?;
        writeln!(
            f,
            "  Non-zero entries: {} ({:.2}% dense)",
            self.nnz,
            (1.0 - self.sparsity) * 100.0
        )?;
        writeln!(
            f,
            "  Row non-zeros: [{}, {}], mean {:.2}",
            self.min_row_nnz, self.max_row_nnz, self.mean_row_nnz
        )?;
        writeln!(f, "  Smallest entry: {:.4e}", self.min_value)?;
        writeln!(f, "  Advisories: {}", self.advisories)?;
        Ok(())
    }
}
