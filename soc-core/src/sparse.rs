// soc-core/src/sparse.rs
//! Read-only CSR view used by every strength measure.
//!
//! `SparseGraph` owns a sorted copy of the operator in compressed-row form and
//! the position of each row's diagonal entry. Column indices are sorted
//! ascending inside every row: the pairwise traversal depends on it, so the
//! invariant is enforced at construction instead of re-checked on access.

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};

use crate::advisory::Advisory;
use crate::error::{StrengthError, StrengthResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SparseGraph {
    pub(crate) indptr: Vec<usize>,  // [n_nodes + 1]
    pub(crate) indices: Vec<usize>, // [nnz]
    pub(crate) data: Vec<f64>,      // [nnz]
    pub(crate) n_nodes: usize,
    pub(crate) nnz: usize,
    pub(crate) diagonal: Vec<Option<usize>>, // [n_nodes]
    pub(crate) block_size: usize,
    #[serde(skip)]
    pub(crate) advisories: Vec<Advisory>,
}

impl SparseGraph {
    /// Build from COO edge list, summing duplicates
    pub fn from_edges(edges: Vec<(usize, usize, f64)>, n_nodes: usize) -> Self {
        let mut trimat = TriMat::with_capacity((n_nodes, n_nodes), edges.len());
        for (row, col, weight) in edges {
            trimat.add_triplet(row, col, weight);
        }
        let csr: CsMat<f64> = trimat.to_csr();
        Self::from_csr(csr, Vec::new())
    }

    /// Build from raw CSR parts. Rows may come unsorted; they are sorted here.
    pub fn from_parts(
        values: Vec<f64>,
        indices: Vec<usize>,
        indptr: Vec<usize>,
        shape: (usize, usize),
    ) -> StrengthResult<Self> {
        if shape.0 != shape.1 {
            return Err(StrengthError::invalid(format!(
                "expected a square matrix, got {}x{}",
                shape.0, shape.1
            )));
        }
        if indptr.len() != shape.0 + 1 || indices.len() != values.len() {
            return Err(StrengthError::Structure(format!(
                "indptr of length {} and {} indices for {} values do not describe {} rows",
                indptr.len(),
                indices.len(),
                values.len(),
                shape.0
            )));
        }
        let csr = CsMat::new_from_unsorted(shape, indptr, indices, values)
            .map_err(|(_, _, _, e)| StrengthError::Structure(e.to_string()))?;
        Ok(Self::from_csr(csr, Vec::new()))
    }

    /// Wrap an existing sprs matrix. CSC input is converted to CSR.
    pub fn from_matrix(a: &CsMat<f64>) -> StrengthResult<Self> {
        let (rows, cols) = a.shape();
        if rows != cols {
            return Err(StrengthError::invalid(format!(
                "expected a square matrix, got {}x{}",
                rows, cols
            )));
        }

        let mut advisories = Vec::new();
        let csr = if a.is_csr() {
            a.clone()
        } else {
            let advisory = Advisory::ImplicitConversion {
                from: "csc".to_string(),
            };
            warn!("{}", advisory);
            advisories.push(advisory);
            a.to_csr()
        };

        Ok(Self::from_csr(csr, advisories))
    }

    fn from_csr(csr: CsMat<f64>, advisories: Vec<Advisory>) -> Self {
        let n_nodes = csr.rows();
        let (indptr, indices, data) = csr.into_raw_storage();
        let nnz = indices.len();

        let mut diagonal = vec![None; n_nodes];
        for (i, slot) in diagonal.iter_mut().enumerate() {
            *slot = (indptr[i]..indptr[i + 1]).find(|&k| indices[k] == i);
        }

        trace!(
            "SparseGraph: {} rows, {} non-zeros, {} missing diagonals",
            n_nodes,
            nnz,
            diagonal.iter().filter(|d| d.is_none()).count()
        );

        Self {
            indptr,
            indices,
            data,
            n_nodes,
            nnz,
            diagonal,
            block_size: 1,
            advisories,
        }
    }

    /// Declare a uniform square block size (degrees of freedom per node).
    pub fn with_block_size(mut self, block_size: usize) -> StrengthResult<Self> {
        if block_size == 0 || self.n_nodes % block_size != 0 {
            return Err(StrengthError::invalid(format!(
                "matrix must have square blocks: block size {} does not divide {}",
                block_size, self.n_nodes
            )));
        }
        debug!(
            "SparseGraph block size set to {} ({} supernodes)",
            block_size,
            self.n_nodes / block_size
        );
        self.block_size = block_size;
        Ok(self)
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_nodes, self.n_nodes)
    }

    pub fn rows(&self) -> usize {
        self.n_nodes
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of supernodes (rows / block size)
    pub fn num_nodes(&self) -> usize {
        self.n_nodes / self.block_size
    }

    pub fn row_range(&self, i: usize) -> (usize, usize) {
        (self.indptr[i], self.indptr[i + 1])
    }

    pub fn column_at(&self, k: usize) -> usize {
        self.indices[k]
    }

    pub fn value_at(&self, k: usize) -> f64 {
        self.data[k]
    }

    pub fn diagonal_index(&self, i: usize) -> Option<usize> {
        self.diagonal[i]
    }

    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Conversions and other advisories raised while building the view
    pub fn advisories(&self) -> &[Advisory] {
        &self.advisories
    }

    /// Diagonal values, zero where the entry is absent
    pub fn diagonal_values(&self) -> Vec<f64> {
        self.diagonal
            .iter()
            .map(|d| d.map(|k| self.data[k]).unwrap_or(0.0))
            .collect()
    }

    /// Owned sprs copy of the operator (CSR)
    pub fn to_csmat(&self) -> CsMat<f64> {
        CsMat::new(
            (self.n_nodes, self.n_nodes),
            self.indptr.clone(),
            self.indices.clone(),
            self.data.clone(),
        )
    }

    /// Same pattern with explicit zeros removed
    pub fn without_explicit_zeros(&self) -> Self {
        let stored = self.to_csmat();
        let cleaned = crate::ops::eliminate_zeros(&stored);
        let mut out = Self::from_csr(cleaned, self.advisories.clone());
        out.block_size = self.block_size;
        out
    }

    pub fn sparsity(&self) -> f64 {
        1.0 - (self.nnz as f64) / (self.n_nodes * self.n_nodes).max(1) as f64
    }
}
