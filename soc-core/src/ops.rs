// soc-core/src/ops.rs
//! Sparse kernels shared by the measure drivers.
//!
//! All functions take and return CSR `CsMat<f64>` and preserve sorted column
//! indices. Filters write zeros instead of removing entries, exactly like the
//! drop step of the measures expects; call `eliminate_zeros` afterwards.

use log::{debug, trace};
use rayon::prelude::*;
use sprs::CsMat;

/// Rebuild a CSR matrix from parts that are already sorted per row.
pub(crate) fn from_sorted_parts(
    shape: (usize, usize),
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
) -> CsMat<f64> {
    CsMat::new(shape, indptr, indices, data)
}

fn owned_parts(m: CsMat<f64>) -> ((usize, usize), Vec<usize>, Vec<usize>, Vec<f64>) {
    let shape = m.shape();
    let csr = if m.is_csr() { m } else { m.to_csr() };
    let (indptr, indices, data) = csr.into_raw_storage();
    (shape, indptr, indices, data)
}

/// Sparse matrix-vector product y = A x
pub fn spmv(a: &CsMat<f64>, x: &[f64]) -> Vec<f64> {
    assert_eq!(
        x.len(),
        a.cols(),
        "Vector length {} must match number of columns {}",
        x.len(),
        a.cols()
    );
    a.outer_iterator()
        .map(|row| row.iter().map(|(j, &v)| v * x[j]).sum())
        .collect()
}

/// Diagonal of a CSR matrix, zero where the entry is absent
pub fn diagonal(m: &CsMat<f64>) -> Vec<f64> {
    let n = m.rows().min(m.cols());
    let mut diag = vec![0.0; n];
    for (i, row) in m.outer_iterator().enumerate().take(n) {
        for (j, &v) in row.iter() {
            if j == i {
                diag[i] = v;
            }
        }
    }
    diag
}

/// Drop explicitly stored zeros
pub fn eliminate_zeros(m: &CsMat<f64>) -> CsMat<f64> {
    let (rows, cols) = m.shape();
    let mut indptr = Vec::with_capacity(rows + 1);
    let mut indices = Vec::with_capacity(m.nnz());
    let mut data = Vec::with_capacity(m.nnz());
    indptr.push(0);
    for row in m.outer_iterator() {
        for (j, &v) in row.iter() {
            if v != 0.0 {
                indices.push(j);
                data.push(v);
            }
        }
        indptr.push(indices.len());
    }
    trace!("eliminate_zeros: {} -> {} entries", m.nnz(), data.len());
    from_sorted_parts((rows, cols), indptr, indices, data)
}

/// Apply `f` to every stored value, keeping the pattern
pub fn map_values(m: &CsMat<f64>, f: impl Fn(f64) -> f64) -> CsMat<f64> {
    m.map(|&v| f(v))
}

/// Scale row i by `scale[i]`
pub fn scale_rows(m: &CsMat<f64>, scale: &[f64]) -> CsMat<f64> {
    assert_eq!(scale.len(), m.rows(), "row scaling length mismatch");
    let (shape, indptr, indices, mut data) = owned_parts(m.clone());
    for i in 0..shape.0 {
        for v in &mut data[indptr[i]..indptr[i + 1]] {
            *v *= scale[i];
        }
    }
    from_sorted_parts(shape, indptr, indices, data)
}

/// Scale column j by `scale[j]`
pub fn scale_columns(m: &CsMat<f64>, scale: &[f64]) -> CsMat<f64> {
    assert_eq!(scale.len(), m.cols(), "column scaling length mismatch");
    let (shape, indptr, indices, mut data) = owned_parts(m.clone());
    for (v, &j) in data.iter_mut().zip(indices.iter()) {
        *v *= scale[j];
    }
    from_sorted_parts(shape, indptr, indices, data)
}

/// Divide every row by its largest magnitude entry. Empty or all-zero rows are
/// left as they are.
pub fn scale_rows_by_largest_entry(m: &CsMat<f64>) -> CsMat<f64> {
    let (shape, indptr, indices, mut data) = owned_parts(m.clone());
    for i in 0..shape.0 {
        let (start, end) = (indptr[i], indptr[i + 1]);
        let largest = data[start..end]
            .iter()
            .fold(0.0_f64, |acc, &v| acc.max(v.abs()));
        if largest > 0.0 {
            for v in &mut data[start..end] {
                *v /= largest;
            }
        }
    }
    from_sorted_parts(shape, indptr, indices, data)
}

/// Relative distance filter.
///
/// Per row, every off-diagonal entry larger than `epsilon` times the smallest
/// off-diagonal entry is set to zero; the diagonal entry, if stored, is set
/// to 1.
pub fn apply_distance_filter(m: CsMat<f64>, epsilon: f64) -> CsMat<f64> {
    let (shape, indptr, indices, mut data) = owned_parts(m);
    let mut dropped = 0usize;
    for i in 0..shape.0 {
        let (start, end) = (indptr[i], indptr[i + 1]);
        let min_offdiag = (start..end)
            .filter(|&k| indices[k] != i)
            .map(|k| data[k])
            .fold(f64::INFINITY, f64::min);
        let threshold = epsilon * min_offdiag;
        for k in start..end {
            if indices[k] == i {
                data[k] = 1.0;
            } else if data[k] > threshold {
                data[k] = 0.0;
                dropped += 1;
            }
        }
    }
    debug!("Relative distance filter (eps={}): {} entries dropped", epsilon, dropped);
    from_sorted_parts(shape, indptr, indices, data)
}

/// Absolute distance filter: off-diagonal entries above `epsilon` are set to
/// zero, the diagonal entry is set to 1.
pub fn apply_absolute_distance_filter(m: CsMat<f64>, epsilon: f64) -> CsMat<f64> {
    let (shape, indptr, indices, mut data) = owned_parts(m);
    let mut dropped = 0usize;
    for i in 0..shape.0 {
        for k in indptr[i]..indptr[i + 1] {
            if indices[k] == i {
                data[k] = 1.0;
            } else if data[k] > epsilon {
                data[k] = 0.0;
                dropped += 1;
            }
        }
    }
    debug!("Absolute distance filter (eps={}): {} entries dropped", epsilon, dropped);
    from_sorted_parts(shape, indptr, indices, data)
}

/// Add `values[i]` to entry (i, i), inserting it when absent
pub fn add_diagonal(m: &CsMat<f64>, values: &[f64]) -> CsMat<f64> {
    update_diagonal(m, values, |old, add| old + add)
}

/// Overwrite entry (i, i) with `value`, inserting it when absent
pub fn set_diagonal(m: &CsMat<f64>, value: f64) -> CsMat<f64> {
    let values = vec![value; m.rows().min(m.cols())];
    update_diagonal(m, &values, |_, new| new)
}

fn update_diagonal(
    m: &CsMat<f64>,
    values: &[f64],
    combine: impl Fn(f64, f64) -> f64,
) -> CsMat<f64> {
    let (rows, cols) = m.shape();
    let n = rows.min(cols);
    assert_eq!(values.len(), n, "diagonal length mismatch");
    let mut indptr = Vec::with_capacity(rows + 1);
    let mut indices = Vec::with_capacity(m.nnz() + n);
    let mut data = Vec::with_capacity(m.nnz() + n);
    indptr.push(0);
    for (i, row) in m.outer_iterator().enumerate() {
        let mut placed = i >= n;
        for (j, &v) in row.iter() {
            if !placed && j > i {
                indices.push(i);
                data.push(combine(0.0, values[i]));
                placed = true;
            }
            if j == i {
                indices.push(j);
                data.push(combine(v, values[i]));
                placed = true;
            } else {
                indices.push(j);
                data.push(v);
            }
        }
        if !placed {
            indices.push(i);
            data.push(combine(0.0, values[i]));
        }
        indptr.push(indices.len());
    }
    from_sorted_parts((rows, cols), indptr, indices, data)
}

/// Keep only the entries of `m` whose position is stored in `mask`
pub fn restrict_to_pattern(m: &CsMat<f64>, mask: &CsMat<f64>) -> CsMat<f64> {
    assert_eq!(m.shape(), mask.shape(), "mask shape mismatch");
    let (rows, cols) = m.shape();
    let mut indptr = Vec::with_capacity(rows + 1);
    let mut indices = Vec::with_capacity(mask.nnz());
    let mut data = Vec::with_capacity(mask.nnz());
    indptr.push(0);
    for (row, mask_row) in m.outer_iterator().zip(mask.outer_iterator()) {
        let mut allowed = mask_row.indices().iter().peekable();
        for (j, &v) in row.iter() {
            while allowed.peek().is_some_and(|&&c| c < j) {
                allowed.next();
            }
            if allowed.peek().is_some_and(|&&c| c == j) {
                indices.push(j);
                data.push(v);
            }
        }
        indptr.push(indices.len());
    }
    from_sorted_parts((rows, cols), indptr, indices, data)
}

/// Full sparse product `left * right`
pub fn multiply(left: &CsMat<f64>, right: &CsMat<f64>) -> CsMat<f64> {
    let product: CsMat<f64> = left * right;
    trace!(
        "multiply: {:?} x {:?} -> {} non-zeros",
        left.shape(),
        right.shape(),
        product.nnz()
    );
    if product.is_csr() {
        product
    } else {
        product.to_csr()
    }
}

/// Masked product: `(left * right)` evaluated only at the positions stored in
/// `mask`. The result has exactly the pattern of `mask`, explicit zeros
/// included.
pub fn incomplete_multiply(
    left: &CsMat<f64>,
    right: &CsMat<f64>,
    mask: &CsMat<f64>,
) -> CsMat<f64> {
    assert_eq!(left.cols(), right.rows(), "inner dimensions differ");
    assert_eq!(
        (left.rows(), right.cols()),
        mask.shape(),
        "mask shape must match the product"
    );

    let left = if left.is_csr() {
        left.clone()
    } else {
        left.to_csr()
    };
    let right_csc = right.to_csc();
    let mask = if mask.is_csr() {
        mask.clone()
    } else {
        mask.to_csr()
    };

    let left_ptr = left.proper_indptr();
    let right_ptr = right_csc.proper_indptr();
    let mask_ptr = mask.proper_indptr();
    let (left_idx, left_val) = (left.indices(), left.data());
    let (right_idx, right_val) = (right_csc.indices(), right_csc.data());
    let mask_idx = mask.indices();

    // Row-independent: each mask row only reads one left row
    let rows: Vec<Vec<f64>> = (0..mask.rows())
        .into_par_iter()
        .map(|i| {
            let (ls, le) = (left_ptr[i], left_ptr[i + 1]);
            (mask_ptr[i]..mask_ptr[i + 1])
                .map(|k| {
                    let j = mask_idx[k];
                    let (rs, re) = (right_ptr[j], right_ptr[j + 1]);
                    sorted_dot(
                        &left_idx[ls..le],
                        &left_val[ls..le],
                        &right_idx[rs..re],
                        &right_val[rs..re],
                    )
                })
                .collect()
        })
        .collect();

    let data: Vec<f64> = rows.into_iter().flatten().collect();
    debug!(
        "incomplete_multiply: {} masked entries evaluated",
        data.len()
    );
    from_sorted_parts(
        mask.shape(),
        mask_ptr.to_vec(),
        mask_idx.to_vec(),
        data,
    )
}

/// Dot product of two sparse vectors with sorted indices
fn sorted_dot(ai: &[usize], av: &[f64], bi: &[usize], bv: &[f64]) -> f64 {
    let (mut p, mut q) = (0, 0);
    let mut sum = 0.0;
    while p < ai.len() && q < bi.len() {
        match ai[p].cmp(&bi[q]) {
            std::cmp::Ordering::Less => p += 1,
            std::cmp::Ordering::Greater => q += 1,
            std::cmp::Ordering::Equal => {
                sum += av[p] * bv[q];
                p += 1;
                q += 1;
            }
        }
    }
    sum
}

/// (M + Mᵀ) / 2
pub fn symmetrize(m: &CsMat<f64>) -> CsMat<f64> {
    let transposed: CsMat<f64> = m.transpose_view().to_csr();
    let sum: CsMat<f64> = m + &transposed;
    map_values(&sum, |v| 0.5 * v)
}

/// Same pattern, every stored value set to one
pub fn pattern_ones(m: &CsMat<f64>) -> CsMat<f64> {
    map_values(m, |_| 1.0)
}
