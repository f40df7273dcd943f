mod test_sparse;

use sprs::{CsMat, TriMat};

/// CSR matrix from dense rows, zeros not stored
pub(crate) fn csr_from_dense(rows: &[&[f64]]) -> CsMat<f64> {
    let n = rows.len();
    let m = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut trimat = TriMat::new((n, m));
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            if v != 0.0 {
                trimat.add_triplet(i, j, v);
            }
        }
    }
    trimat.to_csr()
}

/// 1-D Poisson operator: 2 on the diagonal, -1 off it
pub(crate) fn poisson_1d(n: usize) -> CsMat<f64> {
    let mut trimat = TriMat::new((n, n));
    for i in 0..n {
        trimat.add_triplet(i, i, 2.0);
        if i > 0 {
            trimat.add_triplet(i, i - 1, -1.0);
        }
        if i + 1 < n {
            trimat.add_triplet(i, i + 1, -1.0);
        }
    }
    trimat.to_csr()
}

pub(crate) fn get(m: &CsMat<f64>, i: usize, j: usize) -> Option<f64> {
    m.get(i, j).copied()
}
