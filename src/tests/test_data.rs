// src/tests/test_data.rs
//! Small operators shared by the strength tests.

use sprs::{CsMat, TriMat};

/// CSR matrix from dense rows, zeros not stored
pub fn csr_from_dense(rows: &[&[f64]]) -> CsMat<f64> {
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

/// 1-D Poisson: 2 on the diagonal, -1 on both neighbours
pub fn poisson_1d(n: usize) -> CsMat<f64> {
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

/// 2-D five-point Poisson on an `nx` x `nx` grid
pub fn poisson_2d(nx: usize) -> CsMat<f64> {
    let n = nx * nx;
    let mut trimat = TriMat::new((n, n));
    for y in 0..nx {
        for x in 0..nx {
            let i = y * nx + x;
            trimat.add_triplet(i, i, 4.0);
            if x > 0 {
                trimat.add_triplet(i, i - 1, -1.0);
            }
            if x + 1 < nx {
                trimat.add_triplet(i, i + 1, -1.0);
            }
            if y > 0 {
                trimat.add_triplet(i, i - nx, -1.0);
            }
            if y + 1 < nx {
                trimat.add_triplet(i, i + nx, -1.0);
            }
        }
    }
    trimat.to_csr()
}

/// Grid coordinates matching `poisson_2d(nx)`, spacing 1
pub fn grid_coordinates(nx: usize) -> nalgebra::DMatrix<f64> {
    nalgebra::DMatrix::from_fn(nx * nx, 2, |i, c| {
        if c == 0 {
            (i % nx) as f64
        } else {
            (i / nx) as f64
        }
    })
}

/// `[[2,-1,0],[-1,2,-1],[0,-1,2]]`
pub fn tridiagonal_3x3() -> CsMat<f64> {
    poisson_1d(3)
}

/// Two 1-D Poisson blocks of size `n` with no coupling between them
pub fn two_disconnected_blocks(n: usize) -> CsMat<f64> {
    let mut trimat = TriMat::new((2 * n, 2 * n));
    for offset in [0, n] {
        for i in 0..n {
            trimat.add_triplet(offset + i, offset + i, 2.0);
            if i > 0 {
                trimat.add_triplet(offset + i, offset + i - 1, -1.0);
            }
            if i + 1 < n {
                trimat.add_triplet(offset + i, offset + i + 1, -1.0);
            }
        }
    }
    trimat.to_csr()
}

/// 1-D Poisson on `nodes` supernodes, each coupling a 2x2 block
/// `[[2,1],[1,2]]`; block size 2, dimension `2 * nodes`
pub fn block_poisson(nodes: usize) -> CsMat<f64> {
    let local = [[2.0, 1.0], [1.0, 2.0]];
    let coarse = poisson_1d(nodes);
    let mut trimat = TriMat::new((2 * nodes, 2 * nodes));
    for (i, row) in coarse.outer_iterator().enumerate() {
        for (j, &v) in row.iter() {
            for (p, local_row) in local.iter().enumerate() {
                for (q, &w) in local_row.iter().enumerate() {
                    trimat.add_triplet(2 * i + p, 2 * j + q, v * w);
                }
            }
        }
    }
    trimat.to_csr()
}

/// Entry (i, j), zero when not stored
pub fn get(m: &CsMat<f64>, i: usize, j: usize) -> f64 {
    m.get(i, j).copied().unwrap_or(0.0)
}

/// Sorted non-zero positions
pub fn pattern(m: &CsMat<f64>) -> Vec<(usize, usize)> {
    let mut positions = Vec::with_capacity(m.nnz());
    for (i, row) in m.outer_iterator().enumerate() {
        for (j, &v) in row.iter() {
            if v != 0.0 {
                positions.push((i, j));
            }
        }
    }
    positions.sort_unstable();
    positions
}
