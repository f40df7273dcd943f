// soc-core/src/relax.rs
//! Weighted-Jacobi relaxation
//!
//! One sweep computes `x ← x + ω D⁻¹ (b − A x)` using the previous iterate for
//! every row, so rows are independent and run in parallel.

use log::trace;
use rayon::prelude::*;
use sprs::CsMat;

/// In-place weighted-Jacobi sweeps on `A x = b`.
///
/// Rows whose diagonal is zero or absent are left untouched.
pub fn jacobi(a: &CsMat<f64>, x: &mut [f64], b: &[f64], iterations: usize, omega: f64) {
    let n = a.rows();
    assert_eq!(x.len(), n, "x length {} must match {} rows", x.len(), n);
    assert_eq!(b.len(), n, "b length {} must match {} rows", b.len(), n);

    for sweep in 0..iterations {
        let previous = x.to_vec();
        x.par_iter_mut().enumerate().for_each(|(i, xi)| {
            if let Some(row) = a.outer_view(i) {
                let mut diag = 0.0;
                let mut residual = b[i];
                for (j, &v) in row.iter() {
                    if j == i {
                        diag += v;
                    }
                    residual -= v * previous[j];
                }
                if diag != 0.0 {
                    *xi = previous[i] + omega * residual / diag;
                }
            }
        });
        trace!(
            "jacobi sweep {}: |x|={:.6e}",
            sweep,
            x.iter().map(|v| v * v).sum::<f64>().sqrt()
        );
    }
}
