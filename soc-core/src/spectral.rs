// soc-core/src/spectral.rs
//! Spectral radius estimate for the relaxation step size.
//!
//! A short Arnoldi process builds an upper-Hessenberg projection of A on a
//! Krylov space started from a seeded random vector; the largest Ritz value
//! modulus is the estimate. The start vector is deterministic for a given
//! seed so strength graphs are reproducible.

use log::{debug, trace};
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sprs::CsMat;

use crate::ops::spmv;

/// Arnoldi parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralConfig {
    /// Krylov dimension (capped at the matrix size)
    pub maxiter: usize,
    pub seed: u64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            maxiter: 15,
            seed: 42,
        }
    }
}

pub fn approximate_spectral_radius(a: &CsMat<f64>) -> f64 {
    approximate_spectral_radius_with(a, SpectralConfig::default())
}

pub fn approximate_spectral_radius_with(a: &CsMat<f64>, config: SpectralConfig) -> f64 {
    let n = a.rows();
    if n == 0 {
        return 0.0;
    }
    let m = config.maxiter.max(1).min(n);

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut v: Vec<f64> = (0..n).map(|_| rng.random_range(-0.5..0.5)).collect();
    let norm = l2(&v);
    if norm == 0.0 {
        v = vec![1.0 / (n as f64).sqrt(); n];
    } else {
        v.iter_mut().for_each(|x| *x /= norm);
    }

    let mut basis: Vec<Vec<f64>> = vec![v];
    let mut hessenberg = DMatrix::<f64>::zeros(m + 1, m);
    let mut size = m;

    for j in 0..m {
        let mut w = spmv(a, &basis[j]);
        // modified Gram-Schmidt
        for (i, vi) in basis.iter().enumerate() {
            let h = dot(vi, &w);
            hessenberg[(i, j)] = h;
            w.iter_mut().zip(vi.iter()).for_each(|(wk, vk)| *wk -= h * vk);
        }
        let h_next = l2(&w);
        hessenberg[(j + 1, j)] = h_next;
        trace!("arnoldi step {}: h={:.6e}", j, h_next);
        if h_next < 1e-14 {
            size = j + 1;
            break;
        }
        w.iter_mut().for_each(|x| *x /= h_next);
        basis.push(w);
    }

    let projected = hessenberg.view((0, 0), (size, size)).into_owned();
    let rho = projected
        .complex_eigenvalues()
        .iter()
        .map(|z| z.norm())
        .fold(0.0_f64, f64::max);

    debug!(
        "Spectral radius estimate {:.6} from {}-dimensional Krylov space",
        rho, size
    );
    rho
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}
