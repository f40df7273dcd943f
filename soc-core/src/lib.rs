//! Sparse infrastructure for strength-of-connection measures.
//!
//! - `sparse`: sorted CSR view with diagonal positions and block size
//! - `ops`: masked products, filters, row/column scaling
//! - `blocks`: amalgamation and block-diagonal inverses
//! - `relax`: weighted-Jacobi sweeps
//! - `spectral`: Arnoldi spectral radius estimate
//! - `preflight`: input validation and diagnostics

pub mod advisory;
pub mod blocks;
pub mod error;
pub mod ops;
pub mod preflight;
pub mod relax;
pub mod sparse;
pub mod spectral;

pub use advisory::Advisory;
pub use blocks::BlockNorm;
pub use error::{StrengthError, StrengthResult};
pub use sparse::SparseGraph;

#[cfg(test)]
mod tests;

#[cfg(test)]
use std::sync::Once;

#[cfg(test)]
static INIT: Once = Once::new();

#[cfg(test)]
pub(crate) fn init() {
    INIT.call_once(|| {
        let env = env_logger::Env::default().default_filter_or("debug");
        let _ = env_logger::Builder::from_env(env).is_test(true).try_init();
    });
}
