// soc-core/src/advisory.rs
//! Structured diagnostics returned alongside a strength graph.
//!
//! Every advisory is also mirrored to `log::warn!` by the stage that raises it,
//! but callers should read them from the result instead of scraping logs.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Advisory {
    /// Input arrived in another layout and was converted to CSR.
    ImplicitConversion { from: String },
    /// More than half of the pairwise candidates fell back to a default value.
    UndefinedPairs { undefined: usize, candidates: usize },
    /// Evolution steps not a power of two: the incremental path was taken.
    NonPowerOfTwoSteps { steps: usize },
    /// Zero entries in the near-null-space vector were replaced by one.
    ZeroTestVectorEntries { count: usize },
    /// A diagonal block had no inverse and was pseudo-inverted instead.
    SingularDiagonalBlock { node: usize },
}

impl Advisory {
    /// Emit the advisory through the logging facade.
    pub fn log(&self) {
        log::warn!("{}", self);
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::ImplicitConversion { from } => {
                write!(f, "Implicit conversion of A from {} to csr", from)
            }
            Advisory::UndefinedPairs {
                undefined,
                candidates,
            } => write!(
                f,
                "Pairwise SOC has > 50% undefined entries ({} of {})",
                undefined, candidates
            ),
            Advisory::NonPowerOfTwoSteps { steps } => write!(
                f,
                "The most efficient time stepping for the evolution measure is done in powers of two; {} steps requested",
                steps
            ),
            Advisory::ZeroTestVectorEntries { count } => write!(
                f,
                "{} zero entries in the near-null-space vector replaced by 1.0",
                count
            ),
            Advisory::SingularDiagonalBlock { node } => write!(
                f,
                "Diagonal block of node {} is singular, using its pseudo-inverse",
                node
            ),
        }
    }
}
